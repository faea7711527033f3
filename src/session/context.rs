//! Per-connection session state
//!
//! Owned and mutated only by the connection's read loop; nothing here
//! needs a lock except the stats, which other tasks read. Dropping the
//! context releases every claim the session still holds, but registry
//! registrations must be released explicitly during teardown.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::protocol::control::AckTracker;
use crate::protocol::handshake::HandshakeKind;
use crate::session::stream::{PublishStreamContext, SubscribeStreamContext};
use crate::stats::SessionStats;

/// What a message stream id is currently bound to
#[derive(Debug, Clone)]
pub enum StreamBinding {
    /// Allocated by `createStream` but not yet publishing or playing
    Idle,
    Publishing(Arc<PublishStreamContext>),
    Playing(Arc<SubscribeStreamContext>),
}

/// Mutable state for one connection
pub struct SessionContext {
    pub session_id: u64,
    pub peer_addr: SocketAddr,
    /// Set once the handshake completes
    pub handshake_kind: Option<HandshakeKind>,
    /// Application name from the `connect` command
    pub app_name: Option<String>,
    /// Inbound byte accounting for Acknowledgement emission
    pub ack_tracker: AckTracker,
    /// Window we asked the peer to acknowledge at
    pub out_window_ack_size: u32,
    pub stats: Arc<SessionStats>,
    streams: HashMap<u32, StreamBinding>,
    next_stream_id: u32,
}

impl SessionContext {
    pub fn new(session_id: u64, peer_addr: SocketAddr, out_window_ack_size: u32) -> Self {
        Self {
            session_id,
            peer_addr,
            handshake_kind: None,
            app_name: None,
            ack_tracker: AckTracker::new(0),
            out_window_ack_size,
            stats: Arc::new(SessionStats::new()),
            streams: HashMap::new(),
            next_stream_id: 0,
        }
    }

    /// Allocate a message stream id for `createStream`
    pub fn create_stream(&mut self) -> u32 {
        self.next_stream_id += 1;
        let id = self.next_stream_id;
        self.streams.insert(id, StreamBinding::Idle);
        id
    }

    pub fn stream(&self, stream_id: u32) -> Option<&StreamBinding> {
        self.streams.get(&stream_id)
    }

    /// Bind a stream id to a publish registration
    pub fn bind_publishing(&mut self, stream_id: u32, ctx: Arc<PublishStreamContext>) {
        self.streams.insert(stream_id, StreamBinding::Publishing(ctx));
    }

    /// Bind a stream id to a play registration
    pub fn bind_playing(&mut self, stream_id: u32, ctx: Arc<SubscribeStreamContext>) {
        self.streams.insert(stream_id, StreamBinding::Playing(ctx));
    }

    /// Remove one stream binding (`deleteStream`/`closeStream`)
    pub fn remove_stream(&mut self, stream_id: u32) -> Option<StreamBinding> {
        self.streams.remove(&stream_id)
    }

    /// Drain every binding for connection teardown
    pub fn drain_streams(&mut self) -> Vec<StreamBinding> {
        self.streams.drain().map(|(_, binding)| binding).collect()
    }

    /// The stream id currently publishing, if any
    pub fn publishing_stream(&self) -> Option<(u32, &Arc<PublishStreamContext>)> {
        self.streams.iter().find_map(|(id, binding)| match binding {
            StreamBinding::Publishing(ctx) => Some((*id, ctx)),
            _ => None,
        })
    }
}
