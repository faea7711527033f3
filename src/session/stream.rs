//! Publish and subscribe stream contexts
//!
//! A `PublishStreamContext` exists while a session publishes a stream
//! path; it owns the cached sequence headers and the GOP cache for that
//! stream. A `SubscribeStreamContext` exists per subscriber binding and
//! carries the outbound queue handle plus the initialization gate that
//! keeps live packets from overtaking the cache replay.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use crate::buffer::SharedBuffer;
use crate::media::cache::GopCache;
use crate::media::MediaType;
use crate::protocol::control::ControlMessage;
use crate::session::outbound::OutboundSender;

/// State owned by the publishing side of a stream path
#[derive(Debug)]
pub struct PublishStreamContext {
    pub stream_path: String,
    pub stream_arguments: HashMap<String, String>,
    /// Session that owns the publish registration
    pub session_id: u64,
    pub start_time: Instant,
    gop_cache_enabled: bool,
    video_sequence_header: Mutex<Option<SharedBuffer>>,
    audio_sequence_header: Mutex<Option<SharedBuffer>>,
    gop_cache: Mutex<GopCache>,
}

impl PublishStreamContext {
    pub fn new(
        stream_path: String,
        stream_arguments: HashMap<String, String>,
        session_id: u64,
        gop_cache_enabled: bool,
        gop_max_bytes: usize,
        gop_max_entries: usize,
    ) -> Self {
        Self {
            stream_path,
            stream_arguments,
            session_id,
            start_time: Instant::now(),
            gop_cache_enabled,
            video_sequence_header: Mutex::new(None),
            audio_sequence_header: Mutex::new(None),
            gop_cache: Mutex::new(GopCache::new(gop_max_bytes, gop_max_entries)),
        }
    }

    pub fn gop_cache_enabled(&self) -> bool {
        self.gop_cache_enabled
    }

    /// Overwrite the stored sequence header for a media type
    pub fn set_sequence_header(&self, media_type: MediaType, header: SharedBuffer) {
        *self.header_slot(media_type).lock().expect("header lock") = Some(header);
    }

    /// Claim the stored sequence header, if any
    pub fn sequence_header(&self, media_type: MediaType) -> Option<SharedBuffer> {
        self.header_slot(media_type)
            .lock()
            .expect("header lock")
            .as_ref()
            .map(SharedBuffer::claim)
    }

    /// Exclusive access to the GOP cache
    pub fn gop_cache(&self) -> MutexGuard<'_, GopCache> {
        self.gop_cache.lock().expect("gop cache lock")
    }

    fn header_slot(&self, media_type: MediaType) -> &Mutex<Option<SharedBuffer>> {
        match media_type {
            MediaType::Audio => &self.audio_sequence_header,
            MediaType::Video => &self.video_sequence_header,
        }
    }
}

/// State owned by one subscriber binding to a stream path
#[derive(Debug)]
pub struct SubscribeStreamContext {
    pub stream_path: String,
    pub stream_arguments: HashMap<String, String>,
    pub session_id: u64,
    /// Message stream id the subscriber's `play` ran on
    pub stream_id: u32,
    sender: OutboundSender,
    is_receiving_audio: AtomicBool,
    is_receiving_video: AtomicBool,
    /// Opens once header/GOP replay has been queued; live media enqueued
    /// before that would be interleaved ahead of the replayed cache.
    initialized: AtomicBool,
}

impl SubscribeStreamContext {
    pub fn new(
        stream_path: String,
        stream_arguments: HashMap<String, String>,
        session_id: u64,
        stream_id: u32,
        sender: OutboundSender,
    ) -> Self {
        Self {
            stream_path,
            stream_arguments,
            session_id,
            stream_id,
            sender,
            is_receiving_audio: AtomicBool::new(true),
            is_receiving_video: AtomicBool::new(true),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn set_receiving_audio(&self, on: bool) {
        self.is_receiving_audio.store(on, Ordering::Relaxed);
    }

    pub fn set_receiving_video(&self, on: bool) {
        self.is_receiving_video.store(on, Ordering::Relaxed);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Open the gate for live media after replay has been queued
    pub fn open_init_barrier(&self) {
        self.initialized.store(true, Ordering::Release);
    }

    /// Queue live media for this subscriber
    ///
    /// Refused (claim dropped) while the init barrier is closed, when the
    /// subscriber muted the media type, or by the queue's discard policy.
    pub fn enqueue_media(
        &self,
        media_type: MediaType,
        timestamp: u32,
        payload: SharedBuffer,
        is_skippable: bool,
    ) -> bool {
        if !self.is_initialized() {
            return false;
        }
        if !self.wants(media_type) {
            return false;
        }
        self.sender
            .send_media(media_type, timestamp, self.stream_id, payload, is_skippable)
    }

    /// Queue replayed cache data, bypassing the init barrier
    ///
    /// Only the bootstrap path uses this, while it holds the locked
    /// subscriber view.
    pub fn enqueue_replay(
        &self,
        media_type: MediaType,
        timestamp: u32,
        payload: SharedBuffer,
    ) -> bool {
        self.sender
            .send_media(media_type, timestamp, self.stream_id, payload, false)
    }

    /// Queue a metadata data message; gated like live media
    pub fn enqueue_data(&self, timestamp: u32, payload: bytes::Bytes) -> bool {
        if !self.is_initialized() {
            return false;
        }
        self.sender.send_data(timestamp, self.stream_id, payload)
    }

    /// Queue an `onStatus` command (stream-ended notifications)
    pub fn enqueue_command(&self, payload: bytes::Bytes) -> bool {
        self.sender.send_command(self.stream_id, payload)
    }

    /// Queue a protocol control message (StreamEOF when the publisher
    /// goes away)
    pub fn enqueue_control(&self, control: ControlMessage) -> bool {
        self.sender.send_control(control)
    }

    fn wants(&self, media_type: MediaType) -> bool {
        match media_type {
            MediaType::Audio => self.is_receiving_audio.load(Ordering::Relaxed),
            MediaType::Video => self.is_receiving_video.load(Ordering::Relaxed),
        }
    }
}
