//! Per-connection outbound queue with a discard policy
//!
//! Writes are decoupled from the read loop and from broadcasting
//! publishers: every connection owns an unbounded queue drained by a
//! dedicated write task. A slow subscriber therefore never blocks the
//! publisher; instead its queue grows, and once BOTH the outstanding byte
//! and packet counts exceed the configured maximums the queue starts
//! discarding skippable packets until BOTH fall back to the target
//! thresholds. Packets that establish decoder state (sequence headers,
//! command responses) are never skippable and always enqueue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

use crate::buffer::SharedBuffer;
use crate::media::MediaType;
use crate::protocol::control::ControlMessage;

/// Thresholds driving the skippable-packet discard hysteresis
#[derive(Debug, Clone, Copy)]
pub struct DiscardPolicy {
    pub max_outstanding_bytes: usize,
    pub max_outstanding_packets: usize,
    pub target_outstanding_bytes: usize,
    pub target_outstanding_packets: usize,
}

impl Default for DiscardPolicy {
    fn default() -> Self {
        Self {
            max_outstanding_bytes: 8 * 1024 * 1024,
            max_outstanding_packets: 2048,
            target_outstanding_bytes: 4 * 1024 * 1024,
            target_outstanding_packets: 1024,
        }
    }
}

/// A packet queued for the connection's write task
///
/// Media, data and command packets carry the destination message stream
/// id because the producer may be another connection (a publisher fanning
/// out to this subscriber).
#[derive(Debug)]
pub enum OutboundPacket {
    /// Already-encoded wire bytes (handshake replies)
    Raw(Bytes),
    /// Protocol control message (chunk stream 2, message stream 0)
    ///
    /// Encoded by the write task so a SetChunkSize takes effect on its
    /// writer exactly when the message goes out.
    Control(ControlMessage),
    /// Media to be chunked at the connection's negotiated out chunk size
    Media {
        media_type: MediaType,
        timestamp: u32,
        stream_id: u32,
        payload: SharedBuffer,
    },
    /// AMF0 data message (stream metadata)
    Data {
        timestamp: u32,
        stream_id: u32,
        payload: Bytes,
    },
    /// AMF0 command addressed to a stream (`onStatus` notifications)
    Command { stream_id: u32, payload: Bytes },
}

impl OutboundPacket {
    fn len(&self) -> usize {
        match self {
            OutboundPacket::Raw(bytes) => bytes.len(),
            OutboundPacket::Control(control) => control.encoded_len(),
            OutboundPacket::Media { payload, .. } => payload.len(),
            OutboundPacket::Data { payload, .. } => payload.len(),
            OutboundPacket::Command { payload, .. } => payload.len(),
        }
    }
}

#[derive(Debug, Default)]
struct Outstanding {
    bytes: usize,
    packets: usize,
    discarding: bool,
}

#[derive(Debug)]
struct QueueShared {
    outstanding: Mutex<Outstanding>,
    dropped: AtomicU64,
    policy: DiscardPolicy,
}

/// Create a linked sender/receiver pair for one connection
pub fn channel(policy: DiscardPolicy) -> (OutboundSender, OutboundReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let shared = Arc::new(QueueShared {
        outstanding: Mutex::new(Outstanding::default()),
        dropped: AtomicU64::new(0),
        policy,
    });
    (
        OutboundSender {
            tx,
            shared: Arc::clone(&shared),
        },
        OutboundReceiver { rx, shared },
    )
}

/// Producer half, cloned into every task that writes to this connection
#[derive(Debug, Clone)]
pub struct OutboundSender {
    tx: mpsc::UnboundedSender<OutboundPacket>,
    shared: Arc<QueueShared>,
}

impl OutboundSender {
    /// Queue pre-encoded bytes; never subject to the discard policy
    pub fn send_raw(&self, bytes: Bytes) -> bool {
        self.enqueue(OutboundPacket::Raw(bytes))
    }

    /// Queue a protocol control message; never discarded
    pub fn send_control(&self, control: ControlMessage) -> bool {
        self.enqueue(OutboundPacket::Control(control))
    }

    /// Queue a media payload
    ///
    /// A skippable packet is dropped (its claim released) while the queue
    /// is in discarding mode. Returns false when the packet was not
    /// queued, whether dropped or because the connection is gone.
    pub fn send_media(
        &self,
        media_type: MediaType,
        timestamp: u32,
        stream_id: u32,
        payload: SharedBuffer,
        is_skippable: bool,
    ) -> bool {
        if is_skippable && self.should_discard() {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.enqueue(OutboundPacket::Media {
            media_type,
            timestamp,
            stream_id,
            payload,
        })
    }

    /// Queue a data message (metadata); never discarded
    pub fn send_data(&self, timestamp: u32, stream_id: u32, payload: Bytes) -> bool {
        self.enqueue(OutboundPacket::Data {
            timestamp,
            stream_id,
            payload,
        })
    }

    /// Queue an `onStatus`-style command; never discarded
    pub fn send_command(&self, stream_id: u32, payload: Bytes) -> bool {
        self.enqueue(OutboundPacket::Command { stream_id, payload })
    }

    /// Skippable packets dropped so far
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// True while the queue is refusing skippable packets
    pub fn is_discarding(&self) -> bool {
        self.shared
            .outstanding
            .lock()
            .expect("outbound lock poisoned")
            .discarding
    }

    fn enqueue(&self, packet: OutboundPacket) -> bool {
        let len = packet.len();
        {
            let mut outstanding = self
                .shared
                .outstanding
                .lock()
                .expect("outbound lock poisoned");
            outstanding.bytes += len;
            outstanding.packets += 1;
        }

        if self.tx.send(packet).is_err() {
            // Receiver gone: the connection is closing. Undo the
            // accounting; the packet (and its claim) drops here.
            let mut outstanding = self
                .shared
                .outstanding
                .lock()
                .expect("outbound lock poisoned");
            outstanding.bytes -= len;
            outstanding.packets -= 1;
            return false;
        }
        true
    }

    fn should_discard(&self) -> bool {
        let policy = &self.shared.policy;
        let mut outstanding = self
            .shared
            .outstanding
            .lock()
            .expect("outbound lock poisoned");

        if outstanding.discarding {
            if outstanding.bytes <= policy.target_outstanding_bytes
                && outstanding.packets <= policy.target_outstanding_packets
            {
                outstanding.discarding = false;
                debug!(
                    bytes = outstanding.bytes,
                    packets = outstanding.packets,
                    "outbound queue recovered, discarding off"
                );
            }
        } else if outstanding.bytes > policy.max_outstanding_bytes
            && outstanding.packets > policy.max_outstanding_packets
        {
            outstanding.discarding = true;
            debug!(
                bytes = outstanding.bytes,
                packets = outstanding.packets,
                "outbound queue saturated, discarding skippable packets"
            );
        }

        outstanding.discarding
    }
}

/// Consumer half, owned by the connection's write task
#[derive(Debug)]
pub struct OutboundReceiver {
    rx: mpsc::UnboundedReceiver<OutboundPacket>,
    shared: Arc<QueueShared>,
}

impl OutboundReceiver {
    /// Await the next queued packet; `None` once all senders are gone
    pub async fn recv(&mut self) -> Option<OutboundPacket> {
        let packet = self.rx.recv().await?;
        self.settle(&packet);
        Some(packet)
    }

    /// Non-blocking variant used when draining on shutdown
    pub fn try_recv(&mut self) -> Option<OutboundPacket> {
        let packet = self.rx.try_recv().ok()?;
        self.settle(&packet);
        Some(packet)
    }

    fn settle(&self, packet: &OutboundPacket) {
        let mut outstanding = self
            .shared
            .outstanding
            .lock()
            .expect("outbound lock poisoned");
        outstanding.bytes -= packet.len();
        outstanding.packets -= 1;
    }
}
