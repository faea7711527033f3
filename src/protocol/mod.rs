//! RTMP wire protocol: handshake, chunk framing, control messages
//!
//! This module owns everything between the TCP byte stream and complete
//! RTMP messages:
//! - Handshake negotiation (simple and digest-authenticated variants)
//! - Chunk basic/message header encoding and decoding
//! - Incremental chunk reassembly into messages (`ChunkReader`)
//! - Message chunking with header compression (`ChunkWriter`)
//! - Protocol control messages and acknowledgement bookkeeping

pub mod chunk;
pub mod constants;
pub mod control;
pub mod handshake;
pub mod header;
pub mod message;

pub use chunk::{ChunkReader, ChunkWriter};
pub use control::{AckTracker, ControlMessage};
pub use handshake::{Handshake, HandshakeKind};
pub use header::{BasicHeader, ChunkFormat, MessageHeader};
pub use message::{Message, MessageType};
