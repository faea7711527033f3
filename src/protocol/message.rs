//! Message types and the assembled-message representation
//!
//! The RTMP message type set is fixed by the protocol, so dispatch is a
//! plain `match` over a closed enum rather than any registry of handlers.

use crate::buffer::SharedBuffer;
use crate::protocol::constants::*;

/// Closed set of message types the relay dispatches on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    SetChunkSize,
    Abort,
    Acknowledgement,
    UserControl,
    WindowAckSize,
    SetPeerBandwidth,
    Audio,
    Video,
    DataAmf0,
    CommandAmf0,
    /// Anything else (AMF3 variants, shared objects, aggregates)
    Other(u8),
}

impl MessageType {
    pub fn from_id(id: u8) -> Self {
        match id {
            MSG_SET_CHUNK_SIZE => MessageType::SetChunkSize,
            MSG_ABORT => MessageType::Abort,
            MSG_ACKNOWLEDGEMENT => MessageType::Acknowledgement,
            MSG_USER_CONTROL => MessageType::UserControl,
            MSG_WINDOW_ACK_SIZE => MessageType::WindowAckSize,
            MSG_SET_PEER_BANDWIDTH => MessageType::SetPeerBandwidth,
            MSG_AUDIO => MessageType::Audio,
            MSG_VIDEO => MessageType::Video,
            MSG_DATA_AMF0 => MessageType::DataAmf0,
            MSG_COMMAND_AMF0 => MessageType::CommandAmf0,
            other => MessageType::Other(other),
        }
    }

    pub fn id(self) -> u8 {
        match self {
            MessageType::SetChunkSize => MSG_SET_CHUNK_SIZE,
            MessageType::Abort => MSG_ABORT,
            MessageType::Acknowledgement => MSG_ACKNOWLEDGEMENT,
            MessageType::UserControl => MSG_USER_CONTROL,
            MessageType::WindowAckSize => MSG_WINDOW_ACK_SIZE,
            MessageType::SetPeerBandwidth => MSG_SET_PEER_BANDWIDTH,
            MessageType::Audio => MSG_AUDIO,
            MessageType::Video => MSG_VIDEO,
            MessageType::DataAmf0 => MSG_DATA_AMF0,
            MessageType::CommandAmf0 => MSG_COMMAND_AMF0,
            MessageType::Other(id) => id,
        }
    }

    /// True for audio/video payloads
    pub fn is_media(self) -> bool {
        matches!(self, MessageType::Audio | MessageType::Video)
    }
}

/// A complete RTMP message reassembled from one or more chunks
///
/// The payload sits in a pooled buffer so the broadcast path can claim it
/// per subscriber without copying.
#[derive(Debug)]
pub struct Message {
    pub chunk_stream_id: u32,
    pub timestamp: u32,
    pub message_type_id: u8,
    pub message_stream_id: u32,
    pub payload: SharedBuffer,
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        MessageType::from_id(self.message_type_id)
    }
}
