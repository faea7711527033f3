//! Protocol control: acknowledgement bookkeeping and control messages
//!
//! The receiving side counts every wire byte it consumes and must report
//! back with an Acknowledgement each time a window's worth has passed.
//! Sequence numbers wrap by subtracting `0xF0000000` once they reach that
//! threshold; both counters wrap together so their distance is preserved.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, Result};
use crate::protocol::constants::*;

/// Tracks consumed bytes against the peer's acknowledgement window
#[derive(Debug)]
pub struct AckTracker {
    sequence_number: u32,
    last_acknowledged: u32,
    window: u32,
}

impl AckTracker {
    pub fn new(window: u32) -> Self {
        Self {
            sequence_number: 0,
            last_acknowledged: 0,
            window,
        }
    }

    /// Update the window after a WindowAckSize message from the peer
    pub fn set_window(&mut self, window: u32) {
        self.window = window;
    }

    pub fn window(&self) -> u32 {
        self.window
    }

    pub fn sequence_number(&self) -> u32 {
        self.sequence_number
    }

    /// Record `n` consumed bytes
    ///
    /// Returns the sequence number to report when an Acknowledgement is
    /// due. A window of zero disables acknowledgements.
    pub fn add_bytes(&mut self, n: u32) -> Option<u32> {
        self.sequence_number = self.sequence_number.wrapping_add(n);

        if self.sequence_number >= SEQUENCE_WRAP_THRESHOLD {
            self.sequence_number -= SEQUENCE_WRAP_THRESHOLD;
            self.last_acknowledged = self
                .last_acknowledged
                .wrapping_sub(SEQUENCE_WRAP_THRESHOLD);
        }

        if self.window == 0 {
            return None;
        }
        if self.sequence_number.wrapping_sub(self.last_acknowledged) >= self.window {
            self.last_acknowledged = self.sequence_number;
            Some(self.sequence_number)
        } else {
            None
        }
    }

    #[cfg(test)]
    fn force(&mut self, sequence_number: u32, last_acknowledged: u32) {
        self.sequence_number = sequence_number;
        self.last_acknowledged = last_acknowledged;
    }
}

/// Protocol control messages (message stream 0, chunk stream 2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    SetChunkSize(u32),
    Abort(u32),
    Acknowledgement(u32),
    /// User control event: (event type, payload word)
    UserControl(u16, u32),
    WindowAckSize(u32),
    SetPeerBandwidth { window: u32, limit_type: u8 },
}

impl ControlMessage {
    pub fn message_type_id(&self) -> u8 {
        match self {
            ControlMessage::SetChunkSize(_) => MSG_SET_CHUNK_SIZE,
            ControlMessage::Abort(_) => MSG_ABORT,
            ControlMessage::Acknowledgement(_) => MSG_ACKNOWLEDGEMENT,
            ControlMessage::UserControl(..) => MSG_USER_CONTROL,
            ControlMessage::WindowAckSize(_) => MSG_WINDOW_ACK_SIZE,
            ControlMessage::SetPeerBandwidth { .. } => MSG_SET_PEER_BANDWIDTH,
        }
    }

    /// Payload length this message encodes to
    pub fn encoded_len(&self) -> usize {
        match self {
            ControlMessage::UserControl(..) => 6,
            ControlMessage::SetPeerBandwidth { .. } => 5,
            _ => 4,
        }
    }

    /// Encode the message payload (header-less)
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(8);
        match *self {
            ControlMessage::SetChunkSize(v)
            | ControlMessage::Abort(v)
            | ControlMessage::Acknowledgement(v)
            | ControlMessage::WindowAckSize(v) => out.put_u32(v),
            ControlMessage::UserControl(event, data) => {
                out.put_u16(event);
                out.put_u32(data);
            }
            ControlMessage::SetPeerBandwidth { window, limit_type } => {
                out.put_u32(window);
                out.put_u8(limit_type);
            }
        }
        out.freeze()
    }

    /// Decode a control message payload of the given type
    pub fn decode(message_type_id: u8, mut payload: &[u8]) -> Result<Self> {
        let need = match message_type_id {
            MSG_USER_CONTROL => 6,
            MSG_SET_PEER_BANDWIDTH => 5,
            _ => 4,
        };
        if payload.len() < need {
            return Err(ProtocolError::TruncatedControlMessage(message_type_id).into());
        }

        let message = match message_type_id {
            MSG_SET_CHUNK_SIZE => ControlMessage::SetChunkSize(payload.get_u32()),
            MSG_ABORT => ControlMessage::Abort(payload.get_u32()),
            MSG_ACKNOWLEDGEMENT => ControlMessage::Acknowledgement(payload.get_u32()),
            MSG_USER_CONTROL => {
                let event = payload.get_u16();
                ControlMessage::UserControl(event, payload.get_u32())
            }
            MSG_WINDOW_ACK_SIZE => ControlMessage::WindowAckSize(payload.get_u32()),
            MSG_SET_PEER_BANDWIDTH => ControlMessage::SetPeerBandwidth {
                window: payload.get_u32(),
                limit_type: payload.get_u8(),
            },
            other => return Err(ProtocolError::TruncatedControlMessage(other).into()),
        };
        Ok(message)
    }
}
