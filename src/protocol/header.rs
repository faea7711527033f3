//! Chunk header codec
//!
//! Stateless encode/decode for the RTMP basic header, the four message
//! header formats (types 0-3) and the extended timestamp field.
//!
//! ```text
//! +--------------+----------------+--------------------+------------+
//! | basic header | message header | extended timestamp | chunk data |
//! +--------------+----------------+--------------------+------------+
//! |   1-3 bytes  |  0/3/7/11 bytes|      0/4 bytes     |            |
//! +--------------+----------------+--------------------+------------+
//! ```
//!
//! All multi-byte fields are big-endian except the type-0 message stream
//! id, which real encoders write little-endian. That is a compatibility
//! contract, not a bug; do not "fix" it.
//!
//! Decode functions return `None` when the input does not yet hold a
//! complete header, so callers can accumulate bytes and retry.

use bytes::{BufMut, BytesMut};

use super::constants::{MAX_CHUNK_STREAM_ID, MAX_INLINE_TIMESTAMP};
use crate::error::ProtocolError;

/// Chunk header format, carried in the top 2 bits of the basic header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkFormat {
    /// Type 0: absolute timestamp, length, type id, stream id
    Full = 0,
    /// Type 1: timestamp delta, length, type id (stream id inherited)
    NoStreamId = 1,
    /// Type 2: timestamp delta only
    DeltaOnly = 2,
    /// Type 3: no header bytes at all
    Continuation = 3,
}

impl ChunkFormat {
    /// Format from the top 2 bits of the first basic-header byte
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => ChunkFormat::Full,
            1 => ChunkFormat::NoStreamId,
            2 => ChunkFormat::DeltaOnly,
            _ => ChunkFormat::Continuation,
        }
    }

    /// Size in bytes of the message header that follows the basic header
    pub fn message_header_len(self) -> usize {
        match self {
            ChunkFormat::Full => 11,
            ChunkFormat::NoStreamId => 7,
            ChunkFormat::DeltaOnly => 3,
            ChunkFormat::Continuation => 0,
        }
    }
}

/// Basic header: format bits plus the chunk stream id
///
/// Encoded in 1, 2 or 3 bytes depending on the csid range: 2-63 inline,
/// 64-319 via a one-byte extension, 320-65599 via a two-byte
/// little-endian extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicHeader {
    pub format: ChunkFormat,
    pub chunk_stream_id: u32,
}

impl BasicHeader {
    pub fn new(format: ChunkFormat, chunk_stream_id: u32) -> Self {
        Self {
            format,
            chunk_stream_id,
        }
    }

    /// Encoded size for a chunk stream id
    pub fn encoded_len(chunk_stream_id: u32) -> usize {
        match chunk_stream_id {
            0..=63 => 1,
            64..=319 => 2,
            _ => 3,
        }
    }

    /// Append the encoded header to `out`
    pub fn encode(&self, out: &mut BytesMut) -> Result<(), ProtocolError> {
        let csid = self.chunk_stream_id;
        if !(2..=MAX_CHUNK_STREAM_ID).contains(&csid) {
            return Err(ProtocolError::ChunkStreamIdOutOfRange(csid));
        }

        let format_bits = (self.format as u8) << 6;
        match csid {
            2..=63 => out.put_u8(format_bits | csid as u8),
            64..=319 => {
                out.put_u8(format_bits);
                out.put_u8((csid - 64) as u8);
            }
            _ => {
                out.put_u8(format_bits | 1);
                out.put_u16_le((csid - 64) as u16);
            }
        }
        Ok(())
    }

    /// Decode a basic header from the front of `buf`
    ///
    /// Returns the header and the number of bytes consumed, or `None` if
    /// `buf` is too short.
    pub fn decode(buf: &[u8]) -> Option<(Self, usize)> {
        let first = *buf.first()?;
        let format = ChunkFormat::from_bits(first >> 6);

        match first & 0b0011_1111 {
            0 => {
                let ext = *buf.get(1)?;
                Some((Self::new(format, 64 + ext as u32), 2))
            }
            1 => {
                let lo = *buf.get(1)? as u32;
                let hi = *buf.get(2)? as u32;
                Some((Self::new(format, 64 + lo + (hi << 8)), 3))
            }
            csid => Some((Self::new(format, csid as u32), 1)),
        }
    }
}

/// Message header fields for one chunk
///
/// `timestamp` is absolute for [`ChunkFormat::Full`] and a delta for types
/// 1 and 2. Fields a format omits are zero on decode and ignored on
/// encode. Extended timestamps are folded in transparently:
/// `has_extended_timestamp` records whether the wire used the sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageHeader {
    pub timestamp: u32,
    pub message_length: u32,
    pub message_type_id: u8,
    pub message_stream_id: u32,
    pub has_extended_timestamp: bool,
}

impl MessageHeader {
    /// Append the header encoded as `format` to `out`
    ///
    /// Emits the `0xFFFFFF` sentinel plus the 4-byte extended field when
    /// the timestamp does not fit the inline 3-byte field.
    pub fn encode(&self, format: ChunkFormat, out: &mut BytesMut) {
        if format == ChunkFormat::Continuation {
            return;
        }

        let extended = self.timestamp >= MAX_INLINE_TIMESTAMP;
        let inline = if extended {
            MAX_INLINE_TIMESTAMP
        } else {
            self.timestamp
        };
        put_u24(out, inline);

        if matches!(format, ChunkFormat::Full | ChunkFormat::NoStreamId) {
            put_u24(out, self.message_length);
            out.put_u8(self.message_type_id);
        }
        if format == ChunkFormat::Full {
            // Little-endian on the wire; see module docs.
            out.put_u32_le(self.message_stream_id);
        }
        if extended {
            out.put_u32(self.timestamp);
        }
    }

    /// Decode a header of the given format from the front of `buf`
    ///
    /// Returns the header and bytes consumed, or `None` if `buf` is too
    /// short. For [`ChunkFormat::Continuation`] this consumes nothing;
    /// whether an extended timestamp follows a type-3 header depends on
    /// chunk-stream state the codec does not have.
    pub fn decode(format: ChunkFormat, buf: &[u8]) -> Option<(Self, usize)> {
        if format == ChunkFormat::Continuation {
            return Some((Self::default(), 0));
        }

        let base = format.message_header_len();
        if buf.len() < base {
            return None;
        }

        let mut header = Self {
            timestamp: get_u24(buf),
            ..Self::default()
        };
        if matches!(format, ChunkFormat::Full | ChunkFormat::NoStreamId) {
            header.message_length = get_u24(&buf[3..]);
            header.message_type_id = buf[6];
        }
        if format == ChunkFormat::Full {
            header.message_stream_id =
                u32::from_le_bytes([buf[7], buf[8], buf[9], buf[10]]);
        }

        let mut consumed = base;
        if header.timestamp == MAX_INLINE_TIMESTAMP {
            let ext = buf.get(base..base + 4)?;
            header.timestamp = u32::from_be_bytes([ext[0], ext[1], ext[2], ext[3]]);
            header.has_extended_timestamp = true;
            consumed += 4;
        }

        Some((header, consumed))
    }
}

/// Write a 3-byte big-endian integer
pub(crate) fn put_u24(out: &mut BytesMut, value: u32) {
    debug_assert!(value <= MAX_INLINE_TIMESTAMP);
    out.put_u8((value >> 16) as u8);
    out.put_u8((value >> 8) as u8);
    out.put_u8(value as u8);
}

/// Read a 3-byte big-endian integer from the front of `buf`
pub(crate) fn get_u24(buf: &[u8]) -> u32 {
    ((buf[0] as u32) << 16) | ((buf[1] as u32) << 8) | buf[2] as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip_basic(format: ChunkFormat, csid: u32) {
        let header = BasicHeader::new(format, csid);
        let mut out = BytesMut::new();
        header.encode(&mut out).unwrap();
        assert_eq!(out.len(), BasicHeader::encoded_len(csid));

        let (decoded, consumed) = BasicHeader::decode(&out).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(consumed, out.len());
    }

    #[test]
    fn test_basic_header_roundtrip_all_formats_and_boundaries() {
        for format in [
            ChunkFormat::Full,
            ChunkFormat::NoStreamId,
            ChunkFormat::DeltaOnly,
            ChunkFormat::Continuation,
        ] {
            for csid in [2, 3, 63, 64, 319, 320, 1000, MAX_CHUNK_STREAM_ID] {
                roundtrip_basic(format, csid);
            }
        }
    }

    #[test]
    fn test_basic_header_byte_widths() {
        assert_eq!(BasicHeader::encoded_len(63), 1);
        assert_eq!(BasicHeader::encoded_len(64), 2);
        assert_eq!(BasicHeader::encoded_len(319), 2);
        assert_eq!(BasicHeader::encoded_len(320), 3);
    }

    #[test]
    fn test_basic_header_rejects_reserved_csids() {
        let mut out = BytesMut::new();
        assert!(BasicHeader::new(ChunkFormat::Full, 0).encode(&mut out).is_err());
        assert!(BasicHeader::new(ChunkFormat::Full, 1).encode(&mut out).is_err());
        assert!(BasicHeader::new(ChunkFormat::Full, MAX_CHUNK_STREAM_ID + 1)
            .encode(&mut out)
            .is_err());
    }

    #[test]
    fn test_basic_header_incomplete() {
        assert!(BasicHeader::decode(&[]).is_none());
        // First byte announces a 2-byte form, second byte missing
        assert!(BasicHeader::decode(&[0b0000_0000]).is_none());
        // 3-byte form with only two bytes present
        assert!(BasicHeader::decode(&[0b0000_0001, 0x10]).is_none());
    }

    #[test]
    fn test_full_header_roundtrip() {
        let header = MessageHeader {
            timestamp: 1234,
            message_length: 987,
            message_type_id: 9,
            message_stream_id: 42,
            has_extended_timestamp: false,
        };

        let mut out = BytesMut::new();
        header.encode(ChunkFormat::Full, &mut out);
        assert_eq!(out.len(), 11);

        // Message stream id must be little-endian on the wire
        assert_eq!(&out[7..11], &42u32.to_le_bytes());

        let (decoded, consumed) = MessageHeader::decode(ChunkFormat::Full, &out).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(consumed, 11);
    }

    #[test]
    fn test_type1_and_type2_roundtrip() {
        let header = MessageHeader {
            timestamp: 40,
            message_length: 128,
            message_type_id: 8,
            ..MessageHeader::default()
        };

        let mut out = BytesMut::new();
        header.encode(ChunkFormat::NoStreamId, &mut out);
        assert_eq!(out.len(), 7);
        let (decoded, _) = MessageHeader::decode(ChunkFormat::NoStreamId, &out).unwrap();
        assert_eq!(decoded.timestamp, 40);
        assert_eq!(decoded.message_length, 128);
        assert_eq!(decoded.message_type_id, 8);
        assert_eq!(decoded.message_stream_id, 0);

        let mut out = BytesMut::new();
        header.encode(ChunkFormat::DeltaOnly, &mut out);
        assert_eq!(out.len(), 3);
        let (decoded, _) = MessageHeader::decode(ChunkFormat::DeltaOnly, &out).unwrap();
        assert_eq!(decoded.timestamp, 40);
        assert_eq!(decoded.message_length, 0);
    }

    #[test]
    fn test_continuation_is_empty() {
        let header = MessageHeader {
            timestamp: 999,
            message_length: 10,
            message_type_id: 9,
            ..MessageHeader::default()
        };

        let mut out = BytesMut::new();
        header.encode(ChunkFormat::Continuation, &mut out);
        assert!(out.is_empty());

        let (decoded, consumed) =
            MessageHeader::decode(ChunkFormat::Continuation, &[]).unwrap();
        assert_eq!(consumed, 0);
        assert_eq!(decoded, MessageHeader::default());
    }

    #[test]
    fn test_extended_timestamp_roundtrip() {
        let header = MessageHeader {
            timestamp: 0x0100_0000,
            message_length: 4,
            message_type_id: 9,
            message_stream_id: 1,
            has_extended_timestamp: false,
        };

        let mut out = BytesMut::new();
        header.encode(ChunkFormat::Full, &mut out);
        assert_eq!(out.len(), 15);
        // Inline field carries the sentinel
        assert_eq!(get_u24(&out), MAX_INLINE_TIMESTAMP);

        let (decoded, consumed) = MessageHeader::decode(ChunkFormat::Full, &out).unwrap();
        assert_eq!(decoded.timestamp, 0x0100_0000);
        assert!(decoded.has_extended_timestamp);
        assert_eq!(consumed, 15);
    }

    #[test]
    fn test_sentinel_value_itself_uses_extended_field() {
        // Exactly 0xFFFFFF must go through the extended field so readers
        // never mistake it for a larger value.
        let header = MessageHeader {
            timestamp: MAX_INLINE_TIMESTAMP,
            message_length: 0,
            message_type_id: 8,
            ..MessageHeader::default()
        };

        let mut out = BytesMut::new();
        header.encode(ChunkFormat::DeltaOnly, &mut out);
        assert_eq!(out.len(), 7);

        let (decoded, _) = MessageHeader::decode(ChunkFormat::DeltaOnly, &out).unwrap();
        assert_eq!(decoded.timestamp, MAX_INLINE_TIMESTAMP);
        assert!(decoded.has_extended_timestamp);
    }

    #[test]
    fn test_decode_waits_for_extended_bytes() {
        let header = MessageHeader {
            timestamp: 0x0200_0000,
            message_length: 1,
            message_type_id: 9,
            ..MessageHeader::default()
        };
        let mut out = BytesMut::new();
        header.encode(ChunkFormat::NoStreamId, &mut out);

        // Truncate inside the extended timestamp field
        assert!(MessageHeader::decode(ChunkFormat::NoStreamId, &out[..9]).is_none());
    }
}
