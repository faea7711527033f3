//! Media classification at the FLV tag level
//!
//! The relay never decodes codec payloads; it only needs to recognize,
//! from the first bytes of an audio/video message, whether a packet is a
//! sequence header (decoder configuration) or a video key frame. Both the
//! legacy FLV layout and the enhanced-RTMP extended header (FourCC form,
//! used by HEVC/AV1 encoders) are recognized.
//!
//! Legacy video data:
//! ```text
//! +----------+----------+
//! | FrameType| CodecID  | AVCPacketType (1B for AVC) | CodecData...
//! | (4 bits) | (4 bits) |
//! +----------+----------+
//! ```
//!
//! Enhanced video data (bit 7 of the first byte set):
//! ```text
//! +---+----------+------------+
//! | 1 | FrameType| PacketType | FourCC (4B) | CodecData...
//! |   | (3 bits) | (4 bits)   |
//! +---+----------+------------+
//! ```

pub mod broadcast;
pub mod cache;

pub use broadcast::{MediaBroadcaster, MediaStreamSink};
pub use cache::GopCache;

/// Frame type nibble: keyframe
const FRAME_TYPE_KEYFRAME: u8 = 1;
/// Legacy codec id nibble: AVC (H.264)
const CODEC_AVC: u8 = 7;
/// Legacy codec id nibble: HEVC (non-standard, used by some encoders)
const CODEC_HEVC: u8 = 12;
/// AVC packet type 0: sequence header
const AVC_SEQUENCE_HEADER: u8 = 0;
/// Enhanced-RTMP packet type 0: sequence start
const PACKET_TYPE_SEQUENCE_START: u8 = 0;
/// Enhanced-RTMP extended header flag (bit 7 of the first byte)
const EX_HEADER_FLAG: u8 = 0x80;
/// Sound format nibble: AAC
const SOUND_FORMAT_AAC: u8 = 10;
/// AAC packet type 0: AudioSpecificConfig
const AAC_SEQUENCE_HEADER: u8 = 0;

/// Media kind carried by an RTMP audio/video message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Audio,
    Video,
}

/// True when a video payload is an AVC/HEVC sequence header
///
/// Covers the legacy layout (codec nibble + AVCPacketType byte) and the
/// enhanced-RTMP extended header (PacketTypeSequenceStart with a FourCC).
pub fn is_video_sequence_header(data: &[u8]) -> bool {
    if data.len() < 2 {
        return false;
    }

    if data[0] & EX_HEADER_FLAG != 0 {
        // Extended header form: packet type lives in the low nibble and
        // a 4-byte FourCC follows.
        return data.len() >= 5 && data[0] & 0x0F == PACKET_TYPE_SEQUENCE_START;
    }

    let codec = data[0] & 0x0F;
    (codec == CODEC_AVC || codec == CODEC_HEVC) && data[1] == AVC_SEQUENCE_HEADER
}

/// True when an audio payload is an AAC sequence header (AudioSpecificConfig)
pub fn is_audio_sequence_header(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] >> 4 == SOUND_FORMAT_AAC && data[1] == AAC_SEQUENCE_HEADER
}

/// True when a video payload begins a key frame
pub fn is_video_keyframe(data: &[u8]) -> bool {
    if data.is_empty() {
        return false;
    }

    if data[0] & EX_HEADER_FLAG != 0 {
        // Frame type occupies bits 4-6 under the extended header flag.
        return (data[0] >> 4) & 0x07 == FRAME_TYPE_KEYFRAME;
    }

    data[0] >> 4 == FRAME_TYPE_KEYFRAME
}

/// True when a payload of the given type is a sequence header
pub fn is_sequence_header(media_type: MediaType, data: &[u8]) -> bool {
    match media_type {
        MediaType::Audio => is_audio_sequence_header(data),
        MediaType::Video => is_video_sequence_header(data),
    }
}
