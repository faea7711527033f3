//! RTMP wire constants and protocol defaults

/// RTMP protocol version carried in C0/S0
pub const RTMP_VERSION: u8 = 3;

/// Size of the C1/C2/S1/S2 handshake packets
pub const HANDSHAKE_SIZE: usize = 1536;

/// Chunk size every connection starts with, before negotiation
pub const DEFAULT_CHUNK_SIZE: u32 = 128;

/// Chunk size we advertise to peers
pub const RECOMMENDED_CHUNK_SIZE: u32 = 4096;

/// Upper bound accepted from a peer's SetChunkSize
pub const MAX_CHUNK_SIZE: u32 = 65536;

/// Default window acknowledgement size
pub const DEFAULT_WINDOW_ACK_SIZE: u32 = 2_500_000;

/// Default peer bandwidth advertised in SetPeerBandwidth
pub const DEFAULT_PEER_BANDWIDTH: u32 = 2_500_000;

/// Sequence numbers wrap by subtracting this once reached
pub const SEQUENCE_WRAP_THRESHOLD: u32 = 0xF000_0000;

/// Largest timestamp representable in a 3-byte header field;
/// also the sentinel that announces an extended timestamp
pub const MAX_INLINE_TIMESTAMP: u32 = 0xFF_FFFF;

/// Largest chunk stream id encodable in the 3-byte basic header
pub const MAX_CHUNK_STREAM_ID: u32 = 65599;

// Chunk stream ids we originate messages on. Spreading message classes
// across chunk streams lets header compression kick in per class.
pub const CSID_PROTOCOL_CONTROL: u32 = 2;
pub const CSID_COMMAND: u32 = 3;
pub const CSID_AUDIO: u32 = 4;
pub const CSID_VIDEO: u32 = 5;
pub const CSID_DATA: u32 = 6;

// Message type ids (protocol control)
pub const MSG_SET_CHUNK_SIZE: u8 = 1;
pub const MSG_ABORT: u8 = 2;
pub const MSG_ACKNOWLEDGEMENT: u8 = 3;
pub const MSG_USER_CONTROL: u8 = 4;
pub const MSG_WINDOW_ACK_SIZE: u8 = 5;
pub const MSG_SET_PEER_BANDWIDTH: u8 = 6;

// Message type ids (media and data)
pub const MSG_AUDIO: u8 = 8;
pub const MSG_VIDEO: u8 = 9;
pub const MSG_DATA_AMF0: u8 = 18;
pub const MSG_COMMAND_AMF0: u8 = 20;

// User control event types
pub const EVENT_STREAM_BEGIN: u16 = 0;
pub const EVENT_STREAM_EOF: u16 = 1;
