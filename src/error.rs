//! Crate-wide error types
//!
//! Protocol violations are scoped to a single connection: they propagate up
//! through the chunk-handling path and tear down that session only.

use thiserror::Error;

/// Convenience result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("amf decode error: {0}")]
    Amf(#[from] AmfError),

    #[error("connection closed")]
    ConnectionClosed,
}

/// Handshake-specific failures
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("unsupported rtmp version {0}")]
    InvalidVersion(u8),

    #[error("C1 digest did not validate against any handshake schema")]
    DigestMismatch,
}

/// Chunk-stream protocol violations
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("chunk size {0} exceeds maximum {1}")]
    ChunkSizeTooLarge(u32, u32),

    #[error("chunk size of zero is not allowed")]
    ZeroChunkSize,

    #[error("declared message length {0} exceeds maximum {1}")]
    MessageTooLong(u32, u32),

    #[error("chunk stream id {0} out of range")]
    ChunkStreamIdOutOfRange(u32),

    #[error("type {0} chunk received with no prior header on chunk stream {1}")]
    MissingInitialHeader(u8, u32),

    #[error("control message of type {0} truncated")]
    TruncatedControlMessage(u8),
}

/// AMF0 command-layer decode failures
#[derive(Debug, Error)]
pub enum AmfError {
    #[error("unexpected end of amf payload")]
    UnexpectedEof,

    #[error("unsupported amf0 marker 0x{0:02x}")]
    UnsupportedMarker(u8),

    #[error("invalid utf-8 in amf string")]
    InvalidString,

    #[error("amf object nesting exceeds limit")]
    NestingTooDeep,
}
