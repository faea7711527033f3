//! RTMP live-media ingest and relay server
//!
//! Accepts RTMP publishers (OBS, ffmpeg), maintains per-stream sequence
//! headers and a GOP cache for late joiners, and relays media to RTMP
//! subscribers with per-subscriber backpressure. Media payloads live in
//! pooled reference-counted buffers, so fan-out to N subscribers never
//! copies frame data.
//!
//! ```no_run
//! use rtmp_relay::{RtmpServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> rtmp_relay::Result<()> {
//!     let config = ServerConfig::default().bind("0.0.0.0:1935".parse().unwrap());
//!     RtmpServer::new(config).run().await
//! }
//! ```
//!
//! Extension points: [`events::StreamEventListener`] observes stream
//! lifecycle changes (auth hooks, relay triggers), and
//! [`media::MediaStreamSink`] taps the media path (recorders, muxers).

pub mod amf;
pub mod buffer;
pub mod error;
pub mod events;
pub mod media;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

pub use error::{Error, Result};
pub use server::{RtmpServer, ServerConfig};
