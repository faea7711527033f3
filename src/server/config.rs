//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::buffer::DEFAULT_BUFFER_CAPACITY;
use crate::protocol::constants::*;
use crate::session::outbound::DiscardPolicy;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Outbound chunk size announced to every peer
    pub chunk_size: u32,

    /// Largest inbound chunk size a peer may negotiate
    pub max_chunk_size: u32,

    /// Largest message a peer may declare
    pub max_message_size: u32,

    /// Window acknowledgement size announced to publishers
    pub window_ack_size: u32,

    /// Peer bandwidth limit announced on connect
    pub peer_bandwidth: u32,

    /// Handshake must complete within this time
    pub handshake_timeout: Duration,

    /// Disconnect if no data received for this long
    pub idle_timeout: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Capacity of pooled media buffers
    pub pool_buffer_capacity: usize,

    /// Cache frames since the last key frame for late joiners
    pub gop_cache_enabled: bool,

    /// Maximum bytes held in one stream's GOP cache
    pub gop_max_bytes: usize,

    /// Maximum entries held in one stream's GOP cache
    pub gop_max_entries: usize,

    /// Per-subscriber outbound queue thresholds
    pub discard_policy: DiscardPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:1935".parse().unwrap(),
            max_connections: 0, // Unlimited
            chunk_size: RECOMMENDED_CHUNK_SIZE,
            max_chunk_size: MAX_CHUNK_SIZE,
            max_message_size: 16 * 1024 * 1024,
            window_ack_size: DEFAULT_WINDOW_ACK_SIZE,
            peer_bandwidth: DEFAULT_PEER_BANDWIDTH,
            handshake_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(60),
            tcp_nodelay: true, // Important for low latency
            pool_buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            gop_cache_enabled: true,
            gop_max_bytes: 4 * 1024 * 1024,
            gop_max_entries: 4096,
            discard_policy: DiscardPolicy::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the outbound chunk size
    pub fn chunk_size(mut self, size: u32) -> Self {
        self.chunk_size = size.min(MAX_CHUNK_SIZE);
        self
    }

    /// Set the window acknowledgement size
    pub fn window_ack_size(mut self, size: u32) -> Self {
        self.window_ack_size = size;
        self
    }

    /// Disable GOP caching
    pub fn disable_gop_cache(mut self) -> Self {
        self.gop_cache_enabled = false;
        self
    }

    /// Set the GOP cache bounds
    pub fn gop_limits(mut self, max_bytes: usize, max_entries: usize) -> Self {
        self.gop_max_bytes = max_bytes;
        self.gop_max_entries = max_entries;
        self
    }

    /// Set the per-subscriber discard thresholds
    pub fn discard_policy(mut self, policy: DiscardPolicy) -> Self {
        self.discard_policy = policy;
        self
    }

    /// Set the handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }
}
