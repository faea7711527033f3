//! RTMP server listener
//!
//! Handles the TCP accept loop and spawns one connection task per peer.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::buffer::BufferPool;
use crate::error::Result;
use crate::events::{EventDispatcher, StreamEventListener};
use crate::media::{MediaBroadcaster, MediaStreamSink};
use crate::registry::StreamRegistry;
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;

/// RTMP ingest/relay server
pub struct RtmpServer {
    config: ServerConfig,
    registry: StreamRegistry,
    broadcaster: MediaBroadcaster,
    events: EventDispatcher,
    pool: BufferPool,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl RtmpServer {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        let registry = StreamRegistry::new();
        let pool = BufferPool::new(config.pool_buffer_capacity);

        Self {
            broadcaster: MediaBroadcaster::new(registry.clone()),
            events: EventDispatcher::new(),
            registry,
            pool,
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
            config,
        }
    }

    /// Get a reference to the stream registry
    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    /// Register a lifecycle listener; lower order keys fire first
    ///
    /// Must be called before [`run`](Self::run).
    pub fn register_listener(&mut self, order: i32, listener: Arc<dyn StreamEventListener>) {
        self.events.register(order, listener);
    }

    /// Attach a media sink (recorder, muxer)
    ///
    /// Must be called before [`run`](Self::run).
    pub fn add_media_sink(&mut self, sink: Arc<dyn MediaStreamSink>) {
        self.broadcaster.add_sink(sink);
    }

    /// Run the server
    ///
    /// This method blocks until the accept loop fails.
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "RTMP server listening");

        let shared = SharedState::from(self);
        shared.accept_loop(&listener).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "RTMP server listening");

        let shared = SharedState::from(self);
        tokio::select! {
            _ = shutdown => {
                tracing::info!("shutdown signal received");
                Ok(())
            }
            result = shared.accept_loop(&listener) => result,
        }
    }
}

/// Immutable per-server state shared with every connection task
struct SharedState {
    config: ServerConfig,
    registry: StreamRegistry,
    broadcaster: Arc<MediaBroadcaster>,
    events: Arc<EventDispatcher>,
    pool: BufferPool,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl From<RtmpServer> for SharedState {
    fn from(server: RtmpServer) -> Self {
        Self {
            config: server.config,
            registry: server.registry,
            broadcaster: Arc::new(server.broadcaster),
            events: Arc::new(server.events),
            pool: server.pool,
            next_session_id: server.next_session_id,
            connection_semaphore: server.connection_semaphore,
        }
    }
}

impl SharedState {
    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        let permit = if let Some(ref semaphore) = self.connection_semaphore {
            match Arc::clone(semaphore).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(session = session_id, peer = %peer_addr, "new connection");

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::debug!(error = %e, "failed to set TCP_NODELAY");
            }
        }

        let connection = Connection::new(
            session_id,
            socket,
            peer_addr,
            self.config.clone(),
            self.registry.clone(),
            Arc::clone(&self.broadcaster),
            Arc::clone(&self.events),
            self.pool.clone(),
        );

        tokio::spawn(async move {
            // Held for the life of the connection task.
            let _permit = permit;

            if let Err(e) = connection.run().await {
                tracing::debug!(session = session_id, error = %e, "connection error");
            }
            tracing::debug!(session = session_id, "connection closed");
        });
    }
}
