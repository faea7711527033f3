//! Process-wide publish/subscribe registry
//!
//! Two independently locked maps: publishers by stream path, and the set
//! of subscribers per stream path. Keeping the locks separate means two
//! connections working different paths never contend, and a publisher
//! registering does not block a broadcast snapshot.
//!
//! Mutation always takes a write lock. Ordinary media fan-out uses the
//! cheap unlocked snapshot ([`StreamRegistry::get_subscribers`]); anything
//! that establishes baseline decoder state (sequence headers, GOP replay)
//! must hold the locked view ([`StreamRegistry::get_subscribers_locked`])
//! so no subscriber is added or removed mid-sequence.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{OwnedRwLockReadGuard, RwLock};
use tracing::{debug, info};

use crate::registry::error::RegistryError;
use crate::session::stream::{PublishStreamContext, SubscribeStreamContext};

type PublisherMap = HashMap<String, Arc<PublishStreamContext>>;
type SubscriberMap = HashMap<String, Vec<Arc<SubscribeStreamContext>>>;

/// Shared registry of active streams
#[derive(Clone, Default)]
pub struct StreamRegistry {
    publishers: Arc<RwLock<PublisherMap>>,
    subscribers: Arc<RwLock<SubscriberMap>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a publisher; atomic check-and-insert per stream path
    pub async fn start_publishing(
        &self,
        ctx: Arc<PublishStreamContext>,
    ) -> Result<(), RegistryError> {
        let mut publishers = self.publishers.write().await;
        if publishers.contains_key(&ctx.stream_path) {
            return Err(RegistryError::AlreadyExists);
        }
        info!(stream = %ctx.stream_path, session = ctx.session_id, "publish started");
        publishers.insert(ctx.stream_path.clone(), ctx);
        Ok(())
    }

    /// Remove a publisher and detach its subscribers
    ///
    /// The detached subscriber contexts are returned so the caller can
    /// notify each one that the stream ended. A session id mismatch (a
    /// stale caller) removes nothing.
    pub async fn stop_publishing(
        &self,
        stream_path: &str,
        session_id: u64,
    ) -> Vec<Arc<SubscribeStreamContext>> {
        {
            let mut publishers = self.publishers.write().await;
            match publishers.get(stream_path) {
                Some(ctx) if ctx.session_id == session_id => {
                    publishers.remove(stream_path);
                }
                _ => return Vec::new(),
            }
        }
        info!(stream = %stream_path, session = session_id, "publish stopped");

        self.subscribers
            .write()
            .await
            .remove(stream_path)
            .unwrap_or_default()
    }

    /// Register a subscriber to a stream path
    pub async fn start_subscribing(
        &self,
        ctx: Arc<SubscribeStreamContext>,
    ) -> Result<(), RegistryError> {
        // A session may not subscribe to a path it is publishing.
        {
            let publishers = self.publishers.read().await;
            if let Some(publisher) = publishers.get(&ctx.stream_path) {
                if publisher.session_id == ctx.session_id {
                    return Err(RegistryError::AlreadyPublishing);
                }
            }
        }

        let mut subscribers = self.subscribers.write().await;
        let entry = subscribers.entry(ctx.stream_path.clone()).or_default();
        if entry.iter().any(|s| s.session_id == ctx.session_id) {
            return Err(RegistryError::AlreadySubscribing);
        }
        info!(stream = %ctx.stream_path, session = ctx.session_id, "subscribe started");
        entry.push(ctx);
        Ok(())
    }

    /// Remove a subscriber; prunes the path entry when it empties
    pub async fn stop_subscribing(&self, stream_path: &str, session_id: u64) {
        let mut subscribers = self.subscribers.write().await;
        if let Some(entry) = subscribers.get_mut(stream_path) {
            entry.retain(|s| s.session_id != session_id);
            if entry.is_empty() {
                subscribers.remove(stream_path);
            }
            debug!(stream = %stream_path, session = session_id, "subscribe stopped");
        }
    }

    /// Unlocked snapshot of a path's subscribers
    ///
    /// A subscriber registered a moment after the snapshot simply starts
    /// with the next packet.
    pub async fn get_subscribers(&self, stream_path: &str) -> Vec<Arc<SubscribeStreamContext>> {
        self.subscribers
            .read()
            .await
            .get(stream_path)
            .cloned()
            .unwrap_or_default()
    }

    /// Lock-held view of a path's subscribers
    ///
    /// While the returned view is alive no subscriber can be added or
    /// removed, which is required when broadcasting sequence headers or
    /// replaying the GOP cache to a joining subscriber.
    pub async fn get_subscribers_locked(&self, stream_path: &str) -> LockedSubscribers {
        let guard = Arc::clone(&self.subscribers).read_owned().await;
        LockedSubscribers {
            guard,
            stream_path: stream_path.to_string(),
        }
    }

    pub async fn get_publisher(&self, stream_path: &str) -> Option<Arc<PublishStreamContext>> {
        self.publishers.read().await.get(stream_path).cloned()
    }

    /// Number of active publishers
    pub async fn publisher_count(&self) -> usize {
        self.publishers.read().await.len()
    }
}

/// Read-locked view over one path's subscriber set
///
/// Holds the subscriber map's read lock for its whole lifetime; keep the
/// scope tight.
pub struct LockedSubscribers {
    guard: OwnedRwLockReadGuard<SubscriberMap>,
    stream_path: String,
}

impl LockedSubscribers {
    pub fn iter(&self) -> impl Iterator<Item = &Arc<SubscribeStreamContext>> {
        self.guard
            .get(&self.stream_path)
            .into_iter()
            .flat_map(|subs| subs.iter())
    }

    pub fn len(&self) -> usize {
        self.guard.get(&self.stream_path).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
