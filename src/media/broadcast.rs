//! Media fan-out from publishers to subscribers
//!
//! The broadcaster sits between a publisher's read loop and every
//! subscriber's outbound queue. For each media message it classifies the
//! payload, maintains the publisher's sequence headers and GOP cache, and
//! enqueues one claim per subscriber. Delivery is best-effort per
//! subscriber: a refused enqueue releases that subscriber's claim and
//! nothing else.
//!
//! Locking discipline: sequence headers and subscriber bootstrap run
//! under the registry's locked subscriber view, so replayed state can
//! never interleave with a concurrent registration. Ordinary media uses
//! the unlocked snapshot; a subscriber that registers a packet late just
//! starts with the next one.

use std::sync::Arc;

use tracing::debug;

use crate::buffer::SharedBuffer;
use crate::media::{self, MediaType};
use crate::registry::StreamRegistry;
use crate::session::stream::{PublishStreamContext, SubscribeStreamContext};

/// External muxer interface, fired synchronously at the point of
/// caching/broadcast
///
/// All methods default to no-ops so a sink implements only what it needs.
pub trait MediaStreamSink: Send + Sync {
    fn on_receive_media(
        &self,
        _stream_path: &str,
        _media_type: MediaType,
        _payload: &SharedBuffer,
        _timestamp: u32,
        _is_skippable: bool,
    ) {
    }

    fn on_cache_sequence_header(
        &self,
        _stream_path: &str,
        _media_type: MediaType,
        _header: &SharedBuffer,
    ) {
    }

    fn on_cache_picture(
        &self,
        _stream_path: &str,
        _media_type: MediaType,
        _payload: &SharedBuffer,
        _timestamp: u32,
    ) {
    }

    fn on_clear_gop_cache(&self, _stream_path: &str) {}
}

/// Routes published media into caches, sinks and subscriber queues
pub struct MediaBroadcaster {
    registry: StreamRegistry,
    sinks: Vec<Arc<dyn MediaStreamSink>>,
}

impl MediaBroadcaster {
    pub fn new(registry: StreamRegistry) -> Self {
        Self {
            registry,
            sinks: Vec::new(),
        }
    }

    /// Attach an external sink (FLV/HLS muxer, recorder)
    pub fn add_sink(&mut self, sink: Arc<dyn MediaStreamSink>) {
        self.sinks.push(sink);
    }

    /// Handle one media message from a publisher
    pub async fn publish_media(
        &self,
        ctx: &PublishStreamContext,
        media_type: MediaType,
        timestamp: u32,
        payload: SharedBuffer,
    ) {
        if media::is_sequence_header(media_type, &payload) {
            // New codec parameters: cached frames predate the header and
            // must not replay under it.
            if media_type == MediaType::Video && ctx.gop_cache_enabled() {
                self.clear_gop_cache(ctx);
            }
            self.cache_sequence_header(ctx, media_type, payload.claim());

            // Headers establish decoder state; deliver under the locked
            // view so no subscriber joins or leaves mid-broadcast.
            let view = self.registry.get_subscribers_locked(&ctx.stream_path).await;
            self.deliver(view.iter(), ctx, media_type, timestamp, false, &payload);
            return;
        }

        if ctx.gop_cache_enabled() {
            if media_type == MediaType::Video && media::is_video_keyframe(&payload) {
                self.clear_gop_cache(ctx);
            }
            self.cache_picture(ctx, media_type, payload.claim(), timestamp);
        }

        let subscribers = self.registry.get_subscribers(&ctx.stream_path).await;
        self.deliver(
            subscribers.iter(),
            ctx,
            media_type,
            timestamp,
            true,
            &payload,
        );
    }

    /// Overwrite the publisher's stored sequence header
    pub fn cache_sequence_header(
        &self,
        ctx: &PublishStreamContext,
        media_type: MediaType,
        header: SharedBuffer,
    ) {
        debug!(stream = %ctx.stream_path, ?media_type, len = header.len(), "sequence header cached");
        for sink in &self.sinks {
            sink.on_cache_sequence_header(&ctx.stream_path, media_type, &header);
        }
        ctx.set_sequence_header(media_type, header);
    }

    /// Append a frame to the publisher's GOP cache
    pub fn cache_picture(
        &self,
        ctx: &PublishStreamContext,
        media_type: MediaType,
        payload: SharedBuffer,
        timestamp: u32,
    ) {
        for sink in &self.sinks {
            sink.on_cache_picture(&ctx.stream_path, media_type, &payload, timestamp);
        }
        ctx.gop_cache().add(media_type, timestamp, payload);
    }

    /// Drop every cached frame, releasing the cache's claims
    pub fn clear_gop_cache(&self, ctx: &PublishStreamContext) {
        ctx.gop_cache().clear();
        for sink in &self.sinks {
            sink.on_clear_gop_cache(&ctx.stream_path);
        }
    }

    /// Replay headers and GOP cache to a joining subscriber, then open
    /// its init barrier
    ///
    /// Runs under the locked view so live sequence-header broadcasts
    /// cannot interleave with the replay.
    pub async fn bootstrap_subscriber(
        &self,
        ctx: &PublishStreamContext,
        subscriber: &SubscribeStreamContext,
    ) {
        let view = self.registry.get_subscribers_locked(&ctx.stream_path).await;

        if let Some(header) = ctx.sequence_header(MediaType::Audio) {
            subscriber.enqueue_replay(MediaType::Audio, 0, header);
        }
        if let Some(header) = ctx.sequence_header(MediaType::Video) {
            subscriber.enqueue_replay(MediaType::Video, 0, header);
        }

        let cached = ctx.gop_cache().get();
        let replayed = cached.len();
        for entry in cached {
            subscriber.enqueue_replay(entry.media_type, entry.timestamp, entry.payload);
        }

        subscriber.open_init_barrier();
        drop(view);

        debug!(
            stream = %ctx.stream_path,
            session = subscriber.session_id,
            replayed,
            "subscriber bootstrapped"
        );
    }

    fn deliver<'a>(
        &self,
        subscribers: impl Iterator<Item = &'a Arc<SubscribeStreamContext>>,
        ctx: &PublishStreamContext,
        media_type: MediaType,
        timestamp: u32,
        is_skippable: bool,
        payload: &SharedBuffer,
    ) {
        for sink in &self.sinks {
            sink.on_receive_media(&ctx.stream_path, media_type, payload, timestamp, is_skippable);
        }
        for subscriber in subscribers {
            // Refusal (closed queue, discard mode, muted type) drops the
            // claim for this subscriber only.
            subscriber.enqueue_media(media_type, timestamp, payload.claim(), is_skippable);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crate::buffer::BufferPool;
    use crate::session::outbound::{self, DiscardPolicy, OutboundPacket, OutboundReceiver};

    async fn publisher(registry: &StreamRegistry, path: &str) -> Arc<PublishStreamContext> {
        let ctx = Arc::new(PublishStreamContext::new(
            path.to_string(),
            HashMap::new(),
            1,
            true,
            1024 * 1024,
            128,
        ));
        registry.start_publishing(Arc::clone(&ctx)).await.unwrap();
        ctx
    }

    async fn subscriber(
        registry: &StreamRegistry,
        path: &str,
        session_id: u64,
    ) -> (Arc<SubscribeStreamContext>, OutboundReceiver) {
        let (tx, rx) = outbound::channel(DiscardPolicy::default());
        let ctx = Arc::new(SubscribeStreamContext::new(
            path.to_string(),
            HashMap::new(),
            session_id,
            1,
            tx,
        ));
        registry.start_subscribing(Arc::clone(&ctx)).await.unwrap();
        (ctx, rx)
    }

    fn shared(pool: &BufferPool, data: &[u8]) -> SharedBuffer {
        let mut rented = pool.rent(data.len());
        rented.put_slice(data);
        rented.freeze()
    }

    /// AVC inter frame payload
    fn inter_frame(pool: &BufferPool, tag: u8) -> SharedBuffer {
        shared(pool, &[0x27, 0x01, 0, 0, 0, tag])
    }

    /// AVC key frame payload
    fn key_frame(pool: &BufferPool, tag: u8) -> SharedBuffer {
        shared(pool, &[0x17, 0x01, 0, 0, 0, tag])
    }

    /// AVC sequence header payload
    fn video_header(pool: &BufferPool) -> SharedBuffer {
        shared(pool, &[0x17, 0x00, 0, 0, 0])
    }

    async fn drain(rx: &mut OutboundReceiver) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(packet) = rx.try_recv() {
            if let OutboundPacket::Media { payload, .. } = packet {
                out.push(payload.to_vec());
            }
        }
        out
    }

    #[tokio::test]
    async fn test_keyframe_clears_then_recaches() {
        let pool = BufferPool::new(256);
        let registry = StreamRegistry::new();
        let broadcaster = MediaBroadcaster::new(registry.clone());
        let ctx = publisher(&registry, "live/a").await;

        for i in 0..5u8 {
            broadcaster
                .publish_media(&ctx, MediaType::Video, i as u32 * 40, inter_frame(&pool, i))
                .await;
        }
        assert_eq!(ctx.gop_cache().len(), 5);

        broadcaster
            .publish_media(&ctx, MediaType::Video, 200, key_frame(&pool, 9))
            .await;
        // Cleared, then the key frame itself cached.
        assert_eq!(ctx.gop_cache().len(), 1);
        assert_eq!(ctx.gop_cache().get()[0].timestamp, 200);
    }

    #[tokio::test]
    async fn test_mid_stream_sequence_header_clears_gop_cache() {
        let pool = BufferPool::new(256);
        let registry = StreamRegistry::new();
        let broadcaster = MediaBroadcaster::new(registry.clone());
        let ctx = publisher(&registry, "live/a").await;

        for i in 0..5u8 {
            broadcaster
                .publish_media(&ctx, MediaType::Video, i as u32 * 40, inter_frame(&pool, i))
                .await;
        }
        assert_eq!(ctx.gop_cache().len(), 5);

        // A header arriving mid-stream invalidates everything cached
        // before it.
        broadcaster
            .publish_media(&ctx, MediaType::Video, 200, video_header(&pool))
            .await;
        assert_eq!(ctx.gop_cache().len(), 0);

        // A late joiner sees the new header only, never the stale frames.
        let (sub, mut rx) = subscriber(&registry, "live/a", 7).await;
        broadcaster.bootstrap_subscriber(&ctx, &sub).await;
        let received = drain(&mut rx).await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0][1], 0x00);
    }

    #[tokio::test]
    async fn test_bootstrap_replays_headers_then_gop() {
        let pool = BufferPool::new(256);
        let registry = StreamRegistry::new();
        let broadcaster = MediaBroadcaster::new(registry.clone());
        let ctx = publisher(&registry, "live/a").await;

        broadcaster
            .publish_media(&ctx, MediaType::Video, 0, video_header(&pool))
            .await;
        broadcaster
            .publish_media(&ctx, MediaType::Video, 40, key_frame(&pool, 1))
            .await;
        broadcaster
            .publish_media(&ctx, MediaType::Video, 80, inter_frame(&pool, 2))
            .await;

        let (sub, mut rx) = subscriber(&registry, "live/a", 7).await;
        broadcaster.bootstrap_subscriber(&ctx, &sub).await;

        let received = drain(&mut rx).await;
        assert_eq!(received.len(), 3);
        assert_eq!(received[0], vec![0x17, 0x00, 0, 0, 0]); // header first
        assert_eq!(received[1][5], 1); // then GOP in order
        assert_eq!(received[2][5], 2);
        assert!(sub.is_initialized());
    }

    #[tokio::test]
    async fn test_live_media_held_until_bootstrap() {
        let pool = BufferPool::new(256);
        let registry = StreamRegistry::new();
        let broadcaster = MediaBroadcaster::new(registry.clone());
        let ctx = publisher(&registry, "live/a").await;

        let (sub, mut rx) = subscriber(&registry, "live/a", 7).await;

        // Broadcast before bootstrap: the subscriber must not see it live
        // (it will get the frame via GOP replay instead).
        broadcaster
            .publish_media(&ctx, MediaType::Video, 0, key_frame(&pool, 1))
            .await;
        assert!(rx.try_recv().is_none());

        broadcaster.bootstrap_subscriber(&ctx, &sub).await;
        broadcaster
            .publish_media(&ctx, MediaType::Video, 40, inter_frame(&pool, 2))
            .await;

        let received = drain(&mut rx).await;
        assert_eq!(received.len(), 2); // replayed keyframe + live frame
        assert_eq!(received[0][5], 1);
        assert_eq!(received[1][5], 2);
    }

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<String>>,
    }

    impl MediaStreamSink for RecordingSink {
        fn on_receive_media(
            &self,
            _stream_path: &str,
            _media_type: MediaType,
            _payload: &SharedBuffer,
            _timestamp: u32,
            is_skippable: bool,
        ) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("media:{is_skippable}"));
        }

        fn on_cache_sequence_header(
            &self,
            _stream_path: &str,
            _media_type: MediaType,
            _header: &SharedBuffer,
        ) {
            self.calls.lock().unwrap().push("header".to_string());
        }

        fn on_cache_picture(
            &self,
            _stream_path: &str,
            _media_type: MediaType,
            _payload: &SharedBuffer,
            _timestamp: u32,
        ) {
            self.calls.lock().unwrap().push("picture".to_string());
        }

        fn on_clear_gop_cache(&self, _stream_path: &str) {
            self.calls.lock().unwrap().push("clear".to_string());
        }
    }

    #[tokio::test]
    async fn test_sink_callbacks() {
        let pool = BufferPool::new(256);
        let registry = StreamRegistry::new();
        let sink = Arc::new(RecordingSink::default());
        let mut broadcaster = MediaBroadcaster::new(registry.clone());
        broadcaster.add_sink(Arc::clone(&sink) as Arc<dyn MediaStreamSink>);
        let ctx = publisher(&registry, "live/a").await;

        broadcaster
            .publish_media(&ctx, MediaType::Video, 0, video_header(&pool))
            .await;
        broadcaster
            .publish_media(&ctx, MediaType::Video, 40, key_frame(&pool, 1))
            .await;

        let calls = sink.calls.lock().unwrap().clone();
        let expected = [
            "clear",
            "header",
            "media:false",
            "clear",
            "picture",
            "media:true",
        ];
        assert_eq!(calls, expected);
    }
}
