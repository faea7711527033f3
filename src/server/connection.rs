//! Per-connection read loop, write task and message dispatch
//!
//! Each accepted socket is split in two. The read half runs a sequential
//! loop: drive the handshake, then reassemble chunks into messages and
//! dispatch on the closed [`MessageType`] set. The write half is owned by
//! a spawned task draining the connection's outbound queue; it owns the
//! only [`ChunkWriter`], so header compression state stays coherent no
//! matter which task produced a packet. A publisher fanning out to this
//! subscriber enqueues into the same queue the local command responses
//! use, which also fixes the relative order of replies and relayed media.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::amf::{self, AmfValue};
use crate::buffer::BufferPool;
use crate::error::{Error, Result};
use crate::events::EventDispatcher;
use crate::media::{self, MediaBroadcaster, MediaType};
use crate::protocol::chunk::{ChunkReader, ChunkWriter};
use crate::protocol::constants::*;
use crate::protocol::control::ControlMessage;
use crate::protocol::handshake::Handshake;
use crate::protocol::message::{Message, MessageType};
use crate::registry::StreamRegistry;
use crate::server::config::ServerConfig;
use crate::session::context::{SessionContext, StreamBinding};
use crate::session::outbound::{self, OutboundPacket, OutboundReceiver, OutboundSender};
use crate::session::stream::{PublishStreamContext, SubscribeStreamContext};
use crate::stats::SessionStats;

/// One accepted RTMP connection
pub struct Connection {
    socket: TcpStream,
    config: ServerConfig,
    registry: StreamRegistry,
    broadcaster: Arc<MediaBroadcaster>,
    events: Arc<EventDispatcher>,
    pool: BufferPool,
    session: SessionContext,
}

impl Connection {
    pub fn new(
        session_id: u64,
        socket: TcpStream,
        peer_addr: SocketAddr,
        config: ServerConfig,
        registry: StreamRegistry,
        broadcaster: Arc<MediaBroadcaster>,
        events: Arc<EventDispatcher>,
        pool: BufferPool,
    ) -> Self {
        let session = SessionContext::new(session_id, peer_addr, config.window_ack_size);
        Self {
            socket,
            config,
            registry,
            broadcaster,
            events,
            pool,
            session,
        }
    }

    /// Serve the connection until the peer disconnects or errs
    pub async fn run(self) -> Result<()> {
        let Connection {
            socket,
            config,
            registry,
            broadcaster,
            events,
            pool,
            session,
        } = self;

        let (mut read_half, write_half) = socket.into_split();
        let (sender, receiver) = outbound::channel(config.discard_policy);

        let write_task = tokio::spawn(write_loop(
            write_half,
            receiver,
            Arc::clone(&session.stats),
        ));

        let mut driver = Driver {
            reader: ChunkReader::new(pool, config.max_chunk_size, config.max_message_size),
            config,
            registry,
            broadcaster,
            events,
            session,
            sender,
        };

        let result = driver.read_loop(&mut read_half).await;
        driver.teardown().await;

        // Dropping the driver drops the last local sender; the write task
        // drains what is queued and exits.
        drop(driver);
        let _ = write_task.await;

        result
    }
}

/// Read-loop state and dispatch, separated from the socket halves
struct Driver {
    config: ServerConfig,
    registry: StreamRegistry,
    broadcaster: Arc<MediaBroadcaster>,
    events: Arc<EventDispatcher>,
    session: SessionContext,
    reader: ChunkReader,
    sender: OutboundSender,
}

impl Driver {
    async fn read_loop(&mut self, socket: &mut OwnedReadHalf) -> Result<()> {
        let mut buf = BytesMut::with_capacity(8 * 1024);

        self.handshake(socket, &mut buf).await?;

        loop {
            while let Some(message) = self.reader.decode(&mut buf)? {
                self.session.stats.add_message_in();
                self.handle_message(message).await?;
            }

            let n = timeout(self.config.idle_timeout, socket.read_buf(&mut buf))
                .await
                .map_err(|_| idle_timeout_error())??;
            if n == 0 {
                return Ok(());
            }
            self.session.stats.add_bytes_in(n as u64);
            if let Some(sequence) = self.session.ack_tracker.add_bytes(n as u32) {
                self.sender
                    .send_control(ControlMessage::Acknowledgement(sequence));
            }
        }
    }

    async fn handshake(&mut self, socket: &mut OwnedReadHalf, buf: &mut BytesMut) -> Result<()> {
        let mut handshake = Handshake::new();
        while !handshake.is_done() {
            if let Some(reply) = handshake.process(buf)? {
                self.sender.send_raw(reply);
                continue;
            }
            if handshake.is_done() {
                break;
            }
            let n = timeout(self.config.handshake_timeout, socket.read_buf(buf))
                .await
                .map_err(|_| handshake_timeout_error())??;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            self.session.stats.add_bytes_in(n as u64);
        }

        self.session.handshake_kind = handshake.kind();
        debug!(
            session = self.session.session_id,
            kind = ?self.session.handshake_kind,
            "handshake complete"
        );
        Ok(())
    }

    async fn handle_message(&mut self, message: Message) -> Result<()> {
        match message.message_type() {
            MessageType::SetChunkSize
            | MessageType::Abort
            | MessageType::Acknowledgement
            | MessageType::UserControl
            | MessageType::WindowAckSize
            | MessageType::SetPeerBandwidth => self.handle_control(&message),
            MessageType::Audio => self.handle_media(message, MediaType::Audio).await,
            MessageType::Video => self.handle_media(message, MediaType::Video).await,
            MessageType::DataAmf0 => self.handle_data(message).await,
            MessageType::CommandAmf0 => self.handle_command(message).await,
            MessageType::Other(id) => {
                trace!(session = self.session.session_id, id, "ignoring message type");
                Ok(())
            }
        }
    }

    fn handle_control(&mut self, message: &Message) -> Result<()> {
        let control = ControlMessage::decode(message.message_type_id, &message.payload)?;
        match control {
            ControlMessage::SetChunkSize(size) => {
                debug!(session = self.session.session_id, size, "peer set chunk size");
                self.reader.set_chunk_size(size)?;
            }
            ControlMessage::Abort(csid) => {
                debug!(session = self.session.session_id, csid, "peer aborted chunk stream");
                self.reader.abort(csid);
            }
            ControlMessage::WindowAckSize(window) => {
                self.session.ack_tracker.set_window(window);
            }
            ControlMessage::SetPeerBandwidth { window, .. } => {
                self.session.out_window_ack_size = window;
            }
            ControlMessage::Acknowledgement(sequence) => {
                trace!(session = self.session.session_id, sequence, "peer acknowledged");
            }
            ControlMessage::UserControl(event, data) => {
                trace!(session = self.session.session_id, event, data, "user control event");
            }
        }
        Ok(())
    }

    async fn handle_media(&mut self, message: Message, media_type: MediaType) -> Result<()> {
        let Some(StreamBinding::Publishing(ctx)) = self.session.stream(message.message_stream_id)
        else {
            // Media on an unbound stream id: tolerated, dropped.
            debug!(
                session = self.session.session_id,
                stream_id = message.message_stream_id,
                "media on non-publishing stream"
            );
            return Ok(());
        };
        let ctx = Arc::clone(ctx);

        match media_type {
            MediaType::Audio => self.session.stats.add_audio_frame(),
            MediaType::Video => self
                .session
                .stats
                .add_video_frame(media::is_video_keyframe(&message.payload)),
        }

        self.broadcaster
            .publish_media(&ctx, media_type, message.timestamp, message.payload)
            .await;
        Ok(())
    }

    /// `@setDataFrame` / `onMetaData`: cache-free relay to subscribers
    async fn handle_data(&mut self, message: Message) -> Result<()> {
        let Some(StreamBinding::Publishing(ctx)) = self.session.stream(message.message_stream_id)
        else {
            return Ok(());
        };
        let ctx = Arc::clone(ctx);

        let mut raw = Bytes::copy_from_slice(&message.payload);
        let mut values = amf::decode_all(&mut raw)?;
        if values.first().and_then(AmfValue::as_str) == Some("@setDataFrame") {
            values.remove(0);
        }
        if values.first().and_then(AmfValue::as_str) != Some("onMetaData") {
            trace!(session = self.session.session_id, "ignoring non-metadata data message");
            return Ok(());
        }

        self.events.dispatch_metadata(
            self.session.session_id,
            &ctx.stream_path,
            &ctx.stream_arguments,
        );

        let payload = amf::encode_all(&values);
        for subscriber in self.registry.get_subscribers(&ctx.stream_path).await {
            subscriber.enqueue_data(message.timestamp, payload.clone());
        }
        Ok(())
    }

    async fn handle_command(&mut self, message: Message) -> Result<()> {
        let mut raw = Bytes::copy_from_slice(&message.payload);
        let values = amf::decode_all(&mut raw)?;

        let Some(name) = values.first().and_then(AmfValue::as_str) else {
            debug!(session = self.session.session_id, "command without a name");
            return Ok(());
        };
        let transaction_id = values.get(1).and_then(AmfValue::as_number).unwrap_or(0.0);

        match name {
            "connect" => self.on_connect(transaction_id, &values),
            "createStream" => self.on_create_stream(transaction_id),
            "publish" => self.on_publish(&message, &values).await,
            "play" => self.on_play(&message, &values).await,
            "deleteStream" => {
                let stream_id = values.get(3).and_then(AmfValue::as_number).unwrap_or(0.0) as u32;
                self.close_stream(stream_id).await;
                Ok(())
            }
            "closeStream" => {
                self.close_stream(message.message_stream_id).await;
                Ok(())
            }
            "receiveAudio" | "receiveVideo" => self.on_receive_toggle(&message, name, &values),
            "releaseStream" | "FCPublish" | "FCUnpublish" => {
                // Encoder pre-flight chatter; acknowledged, not acted on.
                self.send_command(
                    0,
                    &[
                        AmfValue::String("_result".to_string()),
                        AmfValue::Number(transaction_id),
                        AmfValue::Null,
                        AmfValue::Undefined,
                    ],
                );
                Ok(())
            }
            other => {
                debug!(session = self.session.session_id, command = other, "unhandled command");
                Ok(())
            }
        }
    }

    fn on_connect(&mut self, transaction_id: f64, values: &[AmfValue]) -> Result<()> {
        let app = values
            .get(2)
            .and_then(|v| v.get_string("app"))
            .unwrap_or_default()
            .trim_matches('/')
            .to_string();

        info!(
            session = self.session.session_id,
            peer = %self.session.peer_addr,
            app = %app,
            "connect"
        );
        self.session.app_name = Some(app);

        self.sender
            .send_control(ControlMessage::WindowAckSize(self.config.window_ack_size));
        self.sender.send_control(ControlMessage::SetPeerBandwidth {
            window: self.config.peer_bandwidth,
            limit_type: 2,
        });
        // The write task's ChunkWriter adopts the new size the moment this
        // message is encoded, so everything after it on the wire is
        // fragmented at the announced size.
        self.sender
            .send_control(ControlMessage::SetChunkSize(self.config.chunk_size));

        let mut properties = HashMap::new();
        properties.insert(
            "fmsVer".to_string(),
            AmfValue::String("FMS/3,5,7,7009".to_string()),
        );
        properties.insert("capabilities".to_string(), AmfValue::Number(31.0));

        let mut information = HashMap::new();
        information.insert(
            "level".to_string(),
            AmfValue::String("status".to_string()),
        );
        information.insert(
            "code".to_string(),
            AmfValue::String("NetConnection.Connect.Success".to_string()),
        );
        information.insert(
            "description".to_string(),
            AmfValue::String("Connection succeeded.".to_string()),
        );
        information.insert("objectEncoding".to_string(), AmfValue::Number(0.0));

        self.send_command(
            0,
            &[
                AmfValue::String("_result".to_string()),
                AmfValue::Number(transaction_id),
                AmfValue::Object(properties),
                AmfValue::Object(information),
            ],
        );
        Ok(())
    }

    fn on_create_stream(&mut self, transaction_id: f64) -> Result<()> {
        let stream_id = self.session.create_stream();
        debug!(session = self.session.session_id, stream_id, "createStream");
        self.send_command(
            0,
            &[
                AmfValue::String("_result".to_string()),
                AmfValue::Number(transaction_id),
                AmfValue::Null,
                AmfValue::Number(stream_id as f64),
            ],
        );
        Ok(())
    }

    async fn on_publish(&mut self, message: &Message, values: &[AmfValue]) -> Result<()> {
        let stream_id = message.message_stream_id;
        let Some(name) = values.get(3).and_then(AmfValue::as_str) else {
            self.send_status(stream_id, "error", "NetStream.Publish.BadName", "missing stream name");
            return Ok(());
        };
        let Some(app) = self.session.app_name.clone() else {
            self.send_status(stream_id, "error", "NetStream.Publish.BadName", "connect first");
            return Ok(());
        };
        let (stream_path, stream_arguments) = parse_stream_path(&app, name);

        let ctx = Arc::new(PublishStreamContext::new(
            stream_path.clone(),
            stream_arguments,
            self.session.session_id,
            self.config.gop_cache_enabled,
            self.config.gop_max_bytes,
            self.config.gop_max_entries,
        ));

        if let Err(e) = self.registry.start_publishing(Arc::clone(&ctx)).await {
            warn!(
                session = self.session.session_id,
                stream = %stream_path,
                error = %e,
                "publish refused"
            );
            self.send_status(
                stream_id,
                "error",
                "NetStream.Publish.BadName",
                "stream is already being published",
            );
            return Ok(());
        }

        self.session.bind_publishing(stream_id, Arc::clone(&ctx));
        self.sender
            .send_control(ControlMessage::UserControl(EVENT_STREAM_BEGIN, stream_id));
        self.send_status(
            stream_id,
            "status",
            "NetStream.Publish.Start",
            "publishing started",
        );
        self.events.dispatch_published(
            self.session.session_id,
            &ctx.stream_path,
            &ctx.stream_arguments,
        );
        Ok(())
    }

    async fn on_play(&mut self, message: &Message, values: &[AmfValue]) -> Result<()> {
        let stream_id = message.message_stream_id;
        let Some(name) = values.get(3).and_then(AmfValue::as_str) else {
            self.send_status(stream_id, "error", "NetStream.Play.Failed", "missing stream name");
            return Ok(());
        };
        let Some(app) = self.session.app_name.clone() else {
            self.send_status(stream_id, "error", "NetStream.Play.Failed", "connect first");
            return Ok(());
        };
        let (stream_path, stream_arguments) = parse_stream_path(&app, name);

        let ctx = Arc::new(SubscribeStreamContext::new(
            stream_path.clone(),
            stream_arguments,
            self.session.session_id,
            stream_id,
            self.sender.clone(),
        ));

        if let Err(e) = self.registry.start_subscribing(Arc::clone(&ctx)).await {
            warn!(
                session = self.session.session_id,
                stream = %stream_path,
                error = %e,
                "play refused"
            );
            self.send_status(stream_id, "error", "NetStream.Play.Failed", "cannot subscribe");
            return Ok(());
        }

        self.session.bind_playing(stream_id, Arc::clone(&ctx));
        self.sender
            .send_control(ControlMessage::UserControl(EVENT_STREAM_BEGIN, stream_id));
        self.send_status(stream_id, "status", "NetStream.Play.Reset", "resetting stream");
        self.send_status(stream_id, "status", "NetStream.Play.Start", "playback started");
        self.events.dispatch_subscribed(
            self.session.session_id,
            &ctx.stream_path,
            &ctx.stream_arguments,
        );

        // Replay headers and GOP cache when the stream is live; otherwise
        // the subscriber just waits for a publisher to appear.
        match self.registry.get_publisher(&stream_path).await {
            Some(publisher) => self.broadcaster.bootstrap_subscriber(&publisher, &ctx).await,
            None => ctx.open_init_barrier(),
        }
        Ok(())
    }

    fn on_receive_toggle(
        &mut self,
        message: &Message,
        name: &str,
        values: &[AmfValue],
    ) -> Result<()> {
        let on = values.get(3).and_then(AmfValue::as_bool).unwrap_or(true);
        if let Some(StreamBinding::Playing(ctx)) = self.session.stream(message.message_stream_id) {
            match name {
                "receiveAudio" => ctx.set_receiving_audio(on),
                _ => ctx.set_receiving_video(on),
            }
        }
        Ok(())
    }

    /// `deleteStream`/`closeStream` and the per-stream half of teardown
    async fn close_stream(&mut self, stream_id: u32) {
        match self.session.remove_stream(stream_id) {
            Some(StreamBinding::Publishing(ctx)) => self.release_publisher(ctx).await,
            Some(StreamBinding::Playing(ctx)) => self.release_subscriber(ctx).await,
            _ => {}
        }
    }

    async fn release_publisher(&mut self, ctx: Arc<PublishStreamContext>) {
        let detached = self
            .registry
            .stop_publishing(&ctx.stream_path, self.session.session_id)
            .await;

        let notice = status_payload("status", "NetStream.Play.UnpublishNotify", "stream ended");
        for subscriber in detached {
            subscriber.enqueue_control(ControlMessage::UserControl(
                EVENT_STREAM_EOF,
                subscriber.stream_id,
            ));
            subscriber.enqueue_command(notice.clone());
        }

        self.events.dispatch_unpublished(
            self.session.session_id,
            &ctx.stream_path,
            &ctx.stream_arguments,
        );
    }

    async fn release_subscriber(&mut self, ctx: Arc<SubscribeStreamContext>) {
        self.registry
            .stop_subscribing(&ctx.stream_path, self.session.session_id)
            .await;
        self.events.dispatch_unsubscribed(
            self.session.session_id,
            &ctx.stream_path,
            &ctx.stream_arguments,
        );
    }

    async fn teardown(&mut self) {
        for binding in self.session.drain_streams() {
            match binding {
                StreamBinding::Publishing(ctx) => self.release_publisher(ctx).await,
                StreamBinding::Playing(ctx) => self.release_subscriber(ctx).await,
                StreamBinding::Idle => {}
            }
        }

        let stats = self.session.stats.snapshot();
        info!(
            session = self.session.session_id,
            peer = %self.session.peer_addr,
            bytes_in = stats.bytes_in,
            bytes_out = stats.bytes_out,
            dropped = self.sender.dropped(),
            "session closed"
        );
    }

    fn send_command(&mut self, stream_id: u32, values: &[AmfValue]) {
        self.sender.send_command(stream_id, amf::encode_all(values));
    }

    fn send_status(&mut self, stream_id: u32, level: &str, code: &str, description: &str) {
        self.sender
            .send_command(stream_id, status_payload(level, code, description));
    }
}

/// Encode an `onStatus` command payload
fn status_payload(level: &str, code: &str, description: &str) -> Bytes {
    let mut information = HashMap::new();
    information.insert("level".to_string(), AmfValue::String(level.to_string()));
    information.insert("code".to_string(), AmfValue::String(code.to_string()));
    information.insert(
        "description".to_string(),
        AmfValue::String(description.to_string()),
    );
    amf::encode_all(&[
        AmfValue::String("onStatus".to_string()),
        AmfValue::Number(0.0),
        AmfValue::Null,
        AmfValue::Object(information),
    ])
}

/// Split `app/name?k=v&...` into the stream path and its query arguments
fn parse_stream_path(app: &str, name: &str) -> (String, HashMap<String, String>) {
    let (key, query) = match name.split_once('?') {
        Some((key, query)) => (key, Some(query)),
        None => (name, None),
    };

    let mut arguments = HashMap::new();
    if let Some(query) = query {
        for pair in query.split('&') {
            if let Some((k, v)) = pair.split_once('=') {
                arguments.insert(k.to_string(), v.to_string());
            }
        }
    }
    (format!("{app}/{key}"), arguments)
}

/// Drain the outbound queue onto the socket
///
/// Owns the connection's only [`ChunkWriter`]. Exits when every sender is
/// gone and the queue is empty, or on the first failed write.
async fn write_loop(
    mut socket: OwnedWriteHalf,
    mut receiver: OutboundReceiver,
    stats: Arc<SessionStats>,
) {
    let mut writer = ChunkWriter::new();

    while let Some(packet) = receiver.recv().await {
        let wire = match encode_packet(&mut writer, packet) {
            Ok(wire) => wire,
            Err(e) => {
                debug!(error = %e, "failed to encode outbound packet");
                continue;
            }
        };
        if let Err(e) = socket.write_all(&wire).await {
            debug!(error = %e, "outbound write failed");
            return;
        }
        stats.add_bytes_out(wire.len() as u64);
        stats.add_message_out();
    }

    let _ = socket.shutdown().await;
}

/// Turn one queued packet into wire bytes
///
/// A SetChunkSize control updates the writer immediately after being
/// encoded, so later packets fragment at the announced size.
fn encode_packet(writer: &mut ChunkWriter, packet: OutboundPacket) -> Result<Bytes> {
    match packet {
        OutboundPacket::Raw(bytes) => Ok(bytes),
        OutboundPacket::Control(control) => {
            let wire = writer.write(
                CSID_PROTOCOL_CONTROL,
                0,
                control.message_type_id(),
                0,
                &control.encode(),
            )?;
            if let ControlMessage::SetChunkSize(size) = control {
                writer.set_chunk_size(size);
            }
            Ok(wire)
        }
        OutboundPacket::Media {
            media_type,
            timestamp,
            stream_id,
            payload,
        } => {
            let (csid, type_id) = match media_type {
                MediaType::Audio => (CSID_AUDIO, MSG_AUDIO),
                MediaType::Video => (CSID_VIDEO, MSG_VIDEO),
            };
            writer.write(csid, timestamp, type_id, stream_id, &payload)
        }
        OutboundPacket::Data {
            timestamp,
            stream_id,
            payload,
        } => writer.write(CSID_DATA, timestamp, MSG_DATA_AMF0, stream_id, &payload),
        OutboundPacket::Command { stream_id, payload } => {
            writer.write(CSID_COMMAND, 0, MSG_COMMAND_AMF0, stream_id, &payload)
        }
    }
}

fn handshake_timeout_error() -> Error {
    std::io::Error::new(std::io::ErrorKind::TimedOut, "handshake timed out").into()
}

fn idle_timeout_error() -> Error {
    std::io::Error::new(std::io::ErrorKind::TimedOut, "connection idle timeout").into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPool;

    fn shared(data: &[u8]) -> crate::buffer::SharedBuffer {
        let pool = BufferPool::new(64);
        let mut rented = pool.rent(data.len());
        rented.put_slice(data);
        rented.freeze()
    }

    #[test]
    fn test_parse_stream_path() {
        let (path, args) = parse_stream_path("live", "alpha");
        assert_eq!(path, "live/alpha");
        assert!(args.is_empty());

        let (path, args) = parse_stream_path("live", "alpha?token=abc&relay=1");
        assert_eq!(path, "live/alpha");
        assert_eq!(args.get("token").map(String::as_str), Some("abc"));
        assert_eq!(args.get("relay").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_status_payload_decodes() {
        let mut raw = status_payload("error", "NetStream.Publish.BadName", "taken");
        let values = amf::decode_all(&mut raw).unwrap();

        assert_eq!(values[0].as_str(), Some("onStatus"));
        assert_eq!(values[1].as_number(), Some(0.0));
        assert!(values[2].is_null_or_undefined());
        assert_eq!(
            values[3].get_string("code"),
            Some("NetStream.Publish.BadName")
        );
    }

    #[test]
    fn test_set_chunk_size_takes_effect_after_encoding() {
        let mut writer = ChunkWriter::new();

        let wire = encode_packet(&mut writer, OutboundPacket::Control(ControlMessage::SetChunkSize(4096)))
            .unwrap();
        // The control itself travels at the old size; 4 bytes fit either way.
        assert!(!wire.is_empty());
        assert_eq!(writer.chunk_size(), 4096);

        // A 1000-byte payload now fits in one fragment: exactly one basic
        // header for csid 5 at the start, no type-3 continuations.
        let payload = shared(&vec![7u8; 1000]);
        let wire = encode_packet(
            &mut writer,
            OutboundPacket::Media {
                media_type: MediaType::Video,
                timestamp: 0,
                stream_id: 1,
                payload,
            },
        )
        .unwrap();
        let continuations = wire
            .iter()
            .filter(|&&b| b == (0b1100_0000 | CSID_VIDEO as u8))
            .count();
        assert_eq!(continuations, 0);
    }

    #[test]
    fn test_media_packet_chunked_on_media_csid() {
        let mut writer = ChunkWriter::new();
        let wire = encode_packet(
            &mut writer,
            OutboundPacket::Media {
                media_type: MediaType::Audio,
                timestamp: 120,
                stream_id: 1,
                payload: shared(&[1, 2, 3]),
            },
        )
        .unwrap();

        // Type-0 basic header on the audio chunk stream.
        assert_eq!(wire[0], CSID_AUDIO as u8);
    }
}
