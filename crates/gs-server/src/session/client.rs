//! Server-side session for one connected receiver
//!
//! The session reads heartbeat bytes, tracks liveness and owns a writer
//! task that drains the outbound queue into framed writes. It ends on peer
//! EOF, I/O error, heartbeat timeout or when its handle is closed. Either
//! way the coordinator is told exactly once.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;

use gs_core::config::ServerConfig;
use gs_protocol::{ResponseCodec, ServerResponse, HEARTBEAT_BYTE};

use super::handle::{SessionCloseReason, SessionHandle};
use crate::broadcast::ResponseCache;
use crate::coordinator::ServerEvent;

/// Settings and shared handles every session needs
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub read_timeout: Duration,
    pub heartbeat_timeout: Duration,
    pub response_interval: Duration,
    pub queue_capacity: usize,
    pub cache: ResponseCache,
    pub events: mpsc::Sender<ServerEvent>,
    /// Server-wide token; every session's token is a child of it
    pub shutdown: CancellationToken,
}

impl SessionContext {
    /// Build a context from server configuration
    pub fn from_config(
        config: &ServerConfig,
        cache: ResponseCache,
        events: mpsc::Sender<ServerEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            read_timeout: config.read_timeout,
            heartbeat_timeout: config.heartbeat_timeout,
            response_interval: config.response_interval,
            queue_capacity: config.outbound_queue,
            cache,
            events,
            shutdown,
        }
    }
}

/// A running session, consumed by `run`
pub struct ClientSession {
    handle: Arc<SessionHandle>,
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    outbound: mpsc::Receiver<Arc<ServerResponse>>,
    ctx: SessionContext,
    last_heartbeat: Instant,
}

impl ClientSession {
    /// Wrap an accepted stream
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        ctx: SessionContext,
    ) -> (Arc<SessionHandle>, Self) {
        let (handle, outbound) =
            SessionHandle::new(addr, ctx.queue_capacity, ctx.shutdown.child_token());
        let (reader, writer) = stream.into_split();

        let session = Self {
            handle: Arc::clone(&handle),
            reader,
            writer,
            outbound,
            ctx,
            last_heartbeat: Instant::now(),
        };
        (handle, session)
    }

    /// Drive the session until it ends, then report the closure
    pub async fn run(mut self) {
        let addr = self.handle.addr();
        tracing::debug!("Session started for {}", addr);

        let writer = tokio::spawn(write_loop(
            Arc::clone(&self.handle),
            self.writer,
            self.outbound,
        ));

        let reason = read_loop(
            &self.handle,
            &mut self.reader,
            &self.ctx,
            &mut self.last_heartbeat,
        )
        .await;
        self.handle.close(reason);

        if let Err(e) = writer.await {
            tracing::warn!("Writer task for {} failed: {}", addr, e);
        }

        match self.handle.close_reason() {
            Some(reason) if reason.is_liveness() => {
                tracing::warn!("Session {} dropped: {}", addr, reason)
            }
            Some(reason) => tracing::info!("Session {} closed: {}", addr, reason),
            None => tracing::info!("Session {} closed", addr),
        }

        if self
            .ctx
            .events
            .send(ServerEvent::SessionClosed(Arc::clone(&self.handle)))
            .await
            .is_err()
        {
            tracing::debug!("Coordinator gone before session {} closed", addr);
        }
    }
}

/// Read heartbeat bytes until the session must end; returns why
async fn read_loop(
    handle: &SessionHandle,
    reader: &mut OwnedReadHalf,
    ctx: &SessionContext,
    last_heartbeat: &mut Instant,
) -> SessionCloseReason {
    let cancel = handle.cancelled();

    loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return handle.close_reason().unwrap_or(SessionCloseReason::ServerStopping);
            }
            read = tokio::time::timeout(ctx.read_timeout, reader.read_u8()) => read,
        };

        match read {
            Ok(Ok(HEARTBEAT_BYTE)) => {
                *last_heartbeat = Instant::now();
                tracing::trace!("Heartbeat from {}", handle.addr());
                resend_if_due(handle, ctx);
                continue;
            }
            Ok(Ok(byte)) => {
                tracing::warn!("Unexpected byte 0x{:02x} from {}", byte, handle.addr());
            }
            Ok(Err(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                return SessionCloseReason::PeerClosed;
            }
            Ok(Err(e)) => return SessionCloseReason::ReadFailed(e.to_string()),
            Err(_) => {}
        }

        // Only heartbeats count as liveness, other traffic does not
        let silence = last_heartbeat.elapsed();
        if silence > ctx.heartbeat_timeout {
            return SessionCloseReason::HeartbeatTimeout(silence);
        }
    }
}

/// Resend the cached response if the peer has not heard from us recently,
/// or if all we have is a status line
fn resend_if_due(handle: &SessionHandle, ctx: &SessionContext) {
    let latest = ctx.cache.latest();
    let due = handle
        .since_last_sent()
        .map_or(true, |since| since > ctx.response_interval);

    if due || !latest.has_location() {
        handle.send(latest);
    }
}

/// Drain the outbound queue into framed writes
async fn write_loop(
    handle: Arc<SessionHandle>,
    writer: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<Arc<ServerResponse>>,
) {
    let cancel = handle.cancelled();
    let mut framed = FramedWrite::new(writer, ResponseCodec::new());

    loop {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            response = outbound.recv() => match response {
                Some(response) => response,
                None => break,
            },
        };

        match framed.send(response.as_ref()).await {
            Ok(()) => handle.mark_sent(),
            Err(e) => {
                handle.close(SessionCloseReason::WriteFailed(e.to_string()));
                break;
            }
        }
    }

    let mut writer = framed.into_inner();
    if let Err(e) = writer.shutdown().await {
        tracing::trace!("Shutdown of {} failed: {}", handle.addr(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Broadcaster;
    use crate::session::SessionRegistry;
    use futures::StreamExt;
    use gs_protocol::{LocationUpdate, ServerStatus};
    use tokio::net::TcpListener;
    use tokio_util::codec::FramedRead;

    struct Harness {
        broadcaster: Broadcaster,
        events: mpsc::Receiver<ServerEvent>,
        handle: Arc<SessionHandle>,
        peer: TcpStream,
    }

    async fn start(heartbeat_timeout: Duration) -> Harness {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let peer = TcpStream::connect(addr).await.unwrap();
        let (stream, remote) = listener.accept().await.unwrap();

        let broadcaster = Broadcaster::new(Arc::new(SessionRegistry::new()));
        let (events_tx, events) = mpsc::channel(8);
        let ctx = SessionContext {
            read_timeout: Duration::from_millis(50),
            heartbeat_timeout,
            response_interval: Duration::from_millis(1000),
            queue_capacity: 8,
            cache: broadcaster.subscribe(),
            events: events_tx,
            shutdown: CancellationToken::new(),
        };

        let (handle, session) = ClientSession::new(stream, remote, ctx);
        tokio::spawn(session.run());
        Harness {
            broadcaster,
            events,
            handle,
            peer,
        }
    }

    async fn next_closed(events: &mut mpsc::Receiver<ServerEvent>) -> Arc<SessionHandle> {
        match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
            Ok(Some(ServerEvent::SessionClosed(handle))) => handle,
            _ => panic!("expected SessionClosed"),
        }
    }

    #[tokio::test]
    async fn test_heartbeat_resends_status() {
        let h = start(Duration::from_secs(5)).await;
        h.broadcaster.set_status(ServerStatus::AwaitingLocation);

        let (read, mut write) = h.peer.into_split();
        let mut frames = FramedRead::new(read, ResponseCodec::new());

        // Status-only cache is resent on every heartbeat
        for _ in 0..2 {
            write.write_u8(HEARTBEAT_BYTE).await.unwrap();
            let frame = frames.next().await.unwrap().unwrap();
            assert_eq!(frame, ServerResponse::status(ServerStatus::AwaitingLocation));
        }
    }

    #[tokio::test]
    async fn test_location_not_resent_within_spacing() {
        let h = start(Duration::from_secs(5)).await;
        let (read, mut write) = h.peer.into_split();
        let mut frames = FramedRead::new(read, ResponseCodec::new());

        write.write_u8(HEARTBEAT_BYTE).await.unwrap();
        frames.next().await.unwrap().unwrap();

        // Cache the fix without pushing it: the broadcaster has no sessions
        let update = ServerResponse::from(LocationUpdate::new(1, 2.0, 3.0, "gps"));
        assert_eq!(h.broadcaster.publish(update), 0);

        write.write_u8(HEARTBEAT_BYTE).await.unwrap();
        let quiet = tokio::time::timeout(Duration::from_millis(200), frames.next()).await;
        assert!(quiet.is_err());
        assert!(!h.handle.is_closed());
    }

    #[tokio::test]
    async fn test_unknown_byte_is_ignored() {
        let mut h = start(Duration::from_secs(5)).await;
        h.peer.write_u8(0x7f).await.unwrap();
        h.peer.write_u8(HEARTBEAT_BYTE).await.unwrap();

        let mut frames = FramedRead::new(h.peer, ResponseCodec::new());
        let frame = frames.next().await.unwrap().unwrap();
        assert_eq!(frame, ServerResponse::status(ServerStatus::Uninitialized));
        assert!(!h.handle.is_closed());
    }

    #[tokio::test]
    async fn test_peer_close_ends_session() {
        let mut h = start(Duration::from_secs(5)).await;
        drop(h.peer);

        let closed = next_closed(&mut h.events).await;
        assert!(Arc::ptr_eq(&closed, &h.handle));
        assert_eq!(closed.close_reason(), Some(SessionCloseReason::PeerClosed));
    }

    #[tokio::test]
    async fn test_silence_ends_session() {
        let mut h = start(Duration::from_millis(200)).await;

        let closed = next_closed(&mut h.events).await;
        assert!(matches!(
            closed.close_reason(),
            Some(SessionCloseReason::HeartbeatTimeout(silence)) if silence > Duration::from_millis(200)
        ));

        // Socket is closed on teardown
        let mut buf = [0u8; 1];
        let n = h.peer.read(&mut buf).await.unwrap_or(0);
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_junk_bytes_do_not_count_as_heartbeats() {
        let mut h = start(Duration::from_millis(300)).await;
        let (_read, mut write) = h.peer.into_split();

        // Traffic faster than the read timeout, but never a heartbeat
        let chatter = tokio::spawn(async move {
            loop {
                if write.write_u8(0x7f).await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        });

        let closed = next_closed(&mut h.events).await;
        assert!(matches!(
            closed.close_reason(),
            Some(SessionCloseReason::HeartbeatTimeout(silence)) if silence > Duration::from_millis(300)
        ));
        chatter.abort();
    }

    #[tokio::test]
    async fn test_server_token_closes_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut peer = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (stream, remote) = listener.accept().await.unwrap();

        let broadcaster = Broadcaster::new(Arc::new(SessionRegistry::new()));
        let (events_tx, mut events) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let ctx = SessionContext {
            read_timeout: Duration::from_millis(50),
            heartbeat_timeout: Duration::from_secs(5),
            response_interval: Duration::from_millis(1000),
            queue_capacity: 8,
            cache: broadcaster.subscribe(),
            events: events_tx,
            shutdown: shutdown.clone(),
        };

        // Never handed to a registry, so only the server token can stop it
        let (handle, session) = ClientSession::new(stream, remote, ctx);
        tokio::spawn(session.run());
        peer.write_u8(HEARTBEAT_BYTE).await.unwrap();

        shutdown.cancel();
        let closed = next_closed(&mut events).await;
        assert!(Arc::ptr_eq(&closed, &handle));
        assert_eq!(closed.close_reason(), Some(SessionCloseReason::ServerStopping));
    }

    #[tokio::test]
    async fn test_write_failure_only_drops_that_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (stream, remote) = listener.accept().await.unwrap();

        let registry = Arc::new(SessionRegistry::new());
        let broadcaster = Broadcaster::new(Arc::clone(&registry));

        // Writer only, so the failure surfaces on the write path
        let (broken, outbound) = SessionHandle::new(remote, 8, CancellationToken::new());
        let (_reader, writer) = stream.into_split();
        let writer_task = tokio::spawn(write_loop(Arc::clone(&broken), writer, outbound));

        let healthy_addr: SocketAddr = "127.0.0.1:40001".parse().unwrap();
        let (healthy, mut healthy_rx) =
            SessionHandle::new(healthy_addr, 64, CancellationToken::new());
        registry.insert(Arc::clone(&broken));
        registry.insert(Arc::clone(&healthy));

        drop(peer);

        let mut published = 0;
        while !broken.is_closed() && published < 50 {
            let update = LocationUpdate::new(published, 1.0, 2.0, "gps");
            broadcaster.publish(ServerResponse::from(update));
            published += 1;
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert!(matches!(
            broken.close_reason(),
            Some(SessionCloseReason::WriteFailed(_))
        ));
        tokio::time::timeout(Duration::from_secs(5), writer_task)
            .await
            .unwrap()
            .unwrap();

        // Every frame still reached the other session
        assert!(!healthy.is_closed());
        for expected in 0..published {
            let frame = healthy_rx.recv().await.unwrap();
            assert_eq!(frame.location().unwrap().timestamp, expected);
        }
    }

    #[tokio::test]
    async fn test_close_from_server_side() {
        let mut h = start(Duration::from_secs(5)).await;
        h.handle.close(SessionCloseReason::ServerStopping);

        let closed = next_closed(&mut h.events).await;
        assert_eq!(closed.close_reason(), Some(SessionCloseReason::ServerStopping));
    }
}
