//! Server coordinator actor
//!
//! One task owns session membership, the cached response and the ingestion
//! lifecycle. Session open/close notifications, grace expiries and position
//! events all arrive as messages, so membership transitions (0 → 1 starts
//! ingestion, 1 → 0 arms the grace timer) are applied strictly in order.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use gs_core::time::{current_time_millis, elapsed_millis};
use gs_core::traits::PositionEvent;

use crate::bridge::LocationBridge;
use crate::broadcast::Broadcaster;
use crate::ingest::IngestionController;
use crate::session::{SessionCloseReason, SessionHandle, SessionRegistry};

/// Messages handled by the coordinator
#[derive(Debug)]
pub enum ServerEvent {
    /// A session was accepted and is about to run
    SessionOpened(Arc<SessionHandle>),
    /// A session finished; its handle carries the reason
    SessionClosed(Arc<SessionHandle>),
    /// The ingestion grace timer fired
    GraceExpired { generation: u64 },
}

/// Point-in-time view of the server for status reporting
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerSnapshot {
    /// Live sessions
    pub sessions: usize,
    /// Whether the position source is running
    pub ingesting: bool,
    /// Satellites last reported by the source
    pub satellites: u32,
    /// Timestamp of the last fix, milliseconds since the UNIX epoch
    pub last_fix: Option<u64>,
    /// Fixes broadcast since startup
    pub fixes_sent: u64,
}

impl ServerSnapshot {
    /// Age of the last fix in seconds
    pub fn last_fix_age(&self) -> Option<f32> {
        self.last_fix.map(|at| elapsed_millis(at) as f32 / 1000.0)
    }
}

pub(crate) struct Coordinator {
    registry: Arc<SessionRegistry>,
    broadcaster: Broadcaster,
    ingest: IngestionController,
    bridge: LocationBridge,
    events: mpsc::Receiver<ServerEvent>,
    positions: mpsc::Receiver<PositionEvent>,
    snapshot: watch::Sender<ServerSnapshot>,
    fixes_sent: u64,
    cancel: CancellationToken,
}

impl Coordinator {
    pub(crate) fn new(
        registry: Arc<SessionRegistry>,
        broadcaster: Broadcaster,
        ingest: IngestionController,
        events: mpsc::Receiver<ServerEvent>,
        positions: mpsc::Receiver<PositionEvent>,
        snapshot: watch::Sender<ServerSnapshot>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            ingest,
            bridge: LocationBridge::new(),
            events,
            positions,
            snapshot,
            fixes_sent: 0,
            cancel,
        }
    }

    /// Process messages until cancelled, then close everything down
    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                Some(event) = self.events.recv() => self.handle_event(event),

                Some(event) = self.positions.recv() => self.handle_position(event),
            }
            self.publish_snapshot();
        }

        self.shutdown();
    }

    fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::SessionOpened(session) => {
                let count = self.registry.insert(Arc::clone(&session));
                tracing::info!("Receiver connected: {} ({} live)", session.addr(), count);

                if let Err(e) = self.ingest.on_listener(&self.broadcaster) {
                    tracing::error!("{}", e);
                }
            }

            ServerEvent::SessionClosed(session) => {
                if !self.registry.remove(&session) {
                    return;
                }
                let count = self.registry.len();
                tracing::info!(
                    "Receiver disconnected: {} ({} live)",
                    session.addr(),
                    count
                );

                if count == 0 {
                    self.ingest.on_last_listener_left();
                }
            }

            ServerEvent::GraceExpired { generation } => {
                if self.registry.is_empty() {
                    self.ingest.on_grace_expired(generation, &self.broadcaster);
                }
            }
        }
    }

    fn handle_position(&mut self, event: PositionEvent) {
        if !self.ingest.is_active() {
            tracing::trace!("Dropping position event while ingestion is stopped");
            return;
        }

        if let Some(response) = self.bridge.on_event(event, current_time_millis()) {
            self.fixes_sent += 1;
            self.broadcaster.publish(response);
        }
    }

    fn publish_snapshot(&self) {
        let snapshot = ServerSnapshot {
            sessions: self.registry.len(),
            ingesting: self.ingest.is_active(),
            satellites: self.bridge.satellites(),
            last_fix: self.bridge.last_fix(),
            fixes_sent: self.fixes_sent,
        };
        self.snapshot.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    fn shutdown(&mut self) {
        tracing::info!("Closing {} sessions", self.registry.len());
        self.registry.close_all(SessionCloseReason::ServerStopping);
        self.ingest.stop(&self.broadcaster);
        self.publish_snapshot();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gs_core::traits::{PositionFix, PositionSink, PositionSource};
    use gs_core::ServerError;
    use gs_protocol::ServerResponse;
    use std::net::SocketAddr;
    use std::time::Duration;

    struct NullSource;

    impl PositionSource for NullSource {
        fn start(&mut self, _sink: PositionSink) -> Result<(), ServerError> {
            Ok(())
        }

        fn stop(&mut self) {}
    }

    struct Fixture {
        events: mpsc::Sender<ServerEvent>,
        positions: mpsc::Sender<PositionEvent>,
        snapshot: watch::Receiver<ServerSnapshot>,
        registry: Arc<SessionRegistry>,
        cancel: CancellationToken,
        task: tokio::task::JoinHandle<()>,
    }

    fn spawn(grace: Duration) -> Fixture {
        let registry = Arc::new(SessionRegistry::new());
        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        let (events_tx, events_rx) = mpsc::channel(16);
        let (positions_tx, positions_rx) = mpsc::channel(16);
        let (snapshot_tx, snapshot) = watch::channel(ServerSnapshot::default());
        let cancel = CancellationToken::new();

        let ingest = IngestionController::new(
            Box::new(NullSource),
            PositionSink::new(positions_tx.clone()),
            events_tx.clone(),
            grace,
        );
        let coordinator = Coordinator::new(
            Arc::clone(&registry),
            broadcaster,
            ingest,
            events_rx,
            positions_rx,
            snapshot_tx,
            cancel.clone(),
        );

        Fixture {
            events: events_tx,
            positions: positions_tx,
            snapshot,
            registry,
            cancel,
            task: tokio::spawn(coordinator.run()),
        }
    }

    fn session(port: u16) -> (Arc<SessionHandle>, mpsc::Receiver<Arc<ServerResponse>>) {
        let addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
        SessionHandle::new(addr, 8, CancellationToken::new())
    }

    #[tokio::test(start_paused = true)]
    async fn test_membership_drives_ingestion() {
        let mut f = spawn(Duration::from_secs(15));
        let (a, _rx) = session(1);

        f.events.send(ServerEvent::SessionOpened(Arc::clone(&a))).await.unwrap();
        f.snapshot.wait_for(|s| s.sessions == 1 && s.ingesting).await.unwrap();

        f.events.send(ServerEvent::SessionClosed(a)).await.unwrap();
        f.snapshot.wait_for(|s| s.sessions == 0).await.unwrap();
        assert!(f.snapshot.borrow().ingesting);

        // Grace period elapses with nobody listening
        f.snapshot.wait_for(|s| !s.ingesting).await.unwrap();
        assert!(f.registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fix_fans_out() {
        let mut f = spawn(Duration::from_secs(15));
        let (a, mut rx) = session(1);
        f.events.send(ServerEvent::SessionOpened(a)).await.unwrap();
        f.snapshot.wait_for(|s| s.ingesting).await.unwrap();

        f.positions.send(PositionEvent::Satellites(7)).await.unwrap();
        let fix = PositionFix {
            timestamp: current_time_millis(),
            latitude: 1.0,
            longitude: 2.0,
            provider: "gps".into(),
            ..Default::default()
        };
        f.positions.send(PositionEvent::Fix(fix)).await.unwrap();

        let frame = rx.recv().await.unwrap();
        let update = frame.location().unwrap();
        assert_eq!(update.satellites, 7);
        assert_eq!((update.latitude, update.longitude), (1.0, 2.0));

        f.snapshot.wait_for(|s| s.fixes_sent == 1).await.unwrap();
        let snapshot = f.snapshot.borrow().clone();
        assert_eq!(snapshot.satellites, 7);
        assert!(snapshot.last_fix_age().unwrap() < 60.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_closes_sessions() {
        let mut f = spawn(Duration::from_secs(15));
        let (a, _rx) = session(1);
        f.events.send(ServerEvent::SessionOpened(Arc::clone(&a))).await.unwrap();
        f.snapshot.wait_for(|s| s.sessions == 1).await.unwrap();

        f.cancel.cancel();
        f.task.await.unwrap();
        assert_eq!(a.close_reason(), Some(SessionCloseReason::ServerStopping));
        assert!(!f.snapshot.borrow().ingesting);
    }
}
