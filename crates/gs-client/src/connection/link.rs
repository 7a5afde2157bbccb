//! An established connection and the tasks attached to it
//!
//! A `Link` owns the frame reader task plus the heartbeat and health-check
//! timers. Any of them may detect that the connection is gone; each reports
//! through the manager queue tagged with the attempt that opened the link,
//! so reports from a link that was already replaced are ignored.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use gs_core::config::ClientConfig;
use gs_core::timer::TimerHandle;
use gs_core::ConnectionError;
use gs_protocol::HEARTBEAT_BYTE;

use super::manager::ManagerEvent;
use crate::bridge;
use crate::event::LinkEvent;

pub(super) struct Link {
    address: String,
    peer: SocketAddr,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    reader: JoinHandle<()>,
    heartbeat: TimerHandle,
    health: TimerHandle,
    /// Cancelled once the reader or heartbeat task has ended
    alive: CancellationToken,
}

impl Link {
    /// Start the reader, heartbeat and health-check tasks on a connected
    /// stream
    pub(super) fn establish(
        stream: TcpStream,
        address: String,
        attempt: u64,
        config: &ClientConfig,
        events: mpsc::UnboundedSender<LinkEvent>,
        manager: mpsc::UnboundedSender<ManagerEvent>,
    ) -> Result<Self, ConnectionError> {
        let peer = stream.peer_addr()?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Failed to set TCP_NODELAY: {}", e);
        }

        let (read_half, write_half) = stream.into_split();
        let writer = Arc::new(Mutex::new(write_half));
        let alive = CancellationToken::new();

        let reader = {
            let alive = alive.clone();
            let manager = manager.clone();
            let read_timeout = config.read_timeout;
            tokio::spawn(async move {
                let _alive = alive.drop_guard();
                let error = bridge::read_frames(read_half, read_timeout, &events).await;
                let _ = manager.send(ManagerEvent::ConnectionLost { attempt, error });
            })
        };

        let heartbeat = {
            let writer = Arc::clone(&writer);
            let alive = alive.clone();
            let manager = manager.clone();
            TimerHandle::repeating("heartbeat", config.heartbeat_interval, move || {
                let writer = Arc::clone(&writer);
                let alive = alive.clone();
                let manager = manager.clone();
                async move {
                    let result = writer.lock().await.write_u8(HEARTBEAT_BYTE).await;
                    match result {
                        Ok(()) => {
                            tracing::trace!("Heartbeat sent");
                            true
                        }
                        Err(e) => {
                            alive.cancel();
                            let error = ConnectionError::HeartbeatFailed(e);
                            let _ = manager.send(ManagerEvent::ConnectionLost { attempt, error });
                            false
                        }
                    }
                }
            })
        };

        let health = {
            let writer = Arc::clone(&writer);
            let alive = alive.clone();
            TimerHandle::repeating("health-check", config.health_check_interval, move || {
                let writer = Arc::clone(&writer);
                let alive = alive.clone();
                let manager = manager.clone();
                async move {
                    let problem = if alive.is_cancelled() {
                        Some("link task ended".to_string())
                    } else {
                        writer.lock().await.peer_addr().err().map(|e| e.to_string())
                    };

                    match problem {
                        None => true,
                        Some(reason) => {
                            let error = ConnectionError::HealthCheckFailed(reason);
                            let _ = manager.send(ManagerEvent::ConnectionLost { attempt, error });
                            false
                        }
                    }
                }
            })
        };

        Ok(Self {
            address,
            peer,
            writer,
            reader,
            heartbeat,
            health,
            alive,
        })
    }

    /// Resolved server host
    pub(super) fn address(&self) -> &str {
        &self.address
    }

    /// Remote socket address
    pub(super) fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Stop every attached task and close the socket.
    ///
    /// Once this returns the reader can no longer emit events.
    pub(super) async fn close(self) {
        self.heartbeat.cancel();
        self.health.cancel();
        self.alive.cancel();

        self.reader.abort();
        let _ = self.reader.await;

        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            tracing::trace!("Socket shutdown failed: {}", e);
        }
    }
}
