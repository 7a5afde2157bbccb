//! Shared handle to a live session

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use gs_protocol::ServerResponse;

/// Why a session ended
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionCloseReason {
    /// Peer closed its end of the socket
    #[error("client closed connection")]
    PeerClosed,

    /// Read failed
    #[error("read failed: {0}")]
    ReadFailed(String),

    /// Frame could not be written
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// No heartbeat within the timeout
    #[error("heartbeat timeout (last heartbeat {0:?} ago)")]
    HeartbeatTimeout(Duration),

    /// Outbound queue filled up; the peer is not draining frames
    #[error("outbound queue full")]
    Backpressure,

    /// Server is stopping
    #[error("server stopping")]
    ServerStopping,
}

impl SessionCloseReason {
    /// Whether the session was dropped by liveness monitoring
    pub fn is_liveness(&self) -> bool {
        matches!(
            self,
            SessionCloseReason::HeartbeatTimeout(_) | SessionCloseReason::Backpressure
        )
    }
}

/// Handle used by the coordinator and broadcaster to reach a session.
///
/// Sending is fire-and-forget: frames are queued for the session's writer
/// task and a failure only ever tears down this session.
#[derive(Debug)]
pub struct SessionHandle {
    /// Remote address, also the session's identity in the registry
    addr: SocketAddr,
    /// Queue drained by the writer task
    outbound: mpsc::Sender<Arc<ServerResponse>>,
    /// Cancels both the reader loop and the writer task
    cancel: CancellationToken,
    /// First recorded close reason wins
    close_reason: OnceLock<SessionCloseReason>,
    /// When the last frame reached the socket
    last_sent: Mutex<Option<Instant>>,
}

impl SessionHandle {
    /// Create a handle; the receiving half of the queue goes to the writer.
    ///
    /// `cancel` should be a child of the server's token so a server stop
    /// reaches sessions the coordinator has not registered yet.
    pub fn new(
        addr: SocketAddr,
        queue_capacity: usize,
        cancel: CancellationToken,
    ) -> (Arc<Self>, mpsc::Receiver<Arc<ServerResponse>>) {
        let (outbound, rx) = mpsc::channel(queue_capacity.max(1));
        let handle = Arc::new(Self {
            addr,
            outbound,
            cancel,
            close_reason: OnceLock::new(),
            last_sent: Mutex::new(None),
        });
        (handle, rx)
    }

    /// Remote address of the peer
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Queue a frame for delivery.
    ///
    /// Returns false if the session is closed or could not take the frame;
    /// a full queue closes the session.
    pub fn send(&self, response: Arc<ServerResponse>) -> bool {
        if self.is_closed() {
            return false;
        }

        match self.outbound.try_send(response) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("Outbound queue full for {}, dropping session", self.addr);
                self.close(SessionCloseReason::Backpressure);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Close the session. Idempotent; the first reason is kept.
    pub fn close(&self, reason: SessionCloseReason) {
        let _ = self.close_reason.set(reason);
        self.cancel.cancel();
    }

    /// Whether the session has been closed
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Reason recorded by the first `close` call
    pub fn close_reason(&self) -> Option<SessionCloseReason> {
        self.close_reason.get().cloned()
    }

    /// Token cancelled when the session closes
    pub fn cancelled(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Record that a frame reached the socket
    pub fn mark_sent(&self) {
        let mut last_sent = self.last_sent.lock().unwrap_or_else(|e| e.into_inner());
        *last_sent = Some(Instant::now());
    }

    /// Time since the last frame was written, `None` if nothing was sent yet
    pub fn since_last_sent(&self) -> Option<Duration> {
        let last_sent = self.last_sent.lock().unwrap_or_else(|e| e.into_inner());
        last_sent.map(|at| at.elapsed())
    }
}
