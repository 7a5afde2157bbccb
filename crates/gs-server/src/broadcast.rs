//! Fan-out of the latest server response
//!
//! The `Broadcaster` owns the process-wide "last known response". Only the
//! coordinator holds it, which makes it the single writer; sessions read the
//! cached value through `ResponseCache` when deciding whether to resend.

use std::sync::Arc;

use tokio::sync::watch;

use gs_protocol::{ServerResponse, ServerStatus};

use crate::session::SessionRegistry;

/// Read-only view of the cached response
#[derive(Debug, Clone)]
pub struct ResponseCache {
    rx: watch::Receiver<Arc<ServerResponse>>,
}

impl ResponseCache {
    /// Latest cached response
    pub fn latest(&self) -> Arc<ServerResponse> {
        self.rx.borrow().clone()
    }

    /// Wait until the cached response changes
    pub async fn changed(&mut self) -> Option<Arc<ServerResponse>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

/// Writer side of the cached response plus fan-out to live sessions
pub struct Broadcaster {
    latest: watch::Sender<Arc<ServerResponse>>,
    registry: Arc<SessionRegistry>,
}

impl Broadcaster {
    /// Create a broadcaster whose cache starts as `Uninitialized`
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        let (latest, _) = watch::channel(Arc::new(ServerResponse::status(
            ServerStatus::Uninitialized,
        )));
        Self { latest, registry }
    }

    /// Currently cached response
    pub fn latest(&self) -> Arc<ServerResponse> {
        self.latest.borrow().clone()
    }

    /// New reader of the cache
    pub fn subscribe(&self) -> ResponseCache {
        ResponseCache {
            rx: self.latest.subscribe(),
        }
    }

    /// Replace the cache with a status line.
    ///
    /// Not pushed: sessions pick status responses up on their next
    /// heartbeat, since a cache without a location is always resent.
    pub fn set_status(&self, status: ServerStatus) {
        tracing::debug!("Server status: {}", status);
        self.store(Arc::new(ServerResponse::status(status)));
    }

    /// Cache `response` and push it to every live session.
    ///
    /// Returns the number of sessions that accepted the frame. A session
    /// that cannot take it is closed without affecting the others.
    pub fn publish(&self, response: ServerResponse) -> usize {
        let response = Arc::new(response);
        self.store(Arc::clone(&response));

        let sessions = self.registry.snapshot();
        let delivered = sessions
            .iter()
            .filter(|session| session.send(Arc::clone(&response)))
            .count();

        tracing::trace!("Broadcast to {}/{} sessions", delivered, sessions.len());
        delivered
    }

    fn store(&self, response: Arc<ServerResponse>) {
        // send_replace succeeds with no receivers
        self.latest.send_replace(response);
    }
}
