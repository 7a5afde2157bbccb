//! Location server
//!
//! `LinkServer::bind` claims the listening socket up front so a port
//! conflict is reported to the caller instead of being retried. `run`
//! drives the accept loop and the coordinator until the server is shut
//! down through a `ServerHandle`.

mod listener;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use gs_core::config::ServerConfig;
use gs_core::traits::{PositionSink, PositionSource};
use gs_core::ServerError;
use gs_protocol::ServerResponse;

use crate::broadcast::{Broadcaster, ResponseCache};
use crate::coordinator::{Coordinator, ServerEvent, ServerSnapshot};
use crate::ingest::IngestionController;
use crate::session::{SessionContext, SessionRegistry};

/// Capacity of the coordinator's event queue
const EVENT_QUEUE: usize = 256;

/// Capacity of the position event queue
const POSITION_QUEUE: usize = 64;

/// A bound, not yet running server
pub struct LinkServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    coordinator: Coordinator,
    ctx: SessionContext,
    events: mpsc::Sender<ServerEvent>,
    cancel: CancellationToken,
    snapshot: watch::Receiver<ServerSnapshot>,
}

impl LinkServer {
    /// Bind the listening socket and wire up the coordinator.
    ///
    /// Fails if the address cannot be bound.
    pub async fn bind(
        config: &ServerConfig,
        source: Box<dyn PositionSource>,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.bind_address)
            .await
            .map_err(|source| ServerError::Bind {
                address: config.bind_address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            address: config.bind_address.clone(),
            source,
        })?;

        let registry = Arc::new(SessionRegistry::new());
        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
        let (positions_tx, positions_rx) = mpsc::channel(POSITION_QUEUE);
        let (snapshot_tx, snapshot) = watch::channel(ServerSnapshot::default());
        let cancel = CancellationToken::new();

        let ctx = SessionContext::from_config(
            config,
            broadcaster.subscribe(),
            events_tx.clone(),
            cancel.clone(),
        );
        let ingest = IngestionController::new(
            source,
            PositionSink::new(positions_tx),
            events_tx.clone(),
            config.ingestion_grace,
        );
        let coordinator = Coordinator::new(
            registry,
            broadcaster,
            ingest,
            events_rx,
            positions_rx,
            snapshot_tx,
            cancel.clone(),
        );

        tracing::info!("Listening on {}", local_addr);

        Ok(Self {
            listener,
            local_addr,
            coordinator,
            ctx,
            events: events_tx,
            cancel,
            snapshot,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle for observing and stopping the server
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            local_addr: self.local_addr,
            cancel: self.cancel.clone(),
            snapshot: self.snapshot.clone(),
            cache: self.ctx.cache.clone(),
        }
    }

    /// Serve until shut down. Returns once every session has ended.
    pub async fn run(self) {
        let coordinator = tokio::spawn(self.coordinator.run());

        listener::accept_loop(self.listener, self.ctx, self.events, self.cancel.clone()).await;

        if let Err(e) = coordinator.await {
            tracing::error!("Coordinator task failed: {}", e);
        }
        tracing::info!("Server stopped");
    }
}

/// Cloneable control and status handle for a running server
#[derive(Debug, Clone)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    snapshot: watch::Receiver<ServerSnapshot>,
    cache: ResponseCache,
}

impl ServerHandle {
    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Current server status
    pub fn snapshot(&self) -> ServerSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver notified whenever the status changes
    pub fn watch(&self) -> watch::Receiver<ServerSnapshot> {
        self.snapshot.clone()
    }

    /// Response currently cached for resends
    pub fn latest_response(&self) -> Arc<ServerResponse> {
        self.cache.latest()
    }

    /// Stop accepting, close every session and stop ingestion. Idempotent.
    pub fn shutdown(&self) {
        if !self.cancel.is_cancelled() {
            tracing::info!("Server shutdown requested");
        }
        self.cancel.cancel();
    }

    /// Whether shutdown has been requested
    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
