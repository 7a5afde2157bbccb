//! Connection manager actor
//!
//! All connection state lives in one task that drains a single queue.
//! Commands from `ConnectionHandle`s, timer expirations, connect results
//! and loss reports from the live link are all messages on that queue, so
//! transitions never run concurrently. Work that can block (resolution,
//! connecting, socket I/O) runs on other tasks and reports back tagged
//! with the attempt it belongs to; results for a superseded attempt are
//! dropped.
//!
//! Reconnects use a fixed delay and are only scheduled while the network
//! is reported available. A network-available notification while
//! disconnected connects right away.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use gs_core::config::ClientConfig;
use gs_core::timer::{cancel_slot, TimerHandle};
use gs_core::traits::AddressResolver;
use gs_core::ConnectionError;

use super::link::Link;
use super::reconnect::FixedDelay;
use super::state::{ConnectionState, ConnectionStatus};
use crate::event::LinkEvent;

/// Messages processed by the manager task
#[derive(Debug)]
pub(crate) enum ManagerEvent {
    Connect,
    Disconnect { reason: String },
    NetworkAvailable,
    NetworkLost,
    Shutdown { done: oneshot::Sender<()> },
    Resolved { attempt: u64, host: String },
    ResolveFailed { attempt: u64 },
    ConnectResult {
        attempt: u64,
        host: String,
        result: Result<TcpStream, ConnectionError>,
    },
    ConnectionLost { attempt: u64, error: ConnectionError },
    ReconnectDue { generation: u64 },
}

/// Cloneable handle for driving a `ConnectionManager`.
///
/// Every method is safe to call from any task. Once the manager has shut
/// down, commands are ignored.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    tx: mpsc::UnboundedSender<ManagerEvent>,
    status: watch::Receiver<ConnectionStatus>,
}

impl ConnectionHandle {
    /// Request a connection if currently disconnected
    pub fn connect(&self) {
        let _ = self.tx.send(ManagerEvent::Connect);
    }

    /// Drop the current connection. A reconnect follows if the network is
    /// available.
    pub fn disconnect(&self, reason: impl Into<String>) {
        let _ = self.tx.send(ManagerEvent::Disconnect {
            reason: reason.into(),
        });
    }

    /// The network came up
    pub fn network_available(&self) {
        let _ = self.tx.send(ManagerEvent::NetworkAvailable);
    }

    /// The network went away
    pub fn network_lost(&self) {
        let _ = self.tx.send(ManagerEvent::NetworkLost);
    }

    /// Stop for good: close the connection, cancel every timer and end the
    /// manager task. Idempotent. When this returns no further events will
    /// be delivered.
    pub async fn shutdown(&self) {
        let (done, ack) = oneshot::channel();
        if self.tx.send(ManagerEvent::Shutdown { done }).is_ok() {
            let _ = ack.await;
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    /// Current state with reason and server address
    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every reported status change
    pub fn watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }
}

/// State machine owning the client's connection to the server
pub struct ConnectionManager {
    config: ClientConfig,
    resolver: Arc<dyn AddressResolver>,
    policy: FixedDelay,
    rx: mpsc::UnboundedReceiver<ManagerEvent>,
    tx: mpsc::UnboundedSender<ManagerEvent>,
    events: mpsc::UnboundedSender<LinkEvent>,
    status: watch::Sender<ConnectionStatus>,

    state: ConnectionState,
    network_available: bool,
    shut_down: bool,
    attempt: u64,
    reconnect_generation: u64,

    link: Option<Link>,
    connect_task: Option<JoinHandle<()>>,
    gateway_poll: Option<TimerHandle>,
    reconnect: Option<TimerHandle>,
}

impl ConnectionManager {
    /// Start a manager task. The network is assumed unavailable until
    /// `network_available` is called.
    pub fn spawn(
        config: ClientConfig,
        resolver: Arc<dyn AddressResolver>,
    ) -> (ConnectionHandle, mpsc::UnboundedReceiver<LinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();
        let (status, status_rx) = watch::channel(ConnectionStatus::default());

        let manager = Self {
            policy: FixedDelay::new(config.reconnect_delay),
            config,
            resolver,
            rx,
            tx: tx.clone(),
            events,
            status,
            state: ConnectionState::Disconnected,
            network_available: false,
            shut_down: false,
            attempt: 0,
            reconnect_generation: 0,
            link: None,
            connect_task: None,
            gateway_poll: None,
            reconnect: None,
        };
        tokio::spawn(manager.run());

        let handle = ConnectionHandle {
            tx,
            status: status_rx,
        };
        (handle, events_rx)
    }

    async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            match event {
                ManagerEvent::Shutdown { done } => {
                    self.shutdown().await;
                    let _ = done.send(());
                    break;
                }
                event => self.handle(event).await,
            }
        }

        // Acknowledge shutdowns that raced the first one
        self.rx.close();
        while let Some(event) = self.rx.recv().await {
            if let ManagerEvent::Shutdown { done } = event {
                let _ = done.send(());
            }
        }
        tracing::debug!("Connection manager stopped");
    }

    async fn handle(&mut self, event: ManagerEvent) {
        match event {
            ManagerEvent::Connect => self.start_connect(),

            ManagerEvent::Disconnect { reason } => {
                tracing::info!("Disconnect requested: {}", reason);
                self.teardown(reason).await;
                self.schedule_reconnect();
            }

            ManagerEvent::NetworkAvailable => {
                tracing::info!("Network available");
                self.network_available = true;
                if self.state == ConnectionState::Disconnected {
                    self.start_connect();
                }
            }

            ManagerEvent::NetworkLost => {
                tracing::info!("Network lost");
                self.network_available = false;
                cancel_slot(&mut self.reconnect);
                if self.state != ConnectionState::Disconnected {
                    self.teardown("Network lost".to_string()).await;
                }
            }

            ManagerEvent::Resolved { attempt, host } => {
                if attempt != self.attempt || self.state != ConnectionState::Connecting {
                    return;
                }
                cancel_slot(&mut self.gateway_poll);
                self.begin_tcp_connect(host);
            }

            ManagerEvent::ResolveFailed { attempt } => {
                if attempt != self.attempt || self.state != ConnectionState::Connecting {
                    return;
                }
                self.connect_failed(ConnectionError::AddressUnresolved, None);
            }

            ManagerEvent::ConnectResult {
                attempt,
                host,
                result,
            } => {
                if attempt != self.attempt || self.state != ConnectionState::Connecting {
                    tracing::debug!("Discarding result of superseded attempt {}", attempt);
                    return;
                }
                self.connect_task = None;
                match result {
                    Ok(stream) => self.on_connected(stream, host),
                    Err(e) => self.connect_failed(e, Some(host)),
                }
            }

            ManagerEvent::ConnectionLost { attempt, error } => {
                if attempt != self.attempt || self.link.is_none() {
                    return;
                }
                if error.is_liveness() {
                    tracing::warn!("Connection lost (liveness): {}", error);
                } else {
                    tracing::info!("Connection lost: {}", error);
                }
                self.teardown(error.to_string()).await;
                self.schedule_reconnect();
            }

            ManagerEvent::ReconnectDue { generation } => {
                if generation != self.reconnect_generation || self.reconnect.is_none() {
                    return;
                }
                self.reconnect = None;
                if self.network_available && self.state == ConnectionState::Disconnected {
                    tracing::debug!("Reconnecting");
                    self.start_connect();
                }
            }

            ManagerEvent::Shutdown { done } => {
                let _ = done.send(());
            }
        }
    }

    /// Disconnected → Connecting: resolve the server address
    fn start_connect(&mut self) {
        if self.shut_down || self.state != ConnectionState::Disconnected {
            return;
        }

        cancel_slot(&mut self.reconnect);
        self.attempt += 1;
        let attempt = self.attempt;
        self.set_state(ConnectionState::Connecting, "Resolving server address", None);

        let resolver = Arc::clone(&self.resolver);
        let tx = self.tx.clone();

        if resolver.is_dynamic() {
            // Poll until an address shows up or the attempt is abandoned
            self.gateway_poll = Some(TimerHandle::repeating(
                "gateway-poll",
                self.config.gateway_poll_interval,
                move || {
                    let resolver = Arc::clone(&resolver);
                    let tx = tx.clone();
                    async move {
                        match resolver.resolve().await {
                            Some(host) => {
                                let _ = tx.send(ManagerEvent::Resolved { attempt, host });
                                false
                            }
                            None => {
                                tracing::debug!("Server address not known yet");
                                true
                            }
                        }
                    }
                },
            ));
        } else {
            self.connect_task = Some(tokio::spawn(async move {
                let event = match resolver.resolve().await {
                    Some(host) => ManagerEvent::Resolved { attempt, host },
                    None => ManagerEvent::ResolveFailed { attempt },
                };
                let _ = tx.send(event);
            }));
        }
    }

    /// Connect to the resolved host with a bounded timeout
    fn begin_tcp_connect(&mut self, host: String) {
        let attempt = self.attempt;
        let address = self.config.socket_address(&host);
        let timeout = self.config.connect_timeout;
        let tx = self.tx.clone();

        self.set_state(
            ConnectionState::Connecting,
            &format!("Connecting to {}", address),
            Some(host.clone()),
        );

        if let Some(task) = self.connect_task.take() {
            task.abort();
        }
        self.connect_task = Some(tokio::spawn(async move {
            let result = connect_with_timeout(&address, timeout).await;
            let _ = tx.send(ManagerEvent::ConnectResult {
                attempt,
                host,
                result,
            });
        }));
    }

    /// Connecting → Connected
    fn on_connected(&mut self, stream: TcpStream, host: String) {
        let link = match Link::establish(
            stream,
            host.clone(),
            self.attempt,
            &self.config,
            self.events.clone(),
            self.tx.clone(),
        ) {
            Ok(link) => link,
            Err(e) => {
                self.connect_failed(e, Some(host));
                return;
            }
        };

        tracing::info!("Connected to {} ({})", link.address(), link.peer());
        self.set_state(ConnectionState::Connected, "Connected", Some(host.clone()));
        self.emit(LinkEvent::Connected { address: host });
        self.link = Some(link);
    }

    /// Connecting → Disconnected
    fn connect_failed(&mut self, error: ConnectionError, host: Option<String>) {
        tracing::info!("Connection attempt failed: {}", error);
        cancel_slot(&mut self.gateway_poll);
        if let Some(task) = self.connect_task.take() {
            task.abort();
        }
        self.set_state(ConnectionState::Disconnected, &error.to_string(), host);
        self.schedule_reconnect();
    }

    /// Any state → Disconnected, closing the link if there is one
    async fn teardown(&mut self, reason: String) {
        // Invalidate reports from tasks of the current attempt
        self.attempt += 1;

        cancel_slot(&mut self.gateway_poll);
        cancel_slot(&mut self.reconnect);
        if let Some(task) = self.connect_task.take() {
            task.abort();
        }

        if let Some(link) = self.link.take() {
            tracing::debug!("Closing connection to {}", link.peer());
            link.close().await;
            self.emit(LinkEvent::Disconnected);
        }

        self.set_state(ConnectionState::Disconnected, &reason, None);
    }

    /// Arm the reconnect timer if policy allows
    fn schedule_reconnect(&mut self) {
        if self.shut_down {
            return;
        }

        let Some(delay) = self.policy.next_delay(self.network_available) else {
            tracing::debug!("Network unavailable, waiting before reconnecting");
            return;
        };

        cancel_slot(&mut self.reconnect);
        self.reconnect_generation += 1;
        let generation = self.reconnect_generation;
        let tx = self.tx.clone();

        tracing::debug!("Reconnecting in {:?}", delay);
        self.reconnect = Some(TimerHandle::once("reconnect", delay, move || async move {
            let _ = tx.send(ManagerEvent::ReconnectDue { generation });
        }));
    }

    async fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        tracing::info!("Connection manager shutting down");
        self.shut_down = true;
        self.teardown("Shut down".to_string()).await;
    }

    /// Record a transition; report it only if the state or address changed
    fn set_state(&mut self, state: ConnectionState, message: &str, address: Option<String>) {
        self.state = state;

        let changed = self.status.borrow().differs(state, address.as_deref());
        if !changed {
            return;
        }

        tracing::debug!("State: {} ({})", state, message);
        let status = ConnectionStatus {
            state,
            message: message.to_string(),
            address,
        };
        self.emit(LinkEvent::StateChanged {
            state,
            message: status.message.clone(),
            address: status.address.clone(),
        });
        self.status.send_replace(status);
    }

    fn emit(&self, event: LinkEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("Link event dropped, no consumer");
        }
    }
}

async fn connect_with_timeout(
    address: &str,
    timeout: Duration,
) -> Result<TcpStream, ConnectionError> {
    match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(ConnectionError::ConnectFailed {
            address: address.to_string(),
            source,
        }),
        Err(_) => Err(ConnectionError::ConnectTimeout {
            address: address.to_string(),
            timeout,
        }),
    }
}
