//! Core error types for GNSS Share

use std::path::PathBuf;
use std::time::Duration;

use gs_protocol::ProtocolError;
use thiserror::Error;

/// Connection-related errors.
///
/// Every variant is recoverable: the affected connection is torn down and,
/// on the client, a reconnect is scheduled.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// No address could be determined for the server
    #[error("Server address unknown")]
    AddressUnresolved,

    /// TCP connect did not complete in time
    #[error("Connection to {address} timed out after {timeout:?}")]
    ConnectTimeout { address: String, timeout: Duration },

    /// TCP connect failed outright
    #[error("Connection to {address} failed: {source}")]
    ConnectFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Peer closed the connection
    #[error("Connection closed by peer")]
    PeerClosed,

    /// Read or write failed
    #[error("Connection lost: {0}")]
    Io(#[from] std::io::Error),

    /// Inbound frame was malformed
    #[error("Protocol violation: {0}")]
    Protocol(ProtocolError),

    /// Heartbeat could not be delivered
    #[error("Heartbeat failed: {0}")]
    HeartbeatFailed(std::io::Error),

    /// Periodic health check found the link dead
    #[error("Health check failed: {0}")]
    HealthCheckFailed(String),

    /// Nothing arrived within the read timeout
    #[error("No data from peer for {0:?}")]
    ReadTimeout(Duration),
}

impl ConnectionError {
    /// Whether this failure was detected by liveness monitoring rather than
    /// an outright I/O error
    pub fn is_liveness(&self) -> bool {
        matches!(
            self,
            ConnectionError::HeartbeatFailed(_)
                | ConnectionError::HealthCheckFailed(_)
                | ConnectionError::ReadTimeout(_)
        )
    }
}

impl From<ProtocolError> for ConnectionError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Io(e) => ConnectionError::Io(e),
            other => ConnectionError::Protocol(other),
        }
    }
}

/// Server-side errors surfaced to the caller
#[derive(Error, Debug)]
pub enum ServerError {
    /// Listening socket could not be bound; not retried
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// The position source refused to start
    #[error("Position source failed to start: {0}")]
    SourceStart(String),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
