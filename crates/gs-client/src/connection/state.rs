//! Connection state types

use std::fmt;

use serde::Serialize;

/// Lifecycle state of the client connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(text)
    }
}

/// Last reported state together with the reason and server address
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub message: String,
    pub address: Option<String>,
}

impl ConnectionStatus {
    /// Whether `state` and `address` differ from this status.
    ///
    /// The message alone never makes a change worth reporting.
    pub fn differs(&self, state: ConnectionState, address: Option<&str>) -> bool {
        self.state != state || self.address.as_deref() != address
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            message: String::new(),
            address: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_differs_ignores_message() {
        let status = ConnectionStatus {
            state: ConnectionState::Connecting,
            message: "Resolving".into(),
            address: Some("10.0.0.1".into()),
        };

        assert!(!status.differs(ConnectionState::Connecting, Some("10.0.0.1")));
        assert!(status.differs(ConnectionState::Connecting, None));
        assert!(status.differs(ConnectionState::Connected, Some("10.0.0.1")));
    }
}
