//! Events delivered to the consumer

use gs_protocol::LocationUpdate;
use serde::Serialize;

use crate::connection::ConnectionState;

/// Notification from the link to its consumer, delivered in order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LinkEvent {
    /// Connection state or server address changed
    StateChanged {
        state: ConnectionState,
        message: String,
        address: Option<String>,
    },

    /// A connection to the server is up; inbound data may be acted on
    Connected { address: String },

    /// The connection is gone; stop acting on inbound data
    Disconnected,

    /// Server reported its status instead of a fix
    Status { text: String },

    /// A position fix arrived
    LocationReceived { location: LocationUpdate },
}

impl LinkEvent {
    /// Whether this event carries a position
    pub fn is_location(&self) -> bool {
        matches!(self, LinkEvent::LocationReceived { .. })
    }
}
