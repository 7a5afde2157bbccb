//! Server configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_millis;

/// Configuration for the location server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the listener to
    pub bind_address: String,

    /// Read timeout on each session socket
    #[serde(with = "duration_millis")]
    pub read_timeout: Duration,

    /// Silence after which a session is considered lost
    #[serde(with = "duration_millis")]
    pub heartbeat_timeout: Duration,

    /// Minimum spacing between resends of the cached response
    #[serde(with = "duration_millis")]
    pub response_interval: Duration,

    /// How long ingestion keeps running after the last session leaves
    #[serde(with = "duration_millis")]
    pub ingestion_grace: Duration,

    /// Frames buffered per session before it is considered stuck
    pub outbound_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: format!("0.0.0.0:{}", gs_protocol::DEFAULT_PORT),
            read_timeout: Duration::from_millis(1000),
            heartbeat_timeout: Duration::from_millis(3000),
            response_interval: Duration::from_millis(1000),
            ingestion_grace: Duration::from_secs(15),
            outbound_queue: 32,
        }
    }
}
