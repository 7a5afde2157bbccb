//! Client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_millis;

/// Configuration for a receiving client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Derive the server address from the network's default gateway
    /// instead of using `server_address`. Suits the common setup where
    /// the server device also provides the Wi-Fi hotspot.
    pub use_gateway: bool,

    /// Static server address, used when `use_gateway` is false
    pub server_address: String,

    /// Server TCP port
    pub port: u16,

    /// Bound on a single TCP connect attempt
    #[serde(with = "duration_millis")]
    pub connect_timeout: Duration,

    /// Longest silence tolerated from the server once connected
    #[serde(with = "duration_millis")]
    pub read_timeout: Duration,

    /// Interval between heartbeat bytes
    #[serde(with = "duration_millis")]
    pub heartbeat_interval: Duration,

    /// Interval between socket health checks
    #[serde(with = "duration_millis")]
    pub health_check_interval: Duration,

    /// Interval between gateway resolution attempts
    #[serde(with = "duration_millis")]
    pub gateway_poll_interval: Duration,

    /// Fixed delay before a reconnect attempt
    #[serde(with = "duration_millis")]
    pub reconnect_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            use_gateway: true,
            server_address: "192.168.43.1".to_string(),
            port: gs_protocol::DEFAULT_PORT,
            connect_timeout: Duration::from_millis(500),
            read_timeout: Duration::from_millis(2000),
            heartbeat_interval: Duration::from_millis(1000),
            health_check_interval: Duration::from_millis(1000),
            gateway_poll_interval: Duration::from_millis(1000),
            reconnect_delay: Duration::from_millis(500),
        }
    }
}

impl ClientConfig {
    /// Socket address string for a resolved host
    pub fn socket_address(&self, host: &str) -> String {
        if host.parse::<std::net::Ipv6Addr>().is_ok() {
            format!("[{}]:{}", host, self.port)
        } else {
            format!("{}:{}", host, self.port)
        }
    }
}
