//! Default gateway discovery
//!
//! When the server device also runs the Wi-Fi hotspot, the client's
//! default gateway *is* the server. On Linux the routing table is exposed
//! in `/proc/net/route`, with addresses printed as native-endian hex.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::traits::AddressResolver;

/// Kernel routing table location
pub const PROC_NET_ROUTE: &str = "/proc/net/route";

/// Route flag marking an entry that goes through a gateway
const RTF_GATEWAY: u32 = 0x0002;

/// Resolver returning the default gateway of the host
#[derive(Debug, Clone)]
pub struct GatewayResolver {
    route_table: PathBuf,
}

impl GatewayResolver {
    /// Resolver reading the system routing table
    pub fn new() -> Self {
        Self::with_route_table(PROC_NET_ROUTE)
    }

    /// Resolver reading a routing table from a custom path
    pub fn with_route_table(path: impl Into<PathBuf>) -> Self {
        Self {
            route_table: path.into(),
        }
    }
}

impl Default for GatewayResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AddressResolver for GatewayResolver {
    async fn resolve(&self) -> Option<String> {
        let table = match tokio::fs::read_to_string(&self.route_table).await {
            Ok(table) => table,
            Err(e) => {
                tracing::warn!("Can't read routing table {:?}: {}", self.route_table, e);
                return None;
            }
        };

        match parse_default_gateway(&table) {
            Some(ip) => {
                tracing::debug!("Gateway IP: {}", ip);
                Some(ip.to_string())
            }
            None => {
                tracing::warn!("Can't get gateway IP address");
                None
            }
        }
    }
}

/// Find the default route's gateway in `/proc/net/route` content
pub fn parse_default_gateway(table: &str) -> Option<Ipv4Addr> {
    table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            return None;
        }

        let destination = u32::from_str_radix(fields[1], 16).ok()?;
        let gateway = u32::from_str_radix(fields[2], 16).ok()?;
        let flags = u32::from_str_radix(fields[3], 16).ok()?;

        if destination != 0 || flags & RTF_GATEWAY == 0 || gateway == 0 {
            return None;
        }

        Some(hex_to_ipv4(gateway))
    })
}

/// Convert a kernel-printed address (lowest octet first) to an address
fn hex_to_ipv4(raw: u32) -> Ipv4Addr {
    Ipv4Addr::from(raw.to_le_bytes())
}
