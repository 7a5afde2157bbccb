//! Server address resolution

use async_trait::async_trait;

/// Determines which host a client should connect to.
///
/// Resolution may legitimately fail for a while (for example while the
/// Wi-Fi link is still negotiating DHCP); callers poll until it succeeds.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Resolve the server host, or `None` if it is not known yet
    async fn resolve(&self) -> Option<String>;

    /// Whether results can change between calls and should be re-polled
    fn is_dynamic(&self) -> bool {
        true
    }
}

/// Resolver returning a fixed, configured address
#[derive(Debug, Clone)]
pub struct StaticResolver {
    address: String,
}

impl StaticResolver {
    /// Create a resolver for the given host
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

#[async_trait]
impl AddressResolver for StaticResolver {
    async fn resolve(&self) -> Option<String> {
        if self.address.is_empty() {
            None
        } else {
            Some(self.address.clone())
        }
    }

    fn is_dynamic(&self) -> bool {
        false
    }
}
