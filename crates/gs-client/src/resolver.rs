//! Resolver selection

use std::sync::Arc;

use gs_core::config::ClientConfig;
use gs_core::gateway::GatewayResolver;
use gs_core::traits::{AddressResolver, StaticResolver};

/// Resolver matching the configured address mode
pub fn from_config(config: &ClientConfig) -> Arc<dyn AddressResolver> {
    if config.use_gateway {
        tracing::debug!("Resolving server address from the default gateway");
        Arc::new(GatewayResolver::new())
    } else {
        tracing::debug!("Using configured server address {}", config.server_address);
        Arc::new(StaticResolver::new(config.server_address.clone()))
    }
}
