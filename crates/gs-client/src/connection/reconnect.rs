//! Reconnect policy

use std::time::Duration;

/// Fixed-delay retry gated on network availability.
///
/// There is no backoff: the link is local, so a short constant delay
/// recovers quickly, and while the network is down nothing is retried.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    /// Create a policy retrying after `delay`
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Delay before the next attempt, or `None` if no attempt should be made
    pub fn next_delay(&self, network_available: bool) -> Option<Duration> {
        network_available.then_some(self.delay)
    }
}
