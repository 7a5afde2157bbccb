//! Live-session registry

use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use super::handle::{SessionCloseReason, SessionHandle};

/// Set of live sessions, keyed by remote address.
///
/// Membership changes are made by the coordinator only, so counts reported
/// by `insert`/`remove` reflect a serialized history. Readers iterate over
/// `snapshot()` copies, never the live map.
pub struct SessionRegistry {
    sessions: DashMap<SocketAddr, Arc<SessionHandle>>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Add a session, returning the number of live sessions afterwards
    pub fn insert(&self, session: Arc<SessionHandle>) -> usize {
        if let Some(previous) = self.sessions.insert(session.addr(), session) {
            // Same remote address reused before the old session was reaped
            previous.close(SessionCloseReason::PeerClosed);
        }
        self.sessions.len()
    }

    /// Remove the session at `addr` if it is the given one
    pub fn remove(&self, session: &Arc<SessionHandle>) -> bool {
        self.sessions
            .remove_if(&session.addr(), |_, live| Arc::ptr_eq(live, session))
            .is_some()
    }

    /// Point-in-time copy of the live sessions
    pub fn snapshot(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions.iter().map(|r| Arc::clone(&r)).collect()
    }

    /// Close every live session
    pub fn close_all(&self, reason: SessionCloseReason) {
        for session in self.snapshot() {
            session.close(reason.clone());
        }
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    fn session(port: u16) -> Arc<SessionHandle> {
        let addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
        SessionHandle::new(addr, 4, CancellationToken::new()).0
    }

    #[test]
    fn test_insert_and_remove_counts() {
        let registry = SessionRegistry::new();
        let a = session(1);
        let b = session(2);

        assert_eq!(registry.insert(Arc::clone(&a)), 1);
        assert_eq!(registry.insert(Arc::clone(&b)), 2);
        assert!(registry.remove(&a));
        assert!(!registry.remove(&a));
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&registry.snapshot()[0], &b));
    }

    #[test]
    fn test_stale_remove_keeps_replacement() {
        let registry = SessionRegistry::new();
        let old = session(7);
        let new = session(7);

        registry.insert(Arc::clone(&old));
        registry.insert(Arc::clone(&new));
        assert!(old.is_closed());

        // Teardown of the replaced session must not evict the new one
        assert!(!registry.remove(&old));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let registry = SessionRegistry::new();
        let a = session(1);
        registry.insert(Arc::clone(&a));

        let snapshot = registry.snapshot();
        registry.remove(&a);
        assert_eq!(snapshot.len(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_close_all() {
        let registry = SessionRegistry::new();
        let a = session(1);
        let b = session(2);
        registry.insert(Arc::clone(&a));
        registry.insert(Arc::clone(&b));

        registry.close_all(SessionCloseReason::ServerStopping);
        assert!(a.is_closed() && b.is_closed());
        assert_eq!(a.close_reason(), Some(SessionCloseReason::ServerStopping));
    }
}
