//! Live session bookkeeping
//!
//! Tracks accepted connections for the STATUS client count and shutdown
//! logging. Holds no bucket state; bucket lifetimes are entirely the
//! registry's concern.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Registry of live client sessions.
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    sessions: Mutex<HashMap<u64, SocketAddr>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        ConnectionRegistry {
            next_id: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Record a newly accepted session; returns its id for unregistration.
    pub fn register(&self, addr: SocketAddr) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock_sessions().insert(id, addr);
        id
    }

    /// Drop a session from the registry, returning its peer address.
    pub fn unregister(&self, id: u64) -> Option<SocketAddr> {
        self.lock_sessions().remove(&id)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.lock_sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Peer addresses of all live sessions.
    pub fn peers(&self) -> Vec<SocketAddr> {
        self.lock_sessions().values().copied().collect()
    }

    fn lock_sessions(&self) -> MutexGuard<'_, HashMap<u64, SocketAddr>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn test_register_unregister() {
        let registry = ConnectionRegistry::new();
        assert!(registry.is_empty());

        let a = registry.register(addr(1000));
        let b = registry.register(addr(1001));
        assert_eq!(registry.len(), 2);
        assert_ne!(a, b);

        assert_eq!(registry.unregister(a), Some(addr(1000)));
        assert_eq!(registry.len(), 1);

        // Double unregister is a no-op
        assert_eq!(registry.unregister(a), None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_peers_snapshot() {
        let registry = ConnectionRegistry::new();
        registry.register(addr(2000));
        registry.register(addr(2001));

        let mut peers = registry.peers();
        peers.sort();
        assert_eq!(peers, vec![addr(2000), addr(2001)]);
    }
}
