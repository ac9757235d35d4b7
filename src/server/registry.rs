//! Registry of live sessions.
//!
//! Each session gets a slab slot for its lifetime; the slot index doubles as
//! the session id used in logs and thread names.

use chrono::{DateTime, Utc};
use slab::Slab;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// What the server knows about one connected peer.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub peer: String,
    pub connected_at: DateTime<Utc>,
}

/// Registry of sessions using slab allocation.
///
/// Provides O(1) insert, lookup, and remove operations.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: Slab<SessionInfo>,
    max_sessions: usize,
}

impl SessionRegistry {
    /// Create a new registry with specified maximum capacity.
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: Slab::with_capacity(max_sessions),
            max_sessions,
        }
    }

    /// Register a session.
    ///
    /// Returns `None` if the registry is at capacity.
    pub fn insert(&mut self, info: SessionInfo) -> Option<usize> {
        if self.sessions.len() >= self.max_sessions {
            return None;
        }
        Some(self.sessions.insert(info))
    }

    pub fn get(&self, id: usize) -> Option<&SessionInfo> {
        self.sessions.get(id)
    }

    /// Remove a session from the registry.
    pub fn remove(&mut self, id: usize) -> Option<SessionInfo> {
        self.sessions.try_remove(id)
    }

    /// Number of active sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Maximum number of sessions allowed.
    pub fn capacity(&self) -> usize {
        self.max_sessions
    }

    /// Iterate over all sessions.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &SessionInfo)> {
        self.sessions.iter()
    }
}

/// Registry shared between the accept loop and session threads.
pub type SharedRegistry = Arc<Mutex<SessionRegistry>>;

pub fn lock(registry: &SharedRegistry) -> MutexGuard<'_, SessionRegistry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(peer: &str) -> SessionInfo {
        SessionInfo {
            peer: peer.to_string(),
            connected_at: Utc::now(),
        }
    }

    #[test]
    fn test_session_registry() {
        let mut registry = SessionRegistry::new(2);
        assert!(registry.is_empty());

        let id1 = registry.insert(info("10.0.0.1")).unwrap();
        let id2 = registry.insert(info("10.0.0.2")).unwrap();

        // At capacity
        assert!(registry.insert(info("10.0.0.3")).is_none());

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.capacity(), 2);
        assert_eq!(registry.get(id1).unwrap().peer, "10.0.0.1");
        assert_eq!(registry.get(id2).unwrap().peer, "10.0.0.2");

        registry.remove(id1);
        assert!(registry.get(id1).is_none());
        assert!(registry.remove(id1).is_none());
        assert_eq!(registry.len(), 1);

        let peers: Vec<_> = registry.iter().map(|(_, s)| s.peer.as_str()).collect();
        assert_eq!(peers, vec!["10.0.0.2"]);
    }
}
