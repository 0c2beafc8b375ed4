//! Session registry.
//!
//! Maps session tokens to live sessions. Entries are inserted when a
//! terminal is started and removed exactly once when it ends.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::state::{Session, SessionError, SessionId};

/// Thread-safe session registry backed by a `DashMap`.
///
/// Cloning is cheap; all clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<SessionId, Arc<Session>>>,
    /// Held while a capped insert counts and inserts.
    admission: Arc<Mutex<()>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a session, returning the one it replaced.
    pub fn set(&self, session: Arc<Session>) -> Option<Arc<Session>> {
        self.sessions.insert(session.id().clone(), session)
    }

    /// Inserts a session only if its token is unused and fewer than `limit`
    /// sessions are registered.
    ///
    /// The count and the insert happen under one lock, so concurrent callers
    /// can never take the registry past `limit`.
    pub fn insert_new(&self, session: Arc<Session>, limit: usize) -> Result<(), SessionError> {
        let _admission = self.admission.lock();
        if self.sessions.len() >= limit {
            return Err(SessionError::CapacityExceeded(limit));
        }

        match self.sessions.entry(session.id().clone()) {
            Entry::Occupied(entry) => Err(SessionError::AlreadyBound(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(session);
                Ok(())
            }
        }
    }

    /// Looks up a session that has not been closed.
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .filter(|session| !session.is_closed())
    }

    /// Removes a session and marks it closed.
    ///
    /// Returns false when the session was not registered.
    pub fn close(&self, id: &str) -> bool {
        match self.sessions.remove(id) {
            Some((_, session)) => {
                session.mark_closed();
                tracing::debug!(session_id = %id, "Session removed from registry");
                true
            }
            None => false,
        }
    }

    /// Returns the number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Returns the registered session tokens.
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ExecTarget;
    use crate::session::state::SessionState;
    use tokio::sync::{mpsc, oneshot};

    fn make_session(id: &str) -> Arc<Session> {
        let (bind_tx, _bind_rx) = oneshot::channel();
        let (resize_tx, _resize_rx) = mpsc::channel(1);
        let target = ExecTarget::new(None, "team-a", "web-0", "app").unwrap();
        Arc::new(Session::new(id.to_string(), target, None, bind_tx, resize_tx))
    }

    #[test]
    fn test_insert_and_get() {
        let registry = SessionRegistry::new();
        assert!(registry.is_empty());

        registry.set(make_session("one"));
        assert_eq!(registry.len(), 1);

        let session = registry.get("one").unwrap();
        assert_eq!(session.id(), "one");
        assert!(registry.get("two").is_none());
    }

    #[test]
    fn test_set_replaces() {
        let registry = SessionRegistry::new();
        let first = make_session("one");
        assert!(registry.set(Arc::clone(&first)).is_none());

        let replaced = registry.set(make_session("one")).unwrap();
        assert!(Arc::ptr_eq(&replaced, &first));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_insert_new_rejects_duplicate() {
        let registry = SessionRegistry::new();
        registry.insert_new(make_session("one"), 8).unwrap();

        let result = registry.insert_new(make_session("one"), 8);
        assert!(matches!(result, Err(SessionError::AlreadyBound(id)) if id == "one"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_insert_new_respects_limit() {
        let registry = SessionRegistry::new();
        registry.insert_new(make_session("one"), 1).unwrap();

        let result = registry.insert_new(make_session("two"), 1);
        assert_eq!(result, Err(SessionError::CapacityExceeded(1)));

        // Closing frees the slot.
        registry.close("one");
        registry.insert_new(make_session("two"), 1).unwrap();
    }

    #[test]
    fn test_concurrent_inserts_stay_within_limit() {
        let registry = SessionRegistry::new();

        let admitted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..32)
                .map(|i| {
                    let registry = registry.clone();
                    scope.spawn(move || {
                        registry
                            .insert_new(make_session(&format!("s{i}")), 4)
                            .is_ok()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| usize::from(handle.join().unwrap()))
                .sum()
        });

        assert_eq!(admitted, 4);
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_close_removes_and_marks_closed() {
        let registry = SessionRegistry::new();
        let session = make_session("one");
        registry.set(Arc::clone(&session));

        assert!(registry.close("one"));
        assert!(registry.get("one").is_none());
        assert_eq!(session.state(), SessionState::Closed);

        assert!(!registry.close("one"));
    }

    #[test]
    fn test_get_skips_closed_sessions() {
        let registry = SessionRegistry::new();
        let session = make_session("one");
        registry.set(Arc::clone(&session));

        session.mark_closed();
        assert!(registry.get("one").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_ids() {
        let registry = SessionRegistry::new();
        registry.set(make_session("a"));
        registry.set(make_session("b"));

        let mut ids = registry.ids();
        ids.sort();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_clones_share_state() {
        let registry = SessionRegistry::new();
        let clone = registry.clone();

        registry.set(make_session("one"));
        assert!(clone.get("one").is_some());
        assert!(clone.close("one"));
        assert!(registry.is_empty());
    }
}
