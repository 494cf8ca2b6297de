//! Shared session registry.

use dashmap::DashMap;
use std::sync::Arc;

use crate::observability::metrics;
use crate::session::Session;

/// UID → session map shared by both listeners.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<DashMap<String, Arc<dyn Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session, replacing any session with the same id.
    pub fn insert(&self, session: Arc<dyn Session>) {
        let id = session.id().to_string();
        self.inner.insert(id.clone(), session);
        metrics::record_open_sessions(self.inner.len());
        tracing::info!(session_id = %id, "Session opened");
    }

    pub fn remove(&self, id: &str) -> Option<Arc<dyn Session>> {
        let removed = self.inner.remove(id).map(|(_, session)| session);
        if removed.is_some() {
            metrics::record_open_sessions(self.inner.len());
            tracing::info!(session_id = %id, "Session closed");
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Session>> {
        self.inner.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("open_sessions", &self.inner.len())
            .finish()
    }
}
