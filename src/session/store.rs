//! In-memory session registry. Sessions are not persisted.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::SessionError;
use crate::session::model::Session;

/// Each session sits behind its own mutex, so two decisions on one session
/// are serialized while different sessions proceed independently.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<Session>>>>,
}

impl SessionStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a fresh session.
    pub async fn create(&self) -> (Uuid, Arc<Mutex<Session>>) {
        let session = Session::new();
        let id = session.id;
        let handle = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(id, handle.clone());
        info!(session = %id, "Session created");
        (id, handle)
    }

    pub async fn get(&self, id: Uuid) -> Result<Arc<Mutex<Session>>, SessionError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(SessionError::NotFound(id))
    }

    pub async fn remove(&self, id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&id).is_some();
        if removed {
            debug!(session = %id, "Session removed");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::model::SessionState;

    #[tokio::test]
    async fn create_get_remove() {
        let store = SessionStore::new();
        let (id, handle) = store.create().await;
        assert_eq!(store.len().await, 1);

        handle.lock().await.state = SessionState::Failed;
        let again = store.get(id).await.unwrap();
        assert_eq!(again.lock().await.state, SessionState::Failed);

        assert!(store.remove(id).await);
        assert!(!store.remove(id).await);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let store = SessionStore::new();
        let id = Uuid::new_v4();
        assert!(matches!(store.get(id).await, Err(SessionError::NotFound(x)) if x == id));
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let store = SessionStore::new();
        let (a, _) = store.create().await;
        let (b, _) = store.create().await;
        assert_ne!(a, b);

        let held = store.get(a).await.unwrap();
        let _guard = held.lock().await;
        // b is not blocked by a's lock.
        let other = store.get(b).await.unwrap();
        assert!(other.try_lock().is_ok());
    }
}
