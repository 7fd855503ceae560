//! In-memory session store with one entry per live connection.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::session::{Session, SessionId};

pub type SharedSession = Arc<Mutex<Session>>;

/// Maps a session id to its mutable conversation state.
///
/// Entries live exactly as long as their connection: `get_or_create` on
/// accept, `remove` on disconnect.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, SharedSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_create(&self, id: SessionId) -> SharedSession {
        if let Some(existing) = self.sessions.read().await.get(&id) {
            return existing.clone();
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(id)
            .or_insert_with(|| {
                debug!(session_id = %id, "Created session");
                Arc::new(Mutex::new(Session::new(id)))
            })
            .clone()
    }

    pub async fn get(&self, id: SessionId) -> Option<SharedSession> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn remove(&self, id: SessionId) -> Option<SharedSession> {
        let removed = self.sessions.write().await.remove(&id);
        if removed.is_some() {
            debug!(session_id = %id, "Removed session");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
