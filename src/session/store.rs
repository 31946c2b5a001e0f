use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::model::Session;

/// In-memory session store, one slot per chat id.
///
/// Each slot carries its own lock: a caller holds it for the whole turn, so
/// messages from the same user are processed one at a time while different
/// users proceed concurrently. Mutating the session under the slot lock is
/// the atomic replace of the store contract.
pub struct SessionStore {
    sessions: Mutex<HashMap<i64, Arc<Mutex<Session>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Hands back the session slot for a chat, creating a fresh Idle session
    /// if none exists yet. The map lock is only held for the lookup.
    pub async fn checkout(&self, chat_id: i64) -> Arc<Mutex<Session>> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(chat_id)
            .or_insert_with(|| {
                debug!("Creating new session for chat {}", chat_id);
                Arc::new(Mutex::new(Session::new(chat_id)))
            })
            .clone()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
