//! Chat sessions and the store that owns them.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::transcript::Transcript;

/// State for one browser session.
///
/// The relay is the only writer; holding the surrounding mutex for a whole
/// turn keeps one request in flight per session.
#[derive(Debug)]
pub struct ChatSession {
    id: String,
    assistant_type: String,
    assistant_id: String,
    /// Conversation history shown to the user.
    pub transcript: Transcript,
    /// Server-side thread handle, created on the first turn by backends that use one.
    pub thread_id: Option<String>,
    /// Error from the most recent failed turn, cleared by the next send.
    pub last_error: Option<String>,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

impl ChatSession {
    /// Create an empty session bound to one assistant.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        assistant_type: impl Into<String>,
        assistant_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            assistant_type: assistant_type.into(),
            assistant_id: assistant_id.into(),
            transcript: Transcript::new(),
            thread_id: None,
            last_error: None,
            created_at: now,
            last_activity: now,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Key of the assistant profile this session talks to.
    #[must_use]
    pub fn assistant_type(&self) -> &str {
        &self.assistant_type
    }

    /// Remote assistant id.
    #[must_use]
    pub fn assistant_id(&self) -> &str {
        &self.assistant_id
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Update the last activity timestamp.
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Whether the session has been idle longer than `ttl`.
    #[must_use]
    pub fn is_idle_longer_than(&self, ttl: Duration) -> bool {
        // Negative duration means clock skew; treat as active.
        (Utc::now() - self.last_activity)
            .to_std()
            .is_ok_and(|idle| idle > ttl)
    }
}

/// Session shared between the store and the handler driving a turn.
pub type SharedSession = Arc<Mutex<ChatSession>>;

/// Thread-safe store for sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, SharedSession>>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new session for an assistant and return it.
    pub fn create(&self, assistant_type: &str, assistant_id: &str) -> SharedSession {
        let id = Uuid::new_v4().to_string();
        let session = Arc::new(Mutex::new(ChatSession::new(
            id.clone(),
            assistant_type,
            assistant_id,
        )));
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), Arc::clone(&session));
        tracing::info!(
            name: "session.created",
            session_id = %id,
            assistant_type = %assistant_type,
            "New session created"
        );
        session
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<SharedSession> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn remove(&self, id: &str) -> Option<SharedSession> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn list_ids(&self) -> Vec<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Drop sessions idle for longer than `ttl`.
    ///
    /// Sessions with a turn in progress are locked and therefore kept.
    /// Returns the number of sessions removed.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let before = guard.len();
        guard.retain(|_, session| {
            session
                .try_lock()
                .map_or(true, |s| !s.is_idle_longer_than(ttl))
        });
        before - guard.len()
    }
}
