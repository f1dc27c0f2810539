//! Conversation thread and session storage.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::chat::Backends;
use crate::credentials::Credentials;
use crate::llm::Message;
use crate::memory::MemoryContext;
use crate::notice::Notice;

/// Default session timeout (30 minutes).
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// One transcript entry; the role is always user or assistant.
pub type ConversationTurn = Message;

/// A single conversation session.
///
/// Cloning is cheap and yields a handle to the same session.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    /// Unique session identifier.
    id: String,
    /// Conversation transcript.
    transcript: RwLock<Vec<ConversationTurn>>,
    /// Last activity time.
    last_activity: RwLock<DateTime<Utc>>,
    credentials: RwLock<Credentials>,
    /// Service handles; present only while the credentials are valid.
    backends: RwLock<Option<Backends>>,
    /// Notices waiting to be shown once.
    pending: RwLock<Vec<Notice>>,
    /// Context assembled for the most recent turn.
    last_context: RwLock<Option<MemoryContext>>,
    /// Held for the duration of a turn.
    turn: Mutex<()>,
}

impl Session {
    /// Create a new session with the given ID.
    fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            inner: Arc::new(SessionInner {
                id,
                transcript: RwLock::new(Vec::new()),
                last_activity: RwLock::new(now),
                credentials: RwLock::new(Credentials::default()),
                backends: RwLock::new(None),
                pending: RwLock::new(Vec::new()),
                last_context: RwLock::new(None),
                turn: Mutex::new(()),
            }),
        }
    }

    /// Get the session ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Add a user message to the transcript.
    pub fn add_user_message(&self, content: impl Into<String>) {
        self.add_turn(Message::user(content));
    }

    /// Add an assistant message to the transcript.
    pub fn add_assistant_message(&self, content: impl Into<String>) {
        self.add_turn(Message::assistant(content));
    }

    fn add_turn(&self, turn: ConversationTurn) {
        let mut guard = self
            .inner
            .transcript
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        guard.push(turn);
        drop(guard);
        self.touch();
    }

    /// Get the whole transcript.
    #[must_use]
    pub fn transcript(&self) -> Vec<ConversationTurn> {
        self.inner
            .transcript
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get the number of messages in the transcript.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.inner
            .transcript
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn credentials(&self) -> Credentials {
        self.inner
            .credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace credentials and service handles together.
    pub fn configure(&self, credentials: Credentials, backends: Option<Backends>) {
        *self
            .inner
            .credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner) = credentials;
        *self
            .inner
            .backends
            .write()
            .unwrap_or_else(PoisonError::into_inner) = backends;
        self.touch();
    }

    /// Service handles, if the session is configured.
    #[must_use]
    pub fn backends(&self) -> Option<Backends> {
        self.inner
            .backends
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Queue notices for the next page render.
    pub fn push_notices(&self, notices: impl IntoIterator<Item = Notice>) {
        self.inner
            .pending
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(notices);
    }

    /// Drain queued notices.
    pub fn take_notices(&self) -> Vec<Notice> {
        std::mem::take(
            &mut *self
                .inner
                .pending
                .write()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    pub fn set_last_context(&self, context: MemoryContext) {
        *self
            .inner
            .last_context
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(context);
    }

    /// Forget the last context, e.g. once the memories behind it are deleted.
    pub fn clear_last_context(&self) {
        self.inner
            .last_context
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    #[must_use]
    pub fn last_context(&self) -> Option<MemoryContext> {
        self.inner
            .last_context
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait until no other turn runs on this session.
    pub async fn lock_turn(&self) -> MutexGuard<'_, ()> {
        self.inner.turn.lock().await
    }

    /// Update the last activity timestamp.
    fn touch(&self) {
        let mut guard = self
            .inner
            .last_activity
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = Utc::now();
    }

    /// Check if the session has expired with a custom timeout.
    #[must_use]
    pub fn is_expired_with_timeout(&self, timeout: Duration) -> bool {
        let last = *self
            .inner
            .last_activity
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        // A negative difference means clock skew; never expire on it.
        (Utc::now() - last)
            .to_std()
            .is_ok_and(|idle| idle > timeout)
    }
}

/// Thread-safe store for sessions.
///
/// Provides methods for creating, retrieving, and cleaning up sessions.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<SessionStoreInner>,
}

#[derive(Debug)]
struct SessionStoreInner {
    sessions: RwLock<HashMap<String, Session>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Create a new session store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SessionStoreInner {
                sessions: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Create a new session and return it.
    #[must_use]
    pub fn create(&self) -> Session {
        let id = Uuid::new_v4().to_string();
        let session = Session::new(id.clone());
        self.inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, session.clone());
        tracing::debug!(session_id = %session.id(), "Created session");
        session
    }

    /// Get a session by ID.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Session> {
        self.inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Remove a session by ID.
    pub fn remove(&self, id: &str) -> Option<Session> {
        self.inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    /// Get the number of active sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if there are no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove sessions that have been inactive longer than the timeout.
    ///
    /// Returns the number of sessions removed.
    pub fn cleanup_expired_with_timeout(&self, timeout: Duration) -> usize {
        let mut guard = self
            .inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = guard.len();
        guard.retain(|_, session| !session.is_expired_with_timeout(timeout));
        before - guard.len()
    }
}
