//! Process-local session history.
//!
//! A session is identified by `(owner_id, session_id)` and owns a bounded
//! window of recent turns. History is a fast local cache of recent
//! dialogue only -- it never outlives the process; durable memory lives
//! in the external store.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use memora_types::llm::ChatMessage;
use uuid::Uuid;

/// Maximum role-tagged messages retained per session. Older messages are
/// dropped in FIFO order but remain recoverable through memory search.
pub const MAX_HISTORY_MESSAGES: usize = 10;

/// Key scoping session state to one owner/session pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub owner_id: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(owner_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            session_id: session_id.into(),
        }
    }
}

/// Bounded-recency message window for one session.
#[derive(Debug, Default)]
pub struct SessionHistory {
    messages: VecDeque<ChatMessage>,
}

impl SessionHistory {
    /// Append a message, evicting the oldest when over the window limit.
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push_back(message);
        while self.messages.len() > MAX_HISTORY_MESSAGES {
            self.messages.pop_front();
        }
    }

    /// Snapshot of the retained messages, oldest first.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Concurrent map of all live sessions.
///
/// Concurrent chats on the *same* session key may interleave their
/// appends; per-session turn ordering is intentionally not serialized
/// (see DESIGN.md). Chats on different sessions are fully independent.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<DashMap<SessionKey, SessionHistory>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate an opaque session token (UUID v7, time-sortable).
    pub fn generate_session_id() -> String {
        Uuid::now_v7().to_string()
    }

    /// Create the history entry for a key if it does not exist yet.
    pub fn ensure(&self, key: &SessionKey) {
        self.sessions.entry(key.clone()).or_default();
    }

    /// The bounded recent history for a session (empty if unknown).
    pub fn recent(&self, key: &SessionKey) -> Vec<ChatMessage> {
        self.sessions
            .get(key)
            .map(|history| history.messages())
            .unwrap_or_default()
    }

    /// Append a completed user/assistant exchange to a session.
    pub fn append_exchange(&self, key: &SessionKey, user: ChatMessage, assistant: ChatMessage) {
        let mut entry = self.sessions.entry(key.clone()).or_default();
        entry.push(user);
        entry.push(assistant);
    }

    /// Drop all session state for an owner. Returns the number of
    /// sessions removed.
    pub fn clear_owner(&self, owner_id: &str) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|key, _| key.owner_id != owner_id);
        before - self.sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
