//! Turn result types for the conversational surface.
//!
//! A `chat` call always yields a well-formed [`TurnReply`]; degraded
//! conditions are signaled via the reply content and the optional
//! `error` field, never via a hard failure of the chat contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of one completed (or degraded) conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnReply {
    /// Assistant reply text. On degraded turns this is an apologetic
    /// fallback message rather than model output.
    pub reply: String,
    pub owner_id: String,
    pub session_id: String,
    /// Memory texts that were injected into the model context.
    pub memories_used: Vec<String>,
    pub timestamp: DateTime<Utc>,
    /// Wall-clock duration of the turn in milliseconds.
    pub elapsed_ms: u64,
    /// Error detail for degraded turns, absent on clean ones.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Items emitted by a streaming turn.
///
/// The sequence shape is fixed: exactly one `Meta` envelope first, zero
/// or more `Delta` fragments, at most one `Error`, and exactly one
/// terminal `Done`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamItem {
    /// Envelope metadata, emitted before any content fragment.
    Meta {
        owner_id: String,
        session_id: String,
        memories_used: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// A fragment of assistant text.
    Delta { text: String },

    /// A mid-stream failure; the stream still terminates with `Done`.
    Error { detail: String },

    /// Terminal sentinel.
    Done,
}
