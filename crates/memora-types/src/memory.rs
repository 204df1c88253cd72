//! Memory record types for Memora.
//!
//! The external memory store returns loosely-shaped records: the memory
//! text may live under a `memory`, `text`, or `content` key depending on
//! the engine and the call path. [`MemoryRecord`] models every variant
//! with explicit optional fields and resolves the precedence exactly once
//! at the store-adapter boundary, so downstream code never re-inspects
//! the shape.

use serde::{Deserialize, Serialize};

/// A memory record as returned by the external store.
///
/// All text-carrying fields are optional; [`MemoryRecord::text`] applies
/// the `memory` -> `text` -> `content` precedence. `metadata` is free-form
/// JSON owned by the store; records written by this agent always carry at
/// least `session_id` and an RFC 3339 `timestamp` inside it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Search relevance score, present on search results only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl MemoryRecord {
    /// The record's memory text, resolved with `memory` -> `text` ->
    /// `content` precedence. `None` when no variant is present.
    pub fn text(&self) -> Option<&str> {
        self.memory
            .as_deref()
            .or(self.text.as_deref())
            .or(self.content.as_deref())
    }
}
