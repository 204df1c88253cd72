//! Shared domain types for Memora.
//!
//! This crate contains the types that flow across crate boundaries:
//! chat messages, model requests, memory records, turn results, and the
//! error taxonomy. Zero infrastructure dependencies -- only serde,
//! serde_json, chrono, thiserror.

pub mod error;
pub mod llm;
pub mod memory;
pub mod turn;
