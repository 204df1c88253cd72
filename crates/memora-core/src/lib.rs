//! Conversation orchestration logic for Memora.
//!
//! This crate defines the "ports" (the [`store::MemoryStore`] and
//! [`llm::provider::ChatModel`] traits) that the infrastructure layer
//! implements, plus everything between a user message and its reply:
//! retrieval caching and coalescing, the circuit-broken model gateway,
//! session history, context assembly, the orchestrator itself, and the
//! background persistence queue. It depends only on `memora-types` --
//! never on `memora-infra` or any HTTP/IO crate.

pub mod agent;
pub mod context;
pub mod llm;
pub mod persist;
pub mod retrieval;
pub mod session;
pub mod store;
