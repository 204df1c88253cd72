//! Memory store adapters.
//!
//! - `rest`: client for a remote memory service over HTTP
//! - `blocking`: offload wrapper for synchronous in-process engines

pub mod blocking;
pub mod rest;

pub use blocking::{BlockingMemoryStore, BlockingStoreAdapter};
pub use rest::RestMemoryStore;
