//! MemoryStore trait definition.
//!
//! The external memory store (vector search + persistence engine) is an
//! opaque capability to this crate. Implementations live in memora-infra
//! (e.g., `RestMemoryStore`, `BlockingStoreAdapter`). Uses native async
//! fn in traits (RPITIT, Rust 2024 edition).

use memora_types::error::StoreError;
use memora_types::llm::ChatMessage;
use memora_types::memory::MemoryRecord;

/// Capability trait for the external memory store.
///
/// The agent assumes nothing about indexing, embedding, or ranking --
/// only that `search` returns an ordered sequence of records relevant
/// to the query.
pub trait MemoryStore: Send + Sync {
    /// Semantic search over an owner's memories.
    fn search(
        &self,
        owner_id: &str,
        query: &str,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<MemoryRecord>, StoreError>> + Send;

    /// Persist a set of conversation turns for an owner.
    ///
    /// `metadata` is stored alongside the derived records.
    fn add(
        &self,
        turns: &[ChatMessage],
        owner_id: &str,
        metadata: serde_json::Value,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Fetch every memory record for an owner.
    fn get_all(
        &self,
        owner_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<MemoryRecord>, StoreError>> + Send;

    /// Delete a single record by ID.
    fn delete(
        &self,
        memory_id: &str,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Delete all records for an owner. Returns the count of deleted entries.
    fn delete_all(
        &self,
        owner_id: &str,
    ) -> impl std::future::Future<Output = Result<u64, StoreError>> + Send;
}
