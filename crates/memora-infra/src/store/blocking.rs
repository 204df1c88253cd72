//! Offload adapter for synchronous memory engines.
//!
//! Some memory engines expose a synchronous API. Calling one directly
//! from the orchestrator would stall the scheduler, so
//! [`BlockingStoreAdapter`] moves every call onto the blocking thread
//! pool via `tokio::task::spawn_blocking`.

use std::sync::Arc;

use memora_core::store::MemoryStore;
use memora_types::error::StoreError;
use memora_types::llm::ChatMessage;
use memora_types::memory::MemoryRecord;

/// Synchronous counterpart of [`MemoryStore`], implemented by
/// in-process engines.
pub trait BlockingMemoryStore: Send + Sync + 'static {
    fn search(
        &self,
        owner_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, StoreError>;

    fn add(
        &self,
        turns: &[ChatMessage],
        owner_id: &str,
        metadata: serde_json::Value,
    ) -> Result<(), StoreError>;

    fn get_all(&self, owner_id: &str) -> Result<Vec<MemoryRecord>, StoreError>;

    fn delete(&self, memory_id: &str) -> Result<(), StoreError>;

    fn delete_all(&self, owner_id: &str) -> Result<u64, StoreError>;
}

/// [`MemoryStore`] adapter running a [`BlockingMemoryStore`] on the
/// blocking thread pool.
pub struct BlockingStoreAdapter<T> {
    inner: Arc<T>,
}

impl<T: BlockingMemoryStore> BlockingStoreAdapter<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }
}

fn join_error(err: tokio::task::JoinError) -> StoreError {
    StoreError::Engine(format!("store worker failed: {err}"))
}

impl<T: BlockingMemoryStore> MemoryStore for BlockingStoreAdapter<T> {
    async fn search(
        &self,
        owner_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        let inner = Arc::clone(&self.inner);
        let owner_id = owner_id.to_string();
        let query = query.to_string();
        tokio::task::spawn_blocking(move || inner.search(&owner_id, &query, limit))
            .await
            .map_err(join_error)?
    }

    async fn add(
        &self,
        turns: &[ChatMessage],
        owner_id: &str,
        metadata: serde_json::Value,
    ) -> Result<(), StoreError> {
        let inner = Arc::clone(&self.inner);
        let turns = turns.to_vec();
        let owner_id = owner_id.to_string();
        tokio::task::spawn_blocking(move || inner.add(&turns, &owner_id, metadata))
            .await
            .map_err(join_error)?
    }

    async fn get_all(&self, owner_id: &str) -> Result<Vec<MemoryRecord>, StoreError> {
        let inner = Arc::clone(&self.inner);
        let owner_id = owner_id.to_string();
        tokio::task::spawn_blocking(move || inner.get_all(&owner_id))
            .await
            .map_err(join_error)?
    }

    async fn delete(&self, memory_id: &str) -> Result<(), StoreError> {
        let inner = Arc::clone(&self.inner);
        let memory_id = memory_id.to_string();
        tokio::task::spawn_blocking(move || inner.delete(&memory_id))
            .await
            .map_err(join_error)?
    }

    async fn delete_all(&self, owner_id: &str) -> Result<u64, StoreError> {
        let inner = Arc::clone(&self.inner);
        let owner_id = owner_id.to_string();
        tokio::task::spawn_blocking(move || inner.delete_all(&owner_id))
            .await
            .map_err(join_error)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Minimal synchronous engine backed by a Vec.
    #[derive(Default)]
    struct VecEngine {
        records: Mutex<Vec<(String, MemoryRecord)>>,
    }

    impl BlockingMemoryStore for VecEngine {
        fn search(
            &self,
            owner_id: &str,
            _query: &str,
            limit: usize,
        ) -> Result<Vec<MemoryRecord>, StoreError> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|(owner, _)| owner == owner_id)
                .map(|(_, record)| record.clone())
                .take(limit)
                .collect())
        }

        fn add(
            &self,
            turns: &[ChatMessage],
            owner_id: &str,
            metadata: serde_json::Value,
        ) -> Result<(), StoreError> {
            let mut records = self.records.lock().unwrap();
            for turn in turns {
                records.push((
                    owner_id.to_string(),
                    MemoryRecord {
                        memory: Some(turn.content.clone()),
                        metadata: metadata.clone(),
                        ..Default::default()
                    },
                ));
            }
            Ok(())
        }

        fn get_all(&self, owner_id: &str) -> Result<Vec<MemoryRecord>, StoreError> {
            self.search(owner_id, "", usize::MAX)
        }

        fn delete(&self, _memory_id: &str) -> Result<(), StoreError> {
            Err(StoreError::Engine("unsupported".to_string()))
        }

        fn delete_all(&self, owner_id: &str) -> Result<u64, StoreError> {
            let mut records = self.records.lock().unwrap();
            let before = records.len();
            records.retain(|(owner, _)| owner != owner_id);
            Ok((before - records.len()) as u64)
        }
    }

    #[tokio::test]
    async fn calls_are_offloaded_and_results_returned() {
        let adapter = BlockingStoreAdapter::new(VecEngine::default());

        adapter
            .add(
                &[ChatMessage::user("I like tea")],
                "u1",
                serde_json::json!({}),
            )
            .await
            .unwrap();

        let found = adapter.search("u1", "tea", 5).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text(), Some("I like tea"));

        assert!(adapter.search("u2", "tea", 5).await.unwrap().is_empty());
        assert_eq!(adapter.delete_all("u1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn engine_errors_pass_through() {
        let adapter = BlockingStoreAdapter::new(VecEngine::default());
        let result = adapter.delete("m1").await;
        assert!(matches!(result, Err(StoreError::Engine(_))));
    }
}
