//! Memory retrieval paths: TTL cache, request coalescing, and the
//! combined [`Retriever`] facade over the store's `search` capability.
//!
//! Two paths are offered because different call sites tolerate different
//! staleness: `cached` (cache -> coalescer -> store) for reusable
//! lookups, and `fresh` (straight to the store) for turn-level retrieval.

pub mod cache;
pub mod coalescer;

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use memora_types::error::StoreError;
use memora_types::memory::MemoryRecord;

use crate::store::MemoryStore;

pub use cache::{DEFAULT_CACHE_TTL, RetrievalCache};
pub use coalescer::RequestCoalescer;

/// Cache/coalescing key for one retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RetrievalKey {
    pub owner_id: String,
    pub query: String,
    pub limit: usize,
}

/// Resolve store records into memory texts, dropping records with no
/// text under any variant.
pub fn texts_of(records: &[MemoryRecord]) -> Vec<String> {
    records
        .iter()
        .filter_map(|record| record.text().map(str::to_string))
        .collect()
}

/// Memory retrieval facade combining the cache, the coalescer, and the
/// store's search capability.
pub struct Retriever<S> {
    store: Arc<S>,
    cache: RetrievalCache,
    coalescer: RequestCoalescer,
}

impl<S: MemoryStore + 'static> Retriever<S> {
    pub fn new(store: Arc<S>, ttl: Duration) -> Self {
        Self {
            store,
            cache: RetrievalCache::new(ttl),
            coalescer: RequestCoalescer::new(),
        }
    }

    /// Cached lookup path. On a hit within the TTL the store is not
    /// touched; on a miss exactly one search runs per key regardless of
    /// concurrent fan-in, and the result is cached for the next window.
    pub async fn cached(
        &self,
        owner_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        let key = RetrievalKey {
            owner_id: owner_id.to_string(),
            query: query.to_string(),
            limit,
        };

        if let Some(hit) = self.cache.get(&key) {
            debug!(owner_id, query, "retrieval cache hit");
            return Ok(hit);
        }

        let store = Arc::clone(&self.store);
        let cache = self.cache.clone();
        let compute_key = key.clone();
        self.coalescer
            .run(key, move || async move {
                let records = store
                    .search(&compute_key.owner_id, &compute_key.query, compute_key.limit)
                    .await?;
                let texts = texts_of(&records);
                cache.insert(compute_key, texts.clone());
                Ok(texts)
            })
            .await
    }

    /// Direct store path, no cache. Used for turn-level retrieval where
    /// the freshest results are worth a store round-trip.
    pub async fn fresh(
        &self,
        owner_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        let records = self.store.search(owner_id, query, limit).await?;
        Ok(texts_of(&records))
    }
}
