//! Request coalescing for identical in-flight retrievals.
//!
//! At most one store search runs per key at any time; concurrent callers
//! with the same key share the single in-flight result. The first caller
//! (the leader) registers the shared future and removes it exactly once
//! after completion, success or failure alike, so a failed computation
//! never blocks the key.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::FutureExt;
use futures_util::future::Shared;

use memora_types::error::StoreError;

use super::RetrievalKey;

type SharedSearch =
    Shared<Pin<Box<dyn Future<Output = Result<Vec<String>, StoreError>> + Send>>>;

/// Singleflight map of pending retrievals.
#[derive(Clone, Default)]
pub struct RequestCoalescer {
    pending: Arc<DashMap<RetrievalKey, SharedSearch>>,
}

impl RequestCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `compute` for `key`, or join an identical in-flight run.
    ///
    /// `compute` is only invoked by the leader; every other concurrent
    /// caller awaits the leader's shared future. The result (or the
    /// cloned error) is fanned out to all of them.
    pub async fn run<F, Fut>(
        &self,
        key: RetrievalKey,
        compute: F,
    ) -> Result<Vec<String>, StoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<String>, StoreError>> + Send + 'static,
    {
        let (search, leader) = match self.pending.entry(key.clone()) {
            Entry::Occupied(occupied) => (occupied.get().clone(), false),
            Entry::Vacant(vacant) => {
                let boxed: Pin<Box<dyn Future<Output = Result<Vec<String>, StoreError>> + Send>> =
                    Box::pin(compute());
                let shared = boxed.shared();
                vacant.insert(shared.clone());
                (shared, true)
            }
        };

        let result = search.await;
        if leader {
            self.pending.remove(&key);
        }
        result
    }

    /// Number of keys with an in-flight computation.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
