//! Background persistence of completed turns.
//!
//! Fire-and-forget: the orchestrator enqueues the user/assistant pair
//! and returns immediately; a small fixed worker pool drains the bounded
//! queue and writes to the memory store. Failures are logged, never
//! retried, never surfaced to the caller. Closing the queue lets workers
//! drain whatever is still buffered before they exit.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use memora_types::llm::ChatMessage;

use crate::store::MemoryStore;

/// Default worker count for the persistence pool.
pub const DEFAULT_PERSIST_WORKERS: usize = 2;

/// Default bound on buffered, not-yet-written jobs.
pub const DEFAULT_PERSIST_CAPACITY: usize = 256;

/// One completed exchange waiting to be written to the store.
#[derive(Debug)]
pub struct PersistJob {
    pub turns: Vec<ChatMessage>,
    pub owner_id: String,
    pub session_id: String,
    pub metadata: Option<serde_json::Value>,
}

/// Bounded queue + worker pool writing turns into the memory store.
pub struct PersistQueue {
    tx: Mutex<Option<mpsc::Sender<PersistJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl PersistQueue {
    /// Start `workers` background tasks draining a queue of `capacity`.
    pub fn spawn<S>(store: Arc<S>, workers: usize, capacity: usize) -> Self
    where
        S: MemoryStore + 'static,
    {
        let (tx, rx) = mpsc::channel::<PersistJob>(capacity.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let handles = (0..workers.max(1))
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    loop {
                        let job = rx.lock().await.recv().await;
                        match job {
                            Some(job) => persist_job(store.as_ref(), job).await,
                            None => break,
                        }
                    }
                    debug!(worker, "persistence worker stopped");
                })
            })
            .collect();

        Self {
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(handles),
        }
    }

    /// Hand a job to the pool without waiting.
    ///
    /// A full (or closed) queue drops the job with a warning --
    /// persistence must never delay a reply.
    pub fn enqueue(&self, job: PersistJob) {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) => {
                if let Err(err) = tx.try_send(job) {
                    warn!("persistence queue full, dropping turn: {err}");
                }
            }
            None => warn!("persistence queue closed, dropping turn"),
        }
    }

    /// Close the queue and wait for the workers to drain it.
    pub async fn close(&self) {
        let tx = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(tx);

        let handles: Vec<_> = {
            let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            workers.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
    }
}

/// Write one job, merging caller metadata with the session id and a
/// generated RFC 3339 timestamp. Every record written by this agent
/// carries at least those two fields.
async fn persist_job<S: MemoryStore>(store: &S, job: PersistJob) {
    let mut metadata = match job.metadata {
        Some(value @ serde_json::Value::Object(_)) => value,
        Some(other) => json!({ "extra": other }),
        None => json!({}),
    };
    if let Some(object) = metadata.as_object_mut() {
        object.insert("session_id".to_string(), json!(job.session_id));
        object.insert("timestamp".to_string(), json!(Utc::now().to_rfc3339()));
    }

    match store.add(&job.turns, &job.owner_id, metadata).await {
        Ok(()) => debug!(owner_id = %job.owner_id, "conversation turn persisted"),
        Err(err) => {
            warn!(error = %err, owner_id = %job.owner_id, "background memory persistence failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::sync::Notify;

    use memora_types::error::StoreError;
    use memora_types::memory::MemoryRecord;

    #[derive(Default)]
    struct RecordingStore {
        added: Mutex<Vec<(Vec<ChatMessage>, String, serde_json::Value)>>,
        notify: Notify,
        fail: bool,
    }

    impl MemoryStore for RecordingStore {
        async fn search(
            &self,
            _owner_id: &str,
            _query: &str,
            _limit: usize,
        ) -> Result<Vec<MemoryRecord>, StoreError> {
            Ok(vec![])
        }

        async fn add(
            &self,
            turns: &[ChatMessage],
            owner_id: &str,
            metadata: serde_json::Value,
        ) -> Result<(), StoreError> {
            if self.fail {
                self.notify.notify_one();
                return Err(StoreError::Unavailable);
            }
            self.added
                .lock()
                .unwrap()
                .push((turns.to_vec(), owner_id.to_string(), metadata));
            self.notify.notify_one();
            Ok(())
        }

        async fn get_all(&self, _owner_id: &str) -> Result<Vec<MemoryRecord>, StoreError> {
            Ok(vec![])
        }

        async fn delete(&self, _memory_id: &str) -> Result<(), StoreError> {
            Ok(())
        }

        async fn delete_all(&self, _owner_id: &str) -> Result<u64, StoreError> {
            Ok(0)
        }
    }

    fn job(metadata: Option<serde_json::Value>) -> PersistJob {
        PersistJob {
            turns: vec![ChatMessage::user("q"), ChatMessage::assistant("a")],
            owner_id: "u1".to_string(),
            session_id: "s1".to_string(),
            metadata,
        }
    }

    #[tokio::test]
    async fn metadata_is_merged_with_session_and_timestamp() {
        let store = Arc::new(RecordingStore::default());
        let queue = PersistQueue::spawn(Arc::clone(&store), 1, 8);

        queue.enqueue(job(Some(json!({ "channel": "web" }))));
        tokio::time::timeout(Duration::from_secs(1), store.notify.notified())
            .await
            .expect("job never persisted");

        let added = store.added.lock().unwrap();
        let (turns, owner, metadata) = &added[0];
        assert_eq!(turns.len(), 2);
        assert_eq!(owner, "u1");
        assert_eq!(metadata["channel"], "web");
        assert_eq!(metadata["session_id"], "s1");
        let timestamp = metadata["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
        drop(added);

        queue.close().await;
    }

    #[tokio::test]
    async fn store_failure_is_swallowed() {
        let store = Arc::new(RecordingStore {
            fail: true,
            ..Default::default()
        });
        let queue = PersistQueue::spawn(Arc::clone(&store), 1, 8);

        queue.enqueue(job(None));
        tokio::time::timeout(Duration::from_secs(1), store.notify.notified())
            .await
            .expect("job never attempted");

        queue.close().await;
        assert!(store.added.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn close_drains_buffered_jobs() {
        let store = Arc::new(RecordingStore::default());
        let queue = PersistQueue::spawn(Arc::clone(&store), 1, 16);

        for _ in 0..3 {
            queue.enqueue(job(None));
        }
        queue.close().await;

        assert_eq!(store.added.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn enqueue_after_close_drops_without_panicking() {
        let store = Arc::new(RecordingStore::default());
        let queue = PersistQueue::spawn(Arc::clone(&store), 1, 8);
        queue.close().await;

        queue.enqueue(job(None));
        assert!(store.added.lock().unwrap().is_empty());
    }
}
