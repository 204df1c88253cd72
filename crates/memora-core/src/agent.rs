//! Conversation orchestrator.
//!
//! [`MemoryAgent`] sequences one turn end to end: retrieve relevant
//! memories, assemble the prompt, call the model through the circuit
//! breaker, update session history, and hand the completed exchange to
//! the background persistence queue without waiting for it. The chat
//! surface never hard-fails: degraded conditions collapse into an
//! apologetic reply with the error detail attached.

use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::{Stream, StreamExt};
use tokio::sync::oneshot;
use tracing::{info, warn};

use memora_types::error::StoreError;
use memora_types::llm::{ChatMessage, ChatRequest, ModelEvent};
use memora_types::memory::MemoryRecord;
use memora_types::turn::{StreamItem, TurnReply};

use crate::context::{ContextBuilder, DEFAULT_PERSONA};
use crate::llm::breaker::{CircuitBreaker, DEFAULT_FAILURE_THRESHOLD, DEFAULT_OPEN_TIMEOUT};
use crate::llm::gateway::{DEFAULT_MAX_RETRIES, ModelGateway, failure_fallback};
use crate::llm::provider::ChatModel;
use crate::persist::{
    DEFAULT_PERSIST_CAPACITY, DEFAULT_PERSIST_WORKERS, PersistJob, PersistQueue,
};
use crate::retrieval::{DEFAULT_CACHE_TTL, Retriever};
use crate::session::{SessionKey, SessionStore};
use crate::store::MemoryStore;

/// Tunables for one agent instance. `Default` mirrors the reference
/// behavior: 5-memory retrieval, 600 s cache TTL, 3 attempts, breaker at
/// 5 failures / 60 s, two persistence workers.
#[derive(Debug, Clone)]
pub struct AgentTuning {
    /// System persona prepended to every prompt.
    pub persona: String,
    /// Model identifier; empty means the backend's configured default.
    pub model: String,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
    /// Memories fetched per turn.
    pub retrieval_limit: usize,
    pub cache_ttl: Duration,
    pub max_retries: u32,
    pub failure_threshold: u32,
    pub breaker_timeout: Duration,
    pub persist_workers: usize,
    pub persist_capacity: usize,
}

impl Default for AgentTuning {
    fn default() -> Self {
        Self {
            persona: DEFAULT_PERSONA.to_string(),
            model: String::new(),
            max_tokens: 1000,
            temperature: Some(0.7),
            retrieval_limit: 5,
            cache_ttl: DEFAULT_CACHE_TTL,
            max_retries: DEFAULT_MAX_RETRIES,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            breaker_timeout: DEFAULT_OPEN_TIMEOUT,
            persist_workers: DEFAULT_PERSIST_WORKERS,
            persist_capacity: DEFAULT_PERSIST_CAPACITY,
        }
    }
}

/// Handle for a streaming turn.
///
/// `items` is the forward-only sequence for the caller (exactly one
/// `Meta`, then deltas, then one `Done`); `full_text` resolves with the
/// materialized reply once the sequence has been exhausted.
pub struct TurnStream {
    pub items: Pin<Box<dyn Stream<Item = StreamItem> + Send + 'static>>,
    pub full_text: oneshot::Receiver<String>,
}

/// The conversation orchestration agent.
///
/// Generic over the store and model ports so infrastructure stays out of
/// this crate. All mutable state (sessions, cache, pending retrievals,
/// breaker counters) is owned by the instance -- no process globals.
pub struct MemoryAgent<S, M> {
    store: Arc<S>,
    gateway: ModelGateway<M>,
    retriever: Retriever<S>,
    sessions: SessionStore,
    context: ContextBuilder,
    persist: Arc<PersistQueue>,
    tuning: AgentTuning,
}

impl<S, M> MemoryAgent<S, M>
where
    S: MemoryStore + 'static,
    M: ChatModel,
{
    /// Construct the agent and start its persistence workers.
    ///
    /// Must run inside a tokio runtime.
    pub fn new(store: Arc<S>, model: M, tuning: AgentTuning) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(
            tuning.failure_threshold,
            tuning.breaker_timeout,
        ));
        let gateway = ModelGateway::new(model, breaker, tuning.max_retries);
        let retriever = Retriever::new(Arc::clone(&store), tuning.cache_ttl);
        let persist = Arc::new(PersistQueue::spawn(
            Arc::clone(&store),
            tuning.persist_workers,
            tuning.persist_capacity,
        ));

        Self {
            store,
            gateway,
            retriever,
            sessions: SessionStore::new(),
            context: ContextBuilder::new(tuning.persona.clone()),
            persist,
            tuning,
        }
    }

    /// One whole-response conversation turn. Always returns a
    /// well-formed reply; see the module docs for the degraded paths.
    pub async fn chat(
        &self,
        owner_id: &str,
        message: &str,
        session_id: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> TurnReply {
        let started = Instant::now();
        let session_id = session_id.unwrap_or_else(SessionStore::generate_session_id);
        let key = SessionKey::new(owner_id, session_id.clone());
        self.sessions.ensure(&key);

        let (memories, history) = tokio::join!(
            self.retrieve_for_turn(owner_id, message),
            async { self.sessions.recent(&key) },
        );

        let messages = self.context.build(message, &memories, &history);
        let request = self.request(messages, false);
        let outcome = self.gateway.complete(&request).await;

        // History appends happen strictly after the model call that
        // produced them.
        self.sessions.append_exchange(
            &key,
            ChatMessage::user(message),
            ChatMessage::assistant(outcome.text.clone()),
        );

        if outcome.error.is_none() {
            self.persist.enqueue(PersistJob {
                turns: vec![
                    ChatMessage::user(message),
                    ChatMessage::assistant(outcome.text.clone()),
                ],
                owner_id: owner_id.to_string(),
                session_id: session_id.clone(),
                metadata,
            });
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            owner_id,
            session_id = %session_id,
            elapsed_ms,
            memories = memories.len(),
            degraded = outcome.error.is_some(),
            "chat turn completed"
        );

        TurnReply {
            reply: outcome.text,
            owner_id: owner_id.to_string(),
            session_id,
            memories_used: memories,
            timestamp: Utc::now(),
            elapsed_ms,
            error: outcome.error,
        }
    }

    /// Streaming variant of [`chat`](Self::chat).
    ///
    /// Session history and background persistence are updated from the
    /// materialized text once the caller has exhausted the sequence;
    /// abandoning the stream abandons both.
    pub async fn chat_stream(
        &self,
        owner_id: &str,
        message: &str,
        session_id: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> TurnStream {
        let session_id = session_id.unwrap_or_else(SessionStore::generate_session_id);
        let key = SessionKey::new(owner_id, session_id.clone());
        self.sessions.ensure(&key);

        // Streaming call sites tolerate staleness, so this path goes
        // through the retrieval cache and coalescer.
        let (memories, history) = tokio::join!(
            self.retrieve_cached(owner_id, message),
            async { self.sessions.recent(&key) },
        );

        let messages = self.context.build(message, &memories, &history);
        let request = self.request(messages, true);

        let meta = StreamItem::Meta {
            owner_id: owner_id.to_string(),
            session_id: session_id.clone(),
            memories_used: memories,
            timestamp: Utc::now(),
        };

        let started_stream = self.gateway.stream(request);
        let sessions = self.sessions.clone();
        let persist = Arc::clone(&self.persist);
        let user_message = message.to_string();
        let (full_tx, full_rx) = oneshot::channel();

        let items = Box::pin(async_stream::stream! {
            yield meta;

            let mut full = String::new();
            let mut degraded = false;

            match started_stream {
                Ok(mut events) => {
                    while let Some(event) = events.next().await {
                        match event {
                            Ok(ModelEvent::TextDelta { text }) => {
                                full.push_str(&text);
                                yield StreamItem::Delta { text };
                            }
                            Ok(ModelEvent::Done) => break,
                            Ok(ModelEvent::Connected) => {}
                            Err(err) => {
                                warn!(error = %err, "model stream failed mid-turn");
                                degraded = true;
                                yield StreamItem::Error {
                                    detail: err.to_string(),
                                };
                                break;
                            }
                        }
                    }
                }
                Err(err) => {
                    warn!(error = %err, "streaming turn rejected, sending fallback");
                    degraded = true;
                    let text = failure_fallback(&err.to_string());
                    full.push_str(&text);
                    yield StreamItem::Delta { text };
                }
            }

            if !degraded && !full.is_empty() {
                sessions.append_exchange(
                    &key,
                    ChatMessage::user(&user_message),
                    ChatMessage::assistant(&full),
                );
                persist.enqueue(PersistJob {
                    turns: vec![
                        ChatMessage::user(&user_message),
                        ChatMessage::assistant(&full),
                    ],
                    owner_id: key.owner_id.clone(),
                    session_id: key.session_id.clone(),
                    metadata,
                });
            }

            let _ = full_tx.send(full);
            yield StreamItem::Done;
        });

        TurnStream {
            items,
            full_text: full_rx,
        }
    }

    /// Search an owner's memories (raw store records).
    pub async fn search_memories(
        &self,
        owner_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        self.store.search(owner_id, query, limit).await
    }

    /// Every memory record for an owner.
    pub async fn get_all_memories(&self, owner_id: &str) -> Result<Vec<MemoryRecord>, StoreError> {
        self.store.get_all(owner_id).await
    }

    /// Delete a single memory record.
    pub async fn delete_memory(&self, memory_id: &str) -> Result<(), StoreError> {
        self.store.delete(memory_id).await
    }

    /// Delete all of an owner's memories, and drop their session state.
    pub async fn clear_user_memories(&self, owner_id: &str) -> Result<u64, StoreError> {
        let deleted = self.store.delete_all(owner_id).await?;
        let sessions = self.sessions.clear_owner(owner_id);
        info!(owner_id, deleted, sessions, "cleared user memories");
        Ok(deleted)
    }

    /// Orderly shutdown: stop accepting persistence work and wait for
    /// the queue to drain.
    pub async fn close(&self) {
        self.persist.close().await;
        info!("memory agent closed");
    }

    /// Turn-level retrieval: direct store path, failure degrades to an
    /// empty memory list so the turn proceeds without context.
    async fn retrieve_for_turn(&self, owner_id: &str, message: &str) -> Vec<String> {
        self.retriever
            .fresh(owner_id, message, self.tuning.retrieval_limit)
            .await
            .unwrap_or_else(|err| {
                warn!(error = %err, owner_id, "memory retrieval failed, continuing without context");
                Vec::new()
            })
    }

    /// Staleness-tolerant retrieval through the cache and coalescer.
    async fn retrieve_cached(&self, owner_id: &str, message: &str) -> Vec<String> {
        self.retriever
            .cached(owner_id, message, self.tuning.retrieval_limit)
            .await
            .unwrap_or_else(|err| {
                warn!(error = %err, owner_id, "memory retrieval failed, continuing without context");
                Vec::new()
            })
    }

    fn request(&self, messages: Vec<ChatMessage>, stream: bool) -> ChatRequest {
        ChatRequest {
            model: self.tuning.model.clone(),
            messages,
            max_tokens: self.tuning.max_tokens,
            temperature: self.tuning.temperature,
            stream,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::Notify;

    use memora_types::error::ModelError;
    use memora_types::llm::MessageRole;

    use crate::llm::provider::ModelStream;
    use crate::session::MAX_HISTORY_MESSAGES;

    /// In-memory store: `add` turns each message into a searchable
    /// record; `search` returns an owner's records in insertion order,
    /// capped at `limit`.
    #[derive(Default)]
    struct FakeStore {
        records: Mutex<Vec<(String, MemoryRecord)>>,
        next_id: AtomicUsize,
        persisted: Notify,
        fail_search: bool,
        fail_add: bool,
    }

    impl MemoryStore for FakeStore {
        async fn search(
            &self,
            owner_id: &str,
            _query: &str,
            limit: usize,
        ) -> Result<Vec<MemoryRecord>, StoreError> {
            if self.fail_search {
                return Err(StoreError::Unavailable);
            }
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

        async fn add(
            &self,
            turns: &[ChatMessage],
            owner_id: &str,
            metadata: serde_json::Value,
        ) -> Result<(), StoreError> {
            if self.fail_add {
                self.persisted.notify_one();
                return Err(StoreError::Engine("write failed".to_string()));
            }
            let mut records = self.records.lock().unwrap();
            for turn in turns {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                records.push((
                    owner_id.to_string(),
                    MemoryRecord {
                        id: Some(format!("mem-{id}")),
                        memory: Some(turn.content.clone()),
                        metadata: metadata.clone(),
                        ..Default::default()
                    },
                ));
            }
            drop(records);
            self.persisted.notify_one();
            Ok(())
        }

        async fn get_all(&self, owner_id: &str) -> Result<Vec<MemoryRecord>, StoreError> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|(owner, _)| owner == owner_id)
                .map(|(_, record)| record.clone())
                .collect())
        }

        async fn delete(&self, memory_id: &str) -> Result<(), StoreError> {
            self.records
                .lock()
                .unwrap()
                .retain(|(_, record)| record.id.as_deref() != Some(memory_id));
            Ok(())
        }

        async fn delete_all(&self, owner_id: &str) -> Result<u64, StoreError> {
            let mut records = self.records.lock().unwrap();
            let before = records.len();
            records.retain(|(owner, _)| owner != owner_id);
            Ok((before - records.len()) as u64)
        }
    }

    /// Model returning a fixed reply; streaming splits it into
    /// three-character fragments.
    struct FixedModel {
        reply: String,
        fail: bool,
    }

    impl FixedModel {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                fail: false,
            }
        }
    }

    impl ChatModel for FixedModel {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, _request: &ChatRequest) -> Result<String, ModelError> {
            if self.fail {
                return Err(ModelError::Transport("endpoint down".to_string()));
            }
            Ok(self.reply.clone())
        }

        fn stream(&self, _request: ChatRequest) -> ModelStream {
            if self.fail {
                return Box::pin(futures_util::stream::once(async {
                    Err(ModelError::Stream("endpoint down".to_string()))
                }));
            }
            let chunks: Vec<_> = self
                .reply
                .chars()
                .collect::<Vec<_>>()
                .chunks(3)
                .map(|chunk| {
                    Ok(ModelEvent::TextDelta {
                        text: chunk.iter().collect(),
                    })
                })
                .chain(std::iter::once(Ok(ModelEvent::Done)))
                .collect();
            Box::pin(futures_util::stream::iter(chunks))
        }
    }

    fn fast_tuning() -> AgentTuning {
        AgentTuning {
            max_retries: 1,
            persist_workers: 1,
            persist_capacity: 16,
            ..Default::default()
        }
    }

    fn agent(store: Arc<FakeStore>, model: FixedModel) -> MemoryAgent<FakeStore, FixedModel> {
        MemoryAgent::new(store, model, fast_tuning())
    }

    #[tokio::test]
    async fn absent_session_id_generates_unique_ids() {
        let agent = agent(Arc::new(FakeStore::default()), FixedModel::new("hi"));

        let first = agent.chat("u1", "hello", None, None).await;
        let second = agent.chat("u1", "hello", None, None).await;

        assert!(!first.session_id.is_empty());
        assert!(!second.session_id.is_empty());
        assert_ne!(first.session_id, second.session_id);
        agent.close().await;
    }

    #[tokio::test]
    async fn persisted_turn_is_recalled_on_a_later_chat() {
        let store = Arc::new(FakeStore::default());
        let agent = agent(Arc::clone(&store), FixedModel::new("Nice to meet you!"));

        let first = agent
            .chat("u1", "Hi, I'm Alice and I live in Tokyo", None, None)
            .await;
        assert!(first.memories_used.is_empty());
        store.persisted.notified().await;

        let second = agent.chat("u1", "Where do I live?", None, None).await;
        assert!(
            second
                .memories_used
                .iter()
                .any(|memory| memory.contains("Tokyo")),
            "expected a memory derived from the first turn, got {:?}",
            second.memories_used
        );
        agent.close().await;
    }

    #[tokio::test]
    async fn retrieval_failure_degrades_to_empty_memories() {
        let store = Arc::new(FakeStore {
            fail_search: true,
            ..Default::default()
        });
        let agent = agent(Arc::clone(&store), FixedModel::new("still here"));

        let reply = agent.chat("u1", "hello", None, None).await;
        assert_eq!(reply.reply, "still here");
        assert!(reply.memories_used.is_empty());
        assert!(reply.error.is_none());
        agent.close().await;
    }

    #[tokio::test]
    async fn persistence_failure_does_not_change_the_reply() {
        let store = Arc::new(FakeStore {
            fail_add: true,
            ..Default::default()
        });
        let agent = agent(Arc::clone(&store), FixedModel::new("unaffected"));

        let reply = agent.chat("u1", "hello", None, None).await;
        assert_eq!(reply.reply, "unaffected");
        assert!(reply.error.is_none());

        // The write was attempted and failed in the background.
        store.persisted.notified().await;
        assert!(store.records.lock().unwrap().is_empty());
        agent.close().await;
    }

    #[tokio::test]
    async fn session_history_stays_bounded_across_turns() {
        let store = Arc::new(FakeStore::default());
        let agent = agent(Arc::clone(&store), FixedModel::new("ack"));
        let session = Some("fixed-session".to_string());

        for i in 0..9 {
            agent
                .chat("u1", &format!("message {i}"), session.clone(), None)
                .await;
        }

        let key = SessionKey::new("u1", "fixed-session");
        let recent = agent.sessions.recent(&key);
        assert_eq!(recent.len(), MAX_HISTORY_MESSAGES);
        // FIFO eviction: the window starts mid-conversation.
        assert_eq!(recent[0].content, "message 4");
        assert_eq!(recent[0].role, MessageRole::User);
        agent.close().await;
    }

    #[tokio::test]
    async fn model_failure_yields_degraded_reply_and_skips_persistence() {
        let store = Arc::new(FakeStore::default());
        let model = FixedModel {
            reply: String::new(),
            fail: true,
        };
        let agent = agent(Arc::clone(&store), model);

        let reply = agent.chat("u1", "hello", None, None).await;
        assert!(reply.reply.starts_with("Sorry"));
        assert!(reply.error.unwrap().contains("endpoint down"));
        assert!(reply.memories_used.is_empty());

        agent.close().await;
        assert!(store.records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stream_has_meta_then_deltas_then_done_and_matches_complete() {
        let store = Arc::new(FakeStore::default());
        let agent = agent(Arc::clone(&store), FixedModel::new("Hello from memora"));

        let turn = agent.chat_stream("u1", "hi", None, None).await;
        let items: Vec<StreamItem> = turn.items.collect().await;

        assert!(matches!(items.first(), Some(StreamItem::Meta { .. })));
        assert!(matches!(items.last(), Some(StreamItem::Done)));
        let metas = items
            .iter()
            .filter(|item| matches!(item, StreamItem::Meta { .. }))
            .count();
        let dones = items
            .iter()
            .filter(|item| matches!(item, StreamItem::Done))
            .count();
        assert_eq!(metas, 1);
        assert_eq!(dones, 1);

        let concatenated: String = items
            .iter()
            .filter_map(|item| match item {
                StreamItem::Delta { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(concatenated, "Hello from memora");
        assert_eq!(turn.full_text.await.unwrap(), "Hello from memora");

        // Streaming and whole-response modes agree for the same prompt.
        let reply = agent.chat("u2", "hi", None, None).await;
        assert_eq!(reply.reply, concatenated);
        agent.close().await;
    }

    #[tokio::test]
    async fn stream_persists_the_materialized_text() {
        let store = Arc::new(FakeStore::default());
        let agent = agent(Arc::clone(&store), FixedModel::new("streamed reply"));

        let turn = agent
            .chat_stream("u1", "hi", Some("s1".to_string()), None)
            .await;
        let _items: Vec<StreamItem> = turn.items.collect().await;
        store.persisted.notified().await;

        let records = store.records.lock().unwrap();
        assert!(
            records
                .iter()
                .any(|(_, record)| record.text() == Some("streamed reply"))
        );
        drop(records);

        let recent = agent.sessions.recent(&SessionKey::new("u1", "s1"));
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].content, "streamed reply");
        agent.close().await;
    }

    #[tokio::test]
    async fn clear_user_memories_drops_records_and_sessions() {
        let store = Arc::new(FakeStore::default());
        let agent = agent(Arc::clone(&store), FixedModel::new("ok"));

        agent
            .chat("u1", "remember me", Some("s1".to_string()), None)
            .await;
        store.persisted.notified().await;
        assert!(!store.records.lock().unwrap().is_empty());

        let deleted = agent.clear_user_memories("u1").await.unwrap();
        assert!(deleted > 0);
        assert!(agent.get_all_memories("u1").await.unwrap().is_empty());
        assert!(agent.sessions.recent(&SessionKey::new("u1", "s1")).is_empty());
        agent.close().await;
    }

    #[tokio::test]
    async fn delete_memory_removes_a_single_record() {
        let store = Arc::new(FakeStore::default());
        let agent = agent(Arc::clone(&store), FixedModel::new("ok"));

        agent.chat("u1", "first fact", None, None).await;
        store.persisted.notified().await;

        let all = agent.get_all_memories("u1").await.unwrap();
        let id = all[0].id.clone().unwrap();
        agent.delete_memory(&id).await.unwrap();

        let remaining = agent.get_all_memories("u1").await.unwrap();
        assert!(remaining.iter().all(|record| record.id.as_deref() != Some(id.as_str())));
        agent.close().await;
    }
}
