//! Application state wiring the agent to its concrete backings.
//!
//! The agent is generic over store/model traits; AppState pins it to the
//! infra implementations used in production.

use std::sync::Arc;

use secrecy::SecretString;

use memora_core::agent::MemoryAgent;
use memora_infra::config::{API_KEY_ENV, ServiceConfig};
use memora_infra::llm::OpenAiChatModel;
use memora_infra::store::RestMemoryStore;

/// Agent generics pinned to the production infra implementations.
pub type ConcreteAgent = MemoryAgent<RestMemoryStore, OpenAiChatModel>;

/// Shared application state used by the REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<ConcreteAgent>,
}

impl AppState {
    /// Wire the agent from configuration and start its workers.
    pub async fn init(config: ServiceConfig) -> anyhow::Result<Self> {
        let api_key = config.resolve_api_key().unwrap_or_else(|| {
            tracing::warn!("no model API key configured; set {API_KEY_ENV}");
            SecretString::from("")
        });

        let model = OpenAiChatModel::new(&config.model, api_key);
        let store = Arc::new(RestMemoryStore::new(&config.store)?);
        let tuning = config.agent.to_tuning(&config.model.model);

        Ok(Self {
            agent: Arc::new(MemoryAgent::new(store, model, tuning)),
        })
    }
}
