//! Service configuration loader.
//!
//! Reads `config.toml` and deserializes it into [`ServiceConfig`],
//! falling back to defaults when the file is missing or malformed. The
//! model API key is resolved from the `MEMORA_API_KEY` environment
//! variable first, then from the config file.

use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use memora_core::agent::AgentTuning;
use memora_core::context::DEFAULT_PERSONA;

/// Environment variable consulted before the config file for the model
/// endpoint API key.
pub const API_KEY_ENV: &str = "MEMORA_API_KEY";

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub model: ModelEndpointConfig,
    pub store: StoreEndpointConfig,
    pub agent: AgentSection,
}

/// Model endpoint connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelEndpointConfig {
    /// OpenAI-compatible base URL, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Default model identifier sent when a request leaves it empty.
    pub model: String,
    /// API key; prefer `MEMORA_API_KEY` over putting it in the file.
    pub api_key: Option<String>,
    /// Overall request deadline.
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    /// Bound on in-flight requests against the endpoint.
    pub max_concurrent_requests: usize,
    /// Idle pooled connections kept per destination.
    pub max_idle_per_host: usize,
}

impl Default for ModelEndpointConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            request_timeout_secs: 30,
            connect_timeout_secs: 5,
            read_timeout_secs: 10,
            max_concurrent_requests: 100,
            max_idle_per_host: 30,
        }
    }
}

impl ModelEndpointConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

/// Memory store service settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreEndpointConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for StoreEndpointConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8765".to_string(),
            request_timeout_secs: 15,
            connect_timeout_secs: 5,
        }
    }
}

/// Orchestrator tunables, mirrored into [`AgentTuning`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub persona: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub retrieval_limit: usize,
    pub cache_ttl_secs: u64,
    pub max_retries: u32,
    pub failure_threshold: u32,
    pub breaker_timeout_secs: u64,
    pub persist_workers: usize,
    pub persist_capacity: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        let tuning = AgentTuning::default();
        Self {
            persona: DEFAULT_PERSONA.to_string(),
            max_tokens: tuning.max_tokens,
            temperature: 0.7,
            retrieval_limit: tuning.retrieval_limit,
            cache_ttl_secs: tuning.cache_ttl.as_secs(),
            max_retries: tuning.max_retries,
            failure_threshold: tuning.failure_threshold,
            breaker_timeout_secs: tuning.breaker_timeout.as_secs(),
            persist_workers: tuning.persist_workers,
            persist_capacity: tuning.persist_capacity,
        }
    }
}

impl AgentSection {
    /// Build the core tuning struct, pinning the model identifier.
    pub fn to_tuning(&self, model: &str) -> AgentTuning {
        AgentTuning {
            persona: self.persona.clone(),
            model: model.to_string(),
            max_tokens: self.max_tokens,
            temperature: Some(self.temperature),
            retrieval_limit: self.retrieval_limit,
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            max_retries: self.max_retries,
            failure_threshold: self.failure_threshold,
            breaker_timeout: Duration::from_secs(self.breaker_timeout_secs),
            persist_workers: self.persist_workers,
            persist_capacity: self.persist_capacity,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from `path`.
    ///
    /// - Missing file: defaults, logged at debug.
    /// - Unreadable or unparsable file: defaults, logged as a warning.
    pub async fn load(path: &Path) -> Self {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("no config at {}, using defaults", path.display());
                return Self::default();
            }
            Err(err) => {
                tracing::warn!("failed to read {}: {err}, using defaults", path.display());
                return Self::default();
            }
        };

        match toml::from_str::<Self>(&content) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("failed to parse {}: {err}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Resolve the model API key: environment first, then config file.
    pub fn resolve_api_key(&self) -> Option<SecretString> {
        if let Ok(key) = std::env::var(API_KEY_ENV)
            && !key.is_empty()
        {
            return Some(SecretString::from(key));
        }
        self.model
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .map(SecretString::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_returns_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = ServiceConfig::load(&tmp.path().join("config.toml")).await;
        assert_eq!(config.model.base_url, "https://api.openai.com/v1");
        assert_eq!(config.model.max_concurrent_requests, 100);
        assert_eq!(config.agent.cache_ttl_secs, 600);
        assert_eq!(config.agent.failure_threshold, 5);
    }

    #[tokio::test]
    async fn valid_toml_is_parsed_with_partial_overrides() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        tokio::fs::write(
            &path,
            r#"
[model]
base_url = "http://localhost:4000/v1"
model = "local-model"

[agent]
max_retries = 5
retrieval_limit = 8
"#,
        )
        .await
        .unwrap();

        let config = ServiceConfig::load(&path).await;
        assert_eq!(config.model.base_url, "http://localhost:4000/v1");
        assert_eq!(config.model.model, "local-model");
        // Untouched fields keep their defaults.
        assert_eq!(config.model.request_timeout_secs, 30);
        assert_eq!(config.agent.max_retries, 5);
        assert_eq!(config.agent.retrieval_limit, 8);
        assert_eq!(config.agent.persist_workers, 2);
    }

    #[tokio::test]
    async fn invalid_toml_returns_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        tokio::fs::write(&path, "not { valid toml !!!").await.unwrap();

        let config = ServiceConfig::load(&path).await;
        assert_eq!(config.model.model, "gpt-4o-mini");
    }

    #[test]
    fn tuning_mirrors_agent_section() {
        let section = AgentSection {
            max_retries: 7,
            cache_ttl_secs: 42,
            ..Default::default()
        };
        let tuning = section.to_tuning("gpt-4o");
        assert_eq!(tuning.model, "gpt-4o");
        assert_eq!(tuning.max_retries, 7);
        assert_eq!(tuning.cache_ttl, Duration::from_secs(42));
        assert_eq!(tuning.temperature, Some(0.7));
    }

    #[test]
    fn config_file_api_key_is_used_when_env_is_unset() {
        let config = ServiceConfig {
            model: ModelEndpointConfig {
                api_key: Some("file-key".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        // Assumes MEMORA_API_KEY is not set in the test environment.
        if std::env::var(API_KEY_ENV).is_err() {
            assert!(config.resolve_api_key().is_some());
        }
    }

    #[test]
    fn empty_api_key_resolves_to_none() {
        let config = ServiceConfig {
            model: ModelEndpointConfig {
                api_key: Some(String::new()),
                ..Default::default()
            },
            ..Default::default()
        };
        if std::env::var(API_KEY_ENV).is_err() {
            assert!(config.resolve_api_key().is_none());
        }
    }
}
