//! OpenAiChatModel -- concrete [`ChatModel`] for OpenAI-compatible
//! chat completions endpoints.
//!
//! Talks to `{base_url}/chat/completions` with bearer auth. The pooled
//! HTTP client is process-shared and built lazily on first use under an
//! async once-cell, so concurrent first callers cannot race-create
//! multiple pools. Total in-flight requests are bounded by a semaphore;
//! per-destination pooling and the connect/read/overall deadlines come
//! from the client builder.
//!
//! The API key is wrapped in [`secrecy::SecretString`] and is never
//! logged or included in `Debug` output.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{OnceCell, Semaphore};

use memora_core::llm::provider::{ChatModel, ModelStream};
use memora_types::error::ModelError;
use memora_types::llm::ChatRequest;

use crate::config::ModelEndpointConfig;

use super::streaming::map_sse_response;
use super::types::{WireChatRequest, WireChatResponse};

/// Shared client state, cloned into streaming generators.
struct ClientCore {
    http: OnceCell<reqwest::Client>,
    limiter: Semaphore,
    api_key: SecretString,
    base_url: String,
    model: String,
    request_timeout: Duration,
    connect_timeout: Duration,
    read_timeout: Duration,
    max_idle_per_host: usize,
}

impl ClientCore {
    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// The lazily-built pooled HTTP client.
    async fn client(&self) -> Result<&reqwest::Client, ModelError> {
        self.http
            .get_or_try_init(|| async {
                reqwest::Client::builder()
                    .timeout(self.request_timeout)
                    .connect_timeout(self.connect_timeout)
                    .read_timeout(self.read_timeout)
                    .pool_max_idle_per_host(self.max_idle_per_host)
                    .pool_idle_timeout(Duration::from_secs(30))
                    .user_agent(concat!("memora/", env!("CARGO_PKG_VERSION")))
                    .build()
                    .map_err(|err| {
                        ModelError::Transport(format!("failed to build http client: {err}"))
                    })
            })
            .await
    }
}

/// OpenAI-compatible chat model client.
pub struct OpenAiChatModel {
    core: Arc<ClientCore>,
}

// OpenAiChatModel intentionally does NOT derive Debug to prevent
// accidental exposure of internal state including the API key.

impl OpenAiChatModel {
    pub fn new(config: &ModelEndpointConfig, api_key: SecretString) -> Self {
        Self {
            core: Arc::new(ClientCore {
                http: OnceCell::new(),
                limiter: Semaphore::new(config.max_concurrent_requests.max(1)),
                api_key,
                base_url: config.base_url.clone(),
                model: config.model.clone(),
                request_timeout: config.request_timeout(),
                connect_timeout: config.connect_timeout(),
                read_timeout: config.read_timeout(),
                max_idle_per_host: config.max_idle_per_host,
            }),
        }
    }

    /// The configured default model identifier.
    pub fn model(&self) -> &str {
        &self.core.model
    }
}

impl ChatModel for OpenAiChatModel {
    fn name(&self) -> &str {
        "openai_compatible"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, ModelError> {
        let core = &self.core;
        let client = core.client().await?;
        let _permit = core
            .limiter
            .acquire()
            .await
            .map_err(|_| ModelError::Transport("request limiter closed".to_string()))?;

        let body = WireChatRequest::from_request(request, &core.model, false);
        let response = client
            .post(core.endpoint())
            .bearer_auth(core.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, retry_after_ms, body));
        }

        let wire: WireChatResponse = response
            .json()
            .await
            .map_err(|err| ModelError::Decode(format!("failed to parse response: {err}")))?;

        wire.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ModelError::Decode("response contained no choices".to_string()))
    }

    fn stream(&self, request: ChatRequest) -> ModelStream {
        let core = Arc::clone(&self.core);
        Box::pin(async_stream::stream! {
            let client = match core.client().await {
                Ok(client) => client,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };
            // Held until the stream is exhausted: a streaming turn
            // occupies one slot of the request bound for its duration.
            let _permit = match core.limiter.acquire().await {
                Ok(permit) => permit,
                Err(_) => {
                    yield Err(ModelError::Transport("request limiter closed".to_string()));
                    return;
                }
            };

            let body = WireChatRequest::from_request(&request, &core.model, true);
            let response = match client
                .post(core.endpoint())
                .bearer_auth(core.api_key.expose_secret())
                .json(&body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    yield Err(map_transport_error(err));
                    return;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let retry_after_ms = parse_retry_after(response.headers());
                let body = response.text().await.unwrap_or_default();
                yield Err(status_error(status, retry_after_ms, body));
                return;
            }

            let mut inner = map_sse_response(response);
            use futures_util::StreamExt;
            while let Some(event) = inner.next().await {
                yield event;
            }
        })
    }
}

/// Deadline breaches surface as timeouts, distinct from other transport
/// failures.
fn map_transport_error(err: reqwest::Error) -> ModelError {
    if err.is_timeout() {
        ModelError::Timeout
    } else if err.is_connect() {
        ModelError::Transport(format!("connect failed: {err}"))
    } else {
        ModelError::Transport(err.to_string())
    }
}

fn status_error(status: StatusCode, retry_after_ms: Option<u64>, body: String) -> ModelError {
    match status.as_u16() {
        401 | 403 => ModelError::AuthenticationFailed,
        429 => ModelError::RateLimited { retry_after_ms },
        _ => ModelError::Api {
            status: status.as_u16(),
            message: body,
        },
    }
}

/// `Retry-After` in whole seconds, converted to milliseconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(|secs| secs * 1000)
}
