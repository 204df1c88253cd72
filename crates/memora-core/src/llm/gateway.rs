//! Model gateway: retry, backoff, and degraded-reply policy around a
//! [`ChatModel`], gated by the circuit breaker.
//!
//! Rate-limit responses back off exponentially (`2^attempt` seconds) and
//! are always retried up to the attempt budget; other failures pause
//! briefly before retrying. Exhausted retries never surface an error --
//! each failure class yields a distinct apologetic fallback string so
//! the conversational surface stays well-formed.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tracing::{Instrument, error, info_span, warn};

use memora_types::error::{BreakerError, ModelError};
use memora_types::llm::{ChatRequest, ModelEvent};

use super::breaker::CircuitBreaker;
use super::provider::{ChatModel, ModelStream};

/// Attempt budget for a single logical completion.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Pause between non-rate-limited retry attempts.
const RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Fallback shown when the final attempt timed out.
pub const TIMEOUT_FALLBACK: &str =
    "Sorry, the service timed out while answering. Please try again in a moment.";

/// Fallback shown when the attempt budget ran out on rate limits.
pub const UNAVAILABLE_FALLBACK: &str =
    "Sorry, the service is temporarily unavailable. Please try again later.";

/// Fallback embedding the error detail of the final failed attempt.
pub fn failure_fallback(detail: &str) -> String {
    format!("Sorry, I can't reply right now. Error: {detail}")
}

/// Outcome of a gateway completion: always text, plus the error detail
/// when the text is a fallback rather than model output.
#[derive(Debug, Clone)]
pub struct GatewayOutcome {
    pub text: String,
    pub error: Option<String>,
}

impl GatewayOutcome {
    fn ok(text: String) -> Self {
        Self { text, error: None }
    }

    fn degraded(text: String, detail: String) -> Self {
        Self {
            text,
            error: Some(detail),
        }
    }
}

/// Retry/backoff wrapper around a chat model, guarded by a breaker.
pub struct ModelGateway<M> {
    model: M,
    breaker: Arc<CircuitBreaker>,
    max_retries: u32,
}

impl<M: ChatModel> ModelGateway<M> {
    pub fn new(model: M, breaker: Arc<CircuitBreaker>, max_retries: u32) -> Self {
        Self {
            model,
            breaker,
            max_retries,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Run a completion with retries. Never fails: exhausted retries and
    /// an open breaker both collapse into fallback text.
    pub async fn complete(&self, request: &ChatRequest) -> GatewayOutcome {
        for attempt in 0..self.max_retries {
            let last = attempt + 1 == self.max_retries;
            let span = info_span!(
                "gen_ai.complete",
                gen_ai.system = self.model.name(),
                gen_ai.request.model = %request.model,
                gen_ai.request.max_tokens = request.max_tokens,
                gen_ai.request.temperature = ?request.temperature,
                attempt,
            );

            match self
                .breaker
                .call(self.model.complete(request).instrument(span))
                .await
            {
                Ok(text) => return GatewayOutcome::ok(text),
                Err(BreakerError::Open) => {
                    let detail = BreakerError::<ModelError>::Open.to_string();
                    warn!("model call rejected, circuit breaker is open");
                    return GatewayOutcome::degraded(failure_fallback(&detail), detail);
                }
                Err(BreakerError::Inner(ModelError::RateLimited { retry_after_ms })) => {
                    let wait = Duration::from_secs(1u64 << attempt);
                    warn!(
                        attempt = attempt + 1,
                        wait_secs = wait.as_secs(),
                        retry_after_ms,
                        "model endpoint rate limited, backing off"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(BreakerError::Inner(ModelError::Timeout)) => {
                    warn!(attempt = attempt + 1, "model call timed out");
                    if last {
                        return GatewayOutcome::degraded(
                            TIMEOUT_FALLBACK.to_string(),
                            ModelError::Timeout.to_string(),
                        );
                    }
                    tokio::time::sleep(RETRY_PAUSE).await;
                }
                Err(BreakerError::Inner(err)) => {
                    error!(error = %err, attempt = attempt + 1, "model call failed");
                    if last {
                        let detail = err.to_string();
                        return GatewayOutcome::degraded(failure_fallback(&detail), detail);
                    }
                    tokio::time::sleep(RETRY_PAUSE).await;
                }
            }
        }

        GatewayOutcome::degraded(
            UNAVAILABLE_FALLBACK.to_string(),
            "retry budget exhausted".to_string(),
        )
    }

    /// Start a streaming completion through the breaker gate.
    ///
    /// Streams are single-pass and non-restartable, so there is no retry
    /// here; the stream's terminal outcome is recorded against the
    /// breaker once it finishes.
    pub fn stream(&self, request: ChatRequest) -> Result<ModelStream, BreakerError<ModelError>> {
        if !self.breaker.try_acquire() {
            return Err(BreakerError::Open);
        }

        let inner = self.model.stream(request);
        let breaker = Arc::clone(&self.breaker);
        Ok(Box::pin(async_stream::stream! {
            let mut inner = inner;
            let mut failed = false;
            while let Some(event) = inner.next().await {
                let done = matches!(&event, Ok(ModelEvent::Done));
                if event.is_err() {
                    failed = true;
                }
                yield event;
                if failed || done {
                    break;
                }
            }
            if failed {
                breaker.record_failure();
            } else {
                breaker.record_success();
            }
        }))
    }
}
