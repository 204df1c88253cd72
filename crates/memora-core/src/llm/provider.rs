//! ChatModel trait definition.
//!
//! The core abstraction over the remote completion endpoint. Uses RPITIT
//! for `complete` and a boxed stream for `stream` (streams need a
//! nameable type to flow through the gateway wrapper).

use std::pin::Pin;

use futures_util::Stream;

use memora_types::error::ModelError;
use memora_types::llm::{ChatRequest, ModelEvent};

/// A lazy, single-pass sequence of model stream events.
pub type ModelStream =
    Pin<Box<dyn Stream<Item = Result<ModelEvent, ModelError>> + Send + 'static>>;

/// Trait for chat-completion backends.
///
/// Implementations live in memora-infra (e.g., `OpenAiChatModel`).
pub trait ChatModel: Send + Sync {
    /// Human-readable backend name (e.g., "openai_compatible").
    fn name(&self) -> &str;

    /// Send a completion request and receive the full reply text.
    fn complete(
        &self,
        request: &ChatRequest,
    ) -> impl std::future::Future<Output = Result<String, ModelError>> + Send;

    /// Send a streaming completion request. The returned stream is
    /// forward-only and non-restartable.
    fn stream(&self, request: ChatRequest) -> ModelStream;
}
