//! Wire types for the OpenAI-compatible chat completions API.
//!
//! Request/response shapes for both the non-streaming and SSE paths.
//! Kept separate from the client so the stream adapter can share them.

use serde::{Deserialize, Serialize};

use memora_types::llm::{ChatMessage, ChatRequest};

/// Chat completions request body.
#[derive(Debug, Serialize)]
pub struct WireChatRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    pub stream: bool,
}

impl WireChatRequest {
    /// Build the wire body, substituting `default_model` when the
    /// request leaves the model unset.
    pub fn from_request(request: &ChatRequest, default_model: &str, stream: bool) -> Self {
        let model = if request.model.is_empty() {
            default_model.to_string()
        } else {
            request.model.clone()
        };
        Self {
            model,
            messages: request.messages.iter().map(WireMessage::from).collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

impl From<&ChatMessage> for WireMessage {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role.to_string(),
            content: message.content.clone(),
        }
    }
}

/// Non-streaming chat completions response.
#[derive(Debug, Deserialize)]
pub struct WireChatResponse {
    pub choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
pub struct WireChoice {
    pub message: WireResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct WireResponseMessage {
    pub content: Option<String>,
}

/// One SSE data payload of a streaming response.
#[derive(Debug, Deserialize)]
pub struct WireStreamChunk {
    #[serde(default)]
    pub choices: Vec<WireStreamChoice>,
}

#[derive(Debug, Deserialize)]
pub struct WireStreamChoice {
    pub delta: WireDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WireDelta {
    #[serde(default)]
    pub content: Option<String>,
}
