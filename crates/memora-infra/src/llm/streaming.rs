//! SSE adapter from a chat completions byte stream to [`ModelEvent`]s.
//!
//! The endpoint emits `data:` lines, each carrying one JSON chunk, and
//! terminates the sequence with the literal `[DONE]` sentinel.

use eventsource_stream::Eventsource;
use futures_util::StreamExt;

use memora_core::llm::provider::ModelStream;
use memora_types::error::ModelError;
use memora_types::llm::ModelEvent;

use super::types::WireStreamChunk;

/// End-of-stream sentinel sent by OpenAI-compatible endpoints.
const DONE_SENTINEL: &str = "[DONE]";

/// Map a successful streaming HTTP response into model events.
///
/// Emits `Connected` first, one `TextDelta` per non-empty content
/// fragment, and `Done` when the sentinel arrives or the SSE stream
/// ends.
pub fn map_sse_response(response: reqwest::Response) -> ModelStream {
    Box::pin(async_stream::try_stream! {
        yield ModelEvent::Connected;

        let mut events = response.bytes_stream().eventsource();
        while let Some(event) = events.next().await {
            let event = event.map_err(|err| ModelError::Stream(err.to_string()))?;
            if event.data == DONE_SENTINEL {
                break;
            }
            let chunk: WireStreamChunk = serde_json::from_str(&event.data)
                .map_err(|err| ModelError::Decode(format!("bad stream chunk: {err}")))?;
            for choice in chunk.choices {
                if let Some(text) = choice.delta.content
                    && !text.is_empty()
                {
                    yield ModelEvent::TextDelta { text };
                }
            }
        }

        yield ModelEvent::Done;
    })
}
