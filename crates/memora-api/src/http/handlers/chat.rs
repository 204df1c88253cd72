//! Chat endpoints.
//!
//! - `POST /api/v1/chat` -- whole-response turn
//! - `POST /api/v1/chat/stream` -- SSE streaming turn
//!
//! SSE event types mirror the orchestrator's stream items:
//! - `meta` -- envelope with owner, session, memories used, timestamp
//! - `delta` -- incremental text: `{ "text": "..." }`
//! - `error` -- mid-stream failure: `{ "detail": "..." }`
//! - `done` -- stream complete

use std::convert::Infallible;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;

use memora_types::turn::{StreamItem, TurnReply};

use crate::http::error::AppError;
use crate::state::AppState;

/// Request body for both chat endpoints.
#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub owner_id: String,
    pub message: String,
    /// Existing session to continue; a new one is generated if absent.
    pub session_id: Option<String>,
    /// Free-form metadata persisted with the turn.
    pub metadata: Option<serde_json::Value>,
}

fn validate(body: &ChatBody) -> Result<(), AppError> {
    if body.owner_id.trim().is_empty() {
        return Err(AppError::Validation("owner_id must not be empty".to_string()));
    }
    if body.message.trim().is_empty() {
        return Err(AppError::Validation("message must not be empty".to_string()));
    }
    Ok(())
}

/// POST /api/v1/chat -- one whole-response conversation turn.
pub async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Json<TurnReply>, AppError> {
    validate(&body)?;
    let reply = state
        .agent
        .chat(&body.owner_id, &body.message, body.session_id, body.metadata)
        .await;
    Ok(Json(reply))
}

/// POST /api/v1/chat/stream -- SSE streaming turn.
pub async fn stream_chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    validate(&body)?;
    let turn = state
        .agent
        .chat_stream(&body.owner_id, &body.message, body.session_id, body.metadata)
        .await;

    let mut items = turn.items;
    let sse_stream = async_stream::stream! {
        while let Some(item) = items.next().await {
            let name = match &item {
                StreamItem::Meta { .. } => "meta",
                StreamItem::Delta { .. } => "delta",
                StreamItem::Error { .. } => "error",
                StreamItem::Done => "done",
            };
            let data = serde_json::to_string(&item).unwrap_or_else(|_| "{}".to_string());
            yield Ok::<_, Infallible>(Event::default().event(name).data(data));
        }
    };

    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}
