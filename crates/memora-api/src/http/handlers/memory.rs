//! Memory management endpoints.
//!
//! Thin mappings onto the agent's upward memory surface: search,
//! list-all, delete-one, clear-owner.

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::json;

use memora_types::memory::MemoryRecord;

use crate::http::error::AppError;
use crate::state::AppState;

/// Request body for memory search.
#[derive(Debug, Deserialize)]
pub struct SearchBody {
    pub owner_id: String,
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    10
}

/// POST /api/v1/memories/search -- semantic search over an owner's memories.
pub async fn search_memories(
    State(state): State<AppState>,
    Json(body): Json<SearchBody>,
) -> Result<Json<Vec<MemoryRecord>>, AppError> {
    if body.owner_id.trim().is_empty() {
        return Err(AppError::Validation("owner_id must not be empty".to_string()));
    }
    let records = state
        .agent
        .search_memories(&body.owner_id, &body.query, body.limit)
        .await?;
    Ok(Json(records))
}

/// GET /api/v1/users/{owner_id}/memories -- every memory for an owner.
pub async fn get_all_memories(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
) -> Result<Json<Vec<MemoryRecord>>, AppError> {
    let records = state.agent.get_all_memories(&owner_id).await?;
    Ok(Json(records))
}

/// DELETE /api/v1/memories/{id} -- delete a single memory record.
pub async fn delete_memory(
    State(state): State<AppState>,
    Path(memory_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.agent.delete_memory(&memory_id).await?;
    Ok(Json(json!({ "deleted": true })))
}

/// DELETE /api/v1/users/{owner_id}/memories -- clear an owner entirely.
pub async fn clear_memories(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let deleted = state.agent.clear_user_memories(&owner_id).await?;
    Ok(Json(json!({ "deleted": deleted })))
}
