//! RestMemoryStore -- [`MemoryStore`] client for a remote memory service.
//!
//! Endpoint shapes follow the common memory-service REST layout:
//! `POST /search`, `POST /memories`, `GET /memories?user_id=`,
//! `DELETE /memories/{id}`, `DELETE /memories?user_id=`.
//!
//! Some services wrap search results in a `{"results": [...]}` envelope
//! while others return a bare array; both shapes are resolved here, at
//! the adapter boundary, into [`MemoryRecord`]s.

use serde::Deserialize;
use serde_json::json;

use memora_core::store::MemoryStore;
use memora_types::error::StoreError;
use memora_types::llm::ChatMessage;
use memora_types::memory::MemoryRecord;

use crate::config::StoreEndpointConfig;

/// HTTP client for the external memory service.
#[derive(Debug, Clone)]
pub struct RestMemoryStore {
    http: reqwest::Client,
    base_url: String,
}

impl RestMemoryStore {
    pub fn new(config: &StoreEndpointConfig) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(std::time::Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|err| StoreError::Http(format!("failed to build http client: {err}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

/// Search responses arrive either enveloped or as a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireRecords {
    Envelope { results: Vec<MemoryRecord> },
    Flat(Vec<MemoryRecord>),
}

impl WireRecords {
    fn into_records(self) -> Vec<MemoryRecord> {
        match self {
            WireRecords::Envelope { results } => results,
            WireRecords::Flat(records) => records,
        }
    }
}

/// Deletion ack; the count is optional because not every service
/// reports one.
#[derive(Debug, Deserialize)]
struct WireDeleteAck {
    #[serde(default)]
    deleted: Option<u64>,
}

fn map_store_error(err: reqwest::Error) -> StoreError {
    StoreError::Http(err.to_string())
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status.as_u16() == 503 {
        return Err(StoreError::Unavailable);
    }
    Err(StoreError::Http(format!("HTTP {status}: {body}")))
}

async fn decode_records(response: reqwest::Response) -> Result<Vec<MemoryRecord>, StoreError> {
    let wire: WireRecords = response
        .json()
        .await
        .map_err(|err| StoreError::Decode(format!("failed to parse records: {err}")))?;
    Ok(wire.into_records())
}

impl MemoryStore for RestMemoryStore {
    async fn search(
        &self,
        owner_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        let response = self
            .http
            .post(self.url("/search"))
            .json(&json!({ "query": query, "user_id": owner_id, "limit": limit }))
            .send()
            .await
            .map_err(map_store_error)?;
        decode_records(check_status(response).await?).await
    }

    async fn add(
        &self,
        turns: &[ChatMessage],
        owner_id: &str,
        metadata: serde_json::Value,
    ) -> Result<(), StoreError> {
        let response = self
            .http
            .post(self.url("/memories"))
            .json(&json!({ "messages": turns, "user_id": owner_id, "metadata": metadata }))
            .send()
            .await
            .map_err(map_store_error)?;
        check_status(response).await?;
        Ok(())
    }

    async fn get_all(&self, owner_id: &str) -> Result<Vec<MemoryRecord>, StoreError> {
        let response = self
            .http
            .get(self.url("/memories"))
            .query(&[("user_id", owner_id)])
            .send()
            .await
            .map_err(map_store_error)?;
        decode_records(check_status(response).await?).await
    }

    async fn delete(&self, memory_id: &str) -> Result<(), StoreError> {
        let response = self
            .http
            .delete(self.url(&format!("/memories/{memory_id}")))
            .send()
            .await
            .map_err(map_store_error)?;
        check_status(response).await?;
        Ok(())
    }

    async fn delete_all(&self, owner_id: &str) -> Result<u64, StoreError> {
        let response = self
            .http
            .delete(self.url("/memories"))
            .query(&[("user_id", owner_id)])
            .send()
            .await
            .map_err(map_store_error)?;
        let response = check_status(response).await?;
        let ack: WireDeleteAck = response.json().await.unwrap_or(WireDeleteAck { deleted: None });
        Ok(ack.deleted.unwrap_or(0))
    }
}
