//! HTTP client for the semantic-search (RAG) backend.
//!
//! The backend is opaque: `POST /search` with `{query, top_k, filters}`
//! returns `{results: [{id, text, score, metadata}]}`.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::RagConfig;
use crate::error::{ensure_success, BackendError};
use crate::models::SearchHit;
use crate::traits::{SearchFilters, SemanticSearch};

pub struct RagClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

impl RagClient {
    pub fn new(config: &RagConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SemanticSearch for RagClient {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchHit>, BackendError> {
        let mut body = serde_json::json!({
            "query": query,
            "top_k": top_k,
        });
        if !filters.is_empty() {
            body["filters"] = serde_json::to_value(filters)
                .map_err(|e| BackendError::Decode(e.to_string()))?;
        }

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&body)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(parsed.results)
    }

    async fn healthy(&self) -> bool {
        probe(&self.client, &format!("{}/health", self.base_url)).await
    }
}

/// `GET url` and report whether it answered 2xx.
pub(crate) async fn probe(client: &reqwest::Client, url: &str) -> bool {
    match client.get(url).send().await {
        Ok(resp) => resp.status().is_success(),
        Err(e) => {
            tracing::debug!(url, error = %e, "health probe failed");
            false
        }
    }
}
