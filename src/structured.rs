//! HTTP client for the structured-data (SQLite) backend.
//!
//! One read endpoint per table (`/spells`, `/monsters`, `/equipment`,
//! `/rooms`), each filtered by query-string parameters and returning a JSON
//! array of rows.

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::config::SqliteConfig;
use crate::error::{ensure_success, BackendError};
use crate::models::{ExtractedEntities, StructuredEndpoint, StructuredQuery, StructuredRows};
use crate::rag::probe;
use crate::traits::StructuredData;

pub struct StructuredClient {
    client: reqwest::Client,
    base_url: String,
}

impl StructuredClient {
    pub fn new(config: &SqliteConfig) -> Result<Self> {
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
impl StructuredData for StructuredClient {
    async fn fetch(
        &self,
        endpoint: StructuredEndpoint,
        query: &StructuredQuery,
    ) -> Result<StructuredRows, BackendError> {
        let response = self
            .client
            .get(format!("{}/{}", self.base_url, endpoint.path()))
            .query(query)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        parse_rows(endpoint, body)
    }

    async fn healthy(&self) -> bool {
        probe(&self.client, &format!("{}/health", self.base_url)).await
    }
}

/// Decodes an endpoint's body into typed rows.
///
/// Accepts a bare array, or an object wrapping the array under the table
/// name, `results`, or `data`.
pub fn parse_rows(
    endpoint: StructuredEndpoint,
    body: serde_json::Value,
) -> Result<StructuredRows, BackendError> {
    let rows = match body {
        serde_json::Value::Array(rows) => rows,
        serde_json::Value::Object(mut map) => [endpoint.path(), "results", "data"]
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(serde_json::Value::Array(rows)) => Some(rows),
                _ => None,
            })
            .ok_or_else(|| {
                BackendError::Decode(format!("no row array in /{} response", endpoint.path()))
            })?,
        other => {
            return Err(BackendError::Decode(format!(
                "expected an array from /{}, got {}",
                endpoint.path(),
                other
            )))
        }
    };

    Ok(match endpoint {
        StructuredEndpoint::Spells => StructuredRows::Spells(decode(endpoint, rows)),
        StructuredEndpoint::Monsters => StructuredRows::Monsters(decode(endpoint, rows)),
        StructuredEndpoint::Equipment => StructuredRows::Equipment(decode(endpoint, rows)),
        StructuredEndpoint::Rooms => StructuredRows::Rooms(decode(endpoint, rows)),
    })
}

/// Decodes rows one at a time; a malformed row is logged and skipped.
fn decode<T: DeserializeOwned>(
    endpoint: StructuredEndpoint,
    rows: Vec<serde_json::Value>,
) -> Vec<T> {
    rows.into_iter()
        .enumerate()
        .filter_map(|(index, row)| match serde_json::from_value(row) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                tracing::warn!(
                    endpoint = endpoint.path(),
                    index,
                    error = %e,
                    "skipping malformed row"
                );
                None
            }
        })
        .collect()
}

/// Builds the filter set for one endpoint from the extracted entities.
///
/// Exact keys (names, room id, level, CR) are sent when present; free-text
/// search terms fill in when no name or room key narrows the lookup.
pub fn query_for(
    endpoint: StructuredEndpoint,
    entities: &ExtractedEntities,
    region: Option<&str>,
    limit: usize,
) -> StructuredQuery {
    let search = Some(entities.search_terms.clone()).filter(|s| !s.trim().is_empty());
    let mut q = StructuredQuery {
        limit,
        ..Default::default()
    };

    match endpoint {
        StructuredEndpoint::Spells => {
            q.name = entities.spell_name.clone();
            q.level = entities.level;
            if q.name.is_none() {
                q.search = search;
            }
        }
        StructuredEndpoint::Monsters => {
            q.name = entities.monster_name.clone();
            q.cr = entities.cr.clone();
            if q.name.is_none() {
                q.search = search;
            }
        }
        StructuredEndpoint::Equipment => {
            q.search = search;
        }
        StructuredEndpoint::Rooms => {
            q.room_id = entities.room_id.clone();
            q.region = region.map(str::to_string);
            if q.room_id.is_none() && q.region.is_none() {
                q.search = search;
            }
        }
    }

    q
}
