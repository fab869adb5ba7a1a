//! Backend seams used by the orchestrator.
//!
//! Each external collaborator sits behind a trait so the orchestrator can be
//! driven by the HTTP clients in production and by in-memory fakes in tests.
//!
//! ```text
//!                ┌──────────────┐
//!   query ──────▶│ Orchestrator │
//!                └──────┬───────┘
//!      ┌────────────┬───┴────────┬──────────────┐
//!      ▼            ▼            ▼              ▼
//! SemanticSearch StructuredData ReferenceLookup Synthesizer
//!   (rag.rs)    (structured.rs)   (srd.rs)      (llm.rs)
//! ```

use async_trait::async_trait;

use crate::error::{BackendError, SynthesisError};
use crate::models::{
    ReferenceKind, ReferenceRecord, SearchHit, StructuredEndpoint, StructuredQuery,
    StructuredRows,
};

/// Filters forwarded to the semantic-search backend.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct SearchFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.region.is_none() && self.category.is_none()
    }
}

/// Similarity search over the embedded corpus.
#[async_trait]
pub trait SemanticSearch: Send + Sync {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchHit>, BackendError>;

    /// Returns `true` when the backend answers its health probe.
    async fn healthy(&self) -> bool;
}

/// Tabular lookups over spells, monsters, equipment, and rooms.
#[async_trait]
pub trait StructuredData: Send + Sync {
    async fn fetch(
        &self,
        endpoint: StructuredEndpoint,
        query: &StructuredQuery,
    ) -> Result<StructuredRows, BackendError>;

    async fn healthy(&self) -> bool;
}

/// Canonical SRD records. A missing record is `Ok(None)`, never an error.
#[async_trait]
pub trait ReferenceLookup: Send + Sync {
    async fn lookup(
        &self,
        kind: ReferenceKind,
        name: &str,
    ) -> Result<Option<ReferenceRecord>, BackendError>;

    async fn healthy(&self) -> bool;
}

/// The LLM call that turns assembled context into an answer.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Sends a system instruction and a user message, returning the reply text.
    async fn complete(&self, system: &str, user: &str) -> Result<String, SynthesisError>;

    fn model_name(&self) -> &str;

    fn is_configured(&self) -> bool;

    async fn healthy(&self) -> bool;
}
