//! Error kinds for backend calls and answer synthesis.
//!
//! Retrieval failures ([`BackendError`]) are always downgraded by the
//! orchestrator to "this backend produced nothing". Synthesis failures
//! ([`SynthesisError`]) are fatal to a chat request and each maps to its own
//! HTTP status in the server.

use thiserror::Error;

/// A failed call to a retrieval backend (RAG, structured data, SRD API).
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Decode(String),
}

/// A failed call to the LLM synthesis backend.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// No API key is available for the LLM.
    #[error("LLM backend is not configured (set {0})")]
    NotConfigured(String),

    #[error("LLM backend is unreachable: {0}")]
    Unreachable(String),

    #[error("LLM request timed out after {0}s")]
    Timeout(u64),

    #[error("LLM backend returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("LLM response was malformed: {0}")]
    Malformed(String),
}

impl SynthesisError {
    /// Machine-readable code used in the HTTP error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            SynthesisError::NotConfigured(_) => "llm_not_configured",
            SynthesisError::Unreachable(_) => "llm_unreachable",
            SynthesisError::Timeout(_) => "llm_timeout",
            SynthesisError::Api { .. } | SynthesisError::Malformed(_) => "llm_error",
        }
    }
}

/// Passes a successful response through; turns any other status into
/// [`BackendError::Status`] carrying the response body.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Status {
        status: status.as_u16(),
        body,
    })
}
