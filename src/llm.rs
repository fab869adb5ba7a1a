//! Synthesis backend: an OpenAI-compatible chat-completion client.
//!
//! Sends one `POST {api_base}/chat/completions` per answer with a system
//! instruction and a user message, and returns the first choice's text.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Connection errors → retry
//! - Timeouts → fail immediately with [`SynthesisError::Timeout`]
//! - Backoff: 1s, 2s, 4s (capped at 2^2)

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::SynthesisError;
use crate::traits::Synthesizer;

pub struct OpenAiChat {
    client: reqwest::Client,
    api_base: String,
    model: String,
    api_key: Option<String>,
    api_key_env: String,
    max_tokens: u32,
    temperature: f32,
    timeout_secs: u64,
    max_retries: u32,
}

impl OpenAiChat {
    /// Builds the client. A missing API key is not an error here; it is
    /// reported as [`SynthesisError::NotConfigured`] on first use.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key(),
            api_key_env: config.api_key_env.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }

    fn classify_transport_error(&self, e: reqwest::Error) -> SynthesisError {
        if e.is_timeout() {
            SynthesisError::Timeout(self.timeout_secs)
        } else {
            SynthesisError::Unreachable(e.to_string())
        }
    }
}

#[async_trait]
impl Synthesizer for OpenAiChat {
    async fn complete(&self, system: &str, user: &str) -> Result<String, SynthesisError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| SynthesisError::NotConfigured(self.api_key_env.clone()))?;

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(2));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(format!("{}/chat/completions", self.api_base))
                .bearer_auth(api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| SynthesisError::Malformed(e.to_string()))?;
                        return parse_completion(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = SynthesisError::Api {
                        status: status.as_u16(),
                        body: body_text,
                    };

                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(attempt, status = status.as_u16(), "LLM call failed, retrying");
                        last_err = Some(err);
                        continue;
                    }

                    return Err(err);
                }
                Err(e) if e.is_timeout() => return Err(self.classify_transport_error(e)),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "LLM backend unreachable");
                    last_err = Some(self.classify_transport_error(e));
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| SynthesisError::Unreachable("no attempt was made".to_string())))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn healthy(&self) -> bool {
        let Some(key) = &self.api_key else {
            return false;
        };
        match self
            .client
            .get(format!("{}/models", self.api_base))
            .bearer_auth(key)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "llm health probe failed");
                false
            }
        }
    }
}

/// Extracts `choices[0].message.content` from a chat-completion response.
fn parse_completion(json: &serde_json::Value) -> Result<String, SynthesisError> {
    let content = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| {
            SynthesisError::Malformed("missing choices[0].message.content".to_string())
        })?;

    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(SynthesisError::Malformed("empty completion".to_string()));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_first_choice() {
        let json = json!({
            "choices": [
                { "message": { "role": "assistant", "content": "  Fireball deals 8d6. [S1] " } }
            ]
        });
        assert_eq!(parse_completion(&json).unwrap(), "Fireball deals 8d6. [S1]");
    }

    #[test]
    fn rejects_missing_or_empty_content() {
        assert!(matches!(
            parse_completion(&json!({ "choices": [] })),
            Err(SynthesisError::Malformed(_))
        ));
        assert!(matches!(
            parse_completion(&json!({ "choices": [{ "message": { "content": "   " } }] })),
            Err(SynthesisError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let config = LlmConfig {
            api_key_env: "SRD_CHAT_TEST_KEY_NEVER_SET_987".to_string(),
            ..LlmConfig::default()
        };
        let llm = OpenAiChat::new(&config).unwrap();
        assert!(!llm.is_configured());
        let err = llm.complete("system", "user").await.unwrap_err();
        assert_eq!(err.code(), "llm_not_configured");
        assert!(err.to_string().contains("SRD_CHAT_TEST_KEY_NEVER_SET_987"));
        assert!(!llm.healthy().await);
    }

    /// Serves a reachable root but a `/models` that never answers in time.
    async fn stalled_models_server() -> String {
        use axum::{routing::get, Router};

        let app = Router::new().route("/", get(|| async { "ok" })).route(
            "/models",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn failed_models_request_is_unhealthy() {
        std::env::set_var("SRD_CHAT_TEST_LLM_HEALTH_KEY", "test-key");
        let config = LlmConfig {
            api_base: stalled_models_server().await,
            api_key_env: "SRD_CHAT_TEST_LLM_HEALTH_KEY".to_string(),
            timeout_secs: 1,
            ..LlmConfig::default()
        };
        let llm = OpenAiChat::new(&config).unwrap();
        assert!(llm.is_configured());
        assert!(!llm.healthy().await);
    }
}
