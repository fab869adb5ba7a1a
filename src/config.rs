//! TOML configuration parsing.
//!
//! Every backend the router talks to is configured here: the RAG search
//! service, the SQLite structured-data service, the optional SRD reference
//! API, and the hosted LLM. Secrets never live in the file; the LLM API key
//! is read from the environment variable named by `llm.api_key_env`.
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:3000"
//!
//! [rag]
//! url = "http://localhost:8000"
//!
//! [sqlite]
//! url = "http://localhost:8001"
//!
//! [llm]
//! model = "gpt-4o-mini"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub rag: RagConfig,
    pub sqlite: SqliteConfig,
    #[serde(default)]
    pub srd: SrdConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Longest accepted chat message, in characters.
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_message_chars: default_max_message_chars(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}
fn default_max_message_chars() -> usize {
    2000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RagConfig {
    pub url: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_backend_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_top_k() -> usize {
    5
}
fn default_backend_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct SqliteConfig {
    pub url: String,
    /// Maximum rows requested per structured endpoint.
    #[serde(default = "default_row_limit")]
    pub limit: usize,
    #[serde(default = "default_backend_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_row_limit() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct SrdConfig {
    #[serde(default = "default_srd_enabled")]
    pub enabled: bool,
    #[serde(default = "default_srd_url")]
    pub url: String,
    #[serde(default = "default_backend_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SrdConfig {
    fn default() -> Self {
        Self {
            enabled: default_srd_enabled(),
            url: default_srd_url(),
            timeout_secs: default_backend_timeout_secs(),
        }
    }
}

fn default_srd_enabled() -> bool {
    true
}
fn default_srd_url() -> String {
    "https://www.dnd5eapi.co/api".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_api_base")]
    pub api_base: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            api_base: default_llm_api_base(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_llm_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_temperature() -> f32 {
    0.2
}
fn default_llm_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    2
}

impl LlmConfig {
    /// Reads the API key from the configured environment variable.
    ///
    /// Returns `None` when the variable is unset or blank.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }

    pub fn is_configured(&self) -> bool {
        self.api_key().is_some()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContextConfig {
    /// Upper bound on the assembled context block, in characters.
    #[serde(default = "default_context_max_chars")]
    pub max_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_chars: default_context_max_chars(),
        }
    }
}

fn default_context_max_chars() -> usize {
    12_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

fn default_max_requests() -> u32 {
    30
}
fn default_window_secs() -> u64 {
    60
}

/// Non-secret configuration echoed by `/health` and `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub rag_url: String,
    pub sqlite_url: String,
    pub srd_url: Option<String>,
    pub llm_model: String,
    pub llm_configured: bool,
}

impl Config {
    /// Localhost defaults, used by commands that can run without a config file.
    pub fn minimal() -> Self {
        Self {
            server: ServerConfig::default(),
            rag: RagConfig {
                url: "http://127.0.0.1:8000".to_string(),
                top_k: default_top_k(),
                timeout_secs: default_backend_timeout_secs(),
            },
            sqlite: SqliteConfig {
                url: "http://127.0.0.1:8001".to_string(),
                limit: default_row_limit(),
                timeout_secs: default_backend_timeout_secs(),
            },
            srd: SrdConfig::default(),
            llm: LlmConfig::default(),
            context: ContextConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }

    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            rag_url: self.rag.url.clone(),
            sqlite_url: self.sqlite.url.clone(),
            srd_url: self.srd.enabled.then(|| self.srd.url.clone()),
            llm_model: self.llm.model.clone(),
            llm_configured: self.llm.is_configured(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;

    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    for (name, url) in [
        ("rag.url", &config.rag.url),
        ("sqlite.url", &config.sqlite.url),
        ("llm.api_base", &config.llm.api_base),
    ] {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            anyhow::bail!("{} must be an http(s) URL, got '{}'", name, url);
        }
    }

    if config.srd.enabled
        && !config.srd.url.starts_with("http://")
        && !config.srd.url.starts_with("https://")
    {
        anyhow::bail!("srd.url must be an http(s) URL, got '{}'", config.srd.url);
    }

    for (name, secs, enabled) in [
        ("rag.timeout_secs", config.rag.timeout_secs, true),
        ("sqlite.timeout_secs", config.sqlite.timeout_secs, true),
        ("srd.timeout_secs", config.srd.timeout_secs, config.srd.enabled),
        ("llm.timeout_secs", config.llm.timeout_secs, true),
    ] {
        if enabled && secs == 0 {
            anyhow::bail!("{} must be > 0", name);
        }
    }

    if config.rag.top_k == 0 {
        anyhow::bail!("rag.top_k must be > 0");
    }

    if config.sqlite.limit == 0 {
        anyhow::bail!("sqlite.limit must be > 0");
    }

    if config.context.max_chars < 256 {
        anyhow::bail!("context.max_chars must be >= 256");
    }

    if config.server.max_message_chars == 0 {
        anyhow::bail!("server.max_message_chars must be > 0");
    }

    if config.rate_limit.max_requests == 0 || config.rate_limit.window_secs == 0 {
        anyhow::bail!("rate_limit.max_requests and rate_limit.window_secs must be > 0");
    }

    if !(0.0..=2.0).contains(&config.llm.temperature) {
        anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
    }

    Ok(())
}
