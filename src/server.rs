//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat` | Answer a question (rate limited per client) |
//! | `GET`  | `/health` | Probe every backend and report aggregate status |
//! | `GET`  | `/status` | Liveness, version, and config without probing |
//!
//! # Error Contract
//!
//! Every error response carries a flat envelope:
//!
//! ```json
//! { "error": "bad_request", "message": "message must not be empty" }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `bad_request` | 400 |
//! | `not_found` | 404 |
//! | `rate_limited` | 429 (plus `retryAfter` and a `Retry-After` header) |
//! | `llm_error` | 500 |
//! | `llm_unreachable` | 502 |
//! | `llm_not_configured` | 503 |
//! | `llm_timeout` | 504 |
//!
//! A backend outage is not an error: `/chat` still answers 200 from whatever
//! the remaining backends returned.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser front-ends can
//! call the API directly.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::config::{Config, ConfigSummary};
use crate::error::SynthesisError;
use crate::health::{self, HealthReport};
use crate::models::{ChatRequest, ChatResponse};
use crate::orchestrator::Orchestrator;
use crate::rate_limit::{self, RateLimiter};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    orchestrator: Arc<Orchestrator>,
    started: Instant,
}

/// Starts the server with HTTP clients for every configured backend.
///
/// Binds to `[server].bind` and runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::from_config(config)?;
    let listener = TcpListener::bind(&config.server.bind).await?;
    tracing::info!(
        bind = %config.server.bind,
        rag = %config.rag.url,
        sqlite = %config.sqlite.url,
        llm_model = orchestrator.backends().llm.model_name(),
        llm_configured = orchestrator.backends().llm.is_configured(),
        "srd-chat listening"
    );
    serve(listener, config.clone(), orchestrator).await
}

/// Serves on an already-bound listener with the given orchestrator.
pub async fn serve(
    listener: TcpListener,
    config: Config,
    orchestrator: Orchestrator,
) -> anyhow::Result<()> {
    let app = router(config, orchestrator);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

/// Builds the application router.
pub fn router(config: Config, orchestrator: Orchestrator) -> Router {
    let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));

    let state = AppState {
        config: Arc::new(config),
        orchestrator: Arc::new(orchestrator),
        started: Instant::now(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let chat = Router::new()
        .route("/chat", post(handle_chat))
        .route_layer(middleware::from_fn_with_state(limiter, rate_limit::enforce));

    Router::new()
        .merge(chat)
        .route("/health", get(handle_health))
        .route("/status", get(handle_status))
        .fallback(handle_not_found)
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<SynthesisError> for AppError {
    fn from(err: SynthesisError) -> Self {
        let status = match &err {
            SynthesisError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            SynthesisError::Unreachable(_) => StatusCode::BAD_GATEWAY,
            SynthesisError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            SynthesisError::Api { .. } | SynthesisError::Malformed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        tracing::error!(error = %err, "answer synthesis failed");
        AppError {
            status,
            code: err.code(),
            message: err.to_string(),
        }
    }
}

// ============ POST /chat ============

async fn handle_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(request) = payload.map_err(|e| bad_request(e.body_text()))?;

    let message = request.message.trim();
    if message.is_empty() {
        return Err(bad_request("message must not be empty"));
    }
    let max = state.config.server.max_message_chars;
    if message.chars().count() > max {
        return Err(bad_request(format!(
            "message must be at most {} characters",
            max
        )));
    }

    let response = state
        .orchestrator
        .answer(message, request.context.as_ref())
        .await?;
    Ok(Json(response))
}

// ============ GET /health ============

async fn handle_health(State(state): State<AppState>) -> Json<HealthReport> {
    let report = health::report(
        state.orchestrator.backends(),
        state.config.summary(),
        state.started.elapsed().as_secs(),
    )
    .await;
    Json(report)
}

// ============ GET /status ============

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    version: &'static str,
    config: ConfigSummary,
    uptime: u64,
    timestamp: String,
}

async fn handle_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "running",
        version: env!("CARGO_PKG_VERSION"),
        config: state.config.summary(),
        uptime: state.started.elapsed().as_secs(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

// ============ Fallback ============

async fn handle_not_found(uri: Uri) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: format!("no route for {}", uri.path()),
    }
}
