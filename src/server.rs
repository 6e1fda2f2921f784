//! HTTP surface of the gateway.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/webhooks/ingestion` | Completion signal from the worker |
//! | `POST` | `/jobs/web` | Submit a web ingestion job (single-flight) |
//! | `POST` | `/jobs/pdf` | Submit a PDF ingestion job |
//! | `GET`  | `/jobs/{id}` | Job status snapshot |
//! | `POST` | `/search` | Semantic search (breaker-guarded) |
//! | `POST` | `/chat` | Intent-classified question answering |
//! | `POST` | `/chat/stream` | Same, replayed as an SSE frame sequence |
//! | `GET`  | `/intents/stats` | Rolling intent aggregate |
//! | `GET`  | `/health` | Health check with breaker state |
//!
//! # Error Contract
//!
//! All error responses use the envelope:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "url must be http(s)" } }
//! ```
//!
//! Codes: `bad_request` (400), `unauthorized` (401), `not_found` (404),
//! `conflict` (409), `unavailable` (503), `internal` (500).

use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::sse::{Event, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio_stream::Stream;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::breaker::BreakerState;
use crate::config::Config;
use crate::db;
use crate::events::EventBus;
use crate::intent::{IntentClassifier, IntentStats, build_filters};
use crate::jobs::{self, Orchestrator, SubmitError};
use crate::migrate;
use crate::models::{TruthLevel, WebhookPayload};
use crate::retrieval::{RetrievalClient, RetrievalError};
use crate::webhook::{CompletionHandler, SIGNATURE_HEADER, verify_signature};
use crate::worker::CommandWorker;

/// Shared application state handed to every route handler.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    retrieval: Arc<RetrievalClient>,
    classifier: Arc<IntentClassifier>,
    intent_stats: Arc<IntentStats>,
    orchestrator: Arc<Orchestrator>,
    completions: Arc<CompletionHandler>,
    pool: sqlx::SqlitePool,
}

/// Starts the gateway server: runs migrations, wires the shared state,
/// spawns the orphan sweeper, and serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;

    let config = Arc::new(config.clone());
    let retrieval = Arc::new(RetrievalClient::new(&config.retrieval)?);
    let events = EventBus::new();
    let completions = Arc::new(CompletionHandler::new(
        pool.clone(),
        config.knowledge.clone(),
        retrieval.clone(),
        events,
    ));
    let worker = Arc::new(CommandWorker::new(&config.worker));
    let orchestrator = Arc::new(Orchestrator::new(
        pool.clone(),
        config.clone(),
        worker,
        retrieval.clone(),
        completions.clone(),
    ));

    jobs::spawn_sweeper(
        pool.clone(),
        Duration::from_secs(config.jobs.sweep_interval_secs),
        config.jobs.orphan_after_secs,
    );

    let state = AppState {
        config: config.clone(),
        retrieval,
        classifier: Arc::new(IntentClassifier::new()?),
        intent_stats: Arc::new(IntentStats::new()),
        orchestrator,
        completions,
        pool,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/webhooks/ingestion", post(handle_webhook))
        .route("/jobs/web", post(handle_submit_web))
        .route("/jobs/pdf", post(handle_submit_pdf))
        .route("/jobs/{id}", get(handle_job_status))
        .route("/search", post(handle_search))
        .route("/chat", post(handle_chat))
        .route("/chat/stream", post(handle_chat_stream))
        .route("/intents/stats", get(handle_intent_stats))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    info!(bind = %config.server.bind, "gateway listening");
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
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

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn conflict(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::CONFLICT,
        code: "conflict",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

fn unavailable(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        code: "unavailable",
        message: message.into(),
    }
}

fn map_retrieval_error(err: RetrievalError) -> AppError {
    match err {
        RetrievalError::Unavailable => unavailable(err.to_string()),
        RetrievalError::Service(_) => internal(err.to_string()),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    breaker: &'static str,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let breaker = match state.retrieval.breaker().state() {
        BreakerState::Closed => "closed",
        BreakerState::Open => "open",
        BreakerState::HalfOpen => "half-open",
    };
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        breaker,
    })
}

// ============ POST /webhooks/ingestion ============

async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    if let Some(secret) = &state.config.server.webhook_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| unauthorized(format!("missing {} header", SIGNATURE_HEADER)))?;
        if !verify_signature(secret, &body, signature) {
            return Err(unauthorized("webhook signature mismatch"));
        }
    }

    let payload: WebhookPayload = serde_json::from_slice(&body)
        .map_err(|e| bad_request(format!("malformed webhook payload: {}", e)))?;
    if payload.job_id.trim().is_empty() {
        return Err(bad_request("job_id must not be empty"));
    }
    if !payload.status.is_terminal() {
        return Err(bad_request("webhook status must be done or failed"));
    }

    let response = state
        .completions
        .handle(&payload, None)
        .await
        .map_err(|e| internal(e.to_string()))?;
    Ok(Json(serde_json::json!({ "result": response })))
}

// ============ POST /jobs/web ============

#[derive(Deserialize)]
struct SubmitWebRequest {
    url: String,
    #[serde(default = "default_web_truth_level")]
    truth_level: TruthLevel,
}

fn default_web_truth_level() -> TruthLevel {
    TruthLevel::L3
}

async fn handle_submit_web(
    State(state): State<AppState>,
    Json(req): Json<SubmitWebRequest>,
) -> Result<Response, AppError> {
    if !req.url.starts_with("http://") && !req.url.starts_with("https://") {
        return Err(bad_request("url must be http(s)"));
    }
    let job = state
        .orchestrator
        .submit_web(&req.url, req.truth_level)
        .await
        .map_err(|e| match e {
            SubmitError::Conflict(msg) => conflict(msg),
            SubmitError::Other(e) => internal(e.to_string()),
        })?;
    Ok((StatusCode::ACCEPTED, Json(job)).into_response())
}

// ============ POST /jobs/pdf ============

#[derive(Deserialize)]
struct SubmitPdfRequest {
    path: PathBuf,
}

async fn handle_submit_pdf(
    State(state): State<AppState>,
    Json(req): Json<SubmitPdfRequest>,
) -> Result<Response, AppError> {
    if req.path.extension().map(|e| e != "pdf").unwrap_or(true) {
        return Err(bad_request("path must point to a .pdf file"));
    }
    let job = state.orchestrator.submit_pdf(&req.path).await.map_err(|e| match e {
        SubmitError::Conflict(msg) => conflict(msg),
        SubmitError::Other(e) => bad_request(e.to_string()),
    })?;
    Ok((StatusCode::ACCEPTED, Json(job)).into_response())
}

// ============ GET /jobs/{id} ============

async fn handle_job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let job = jobs::get_job(&state.pool, &id)
        .await
        .map_err(|e| internal(e.to_string()))?
        .ok_or_else(|| not_found(format!("no job with id {}", id)))?;
    Ok(Json(serde_json::json!({ "result": job })))
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default = "default_search_limit")]
    limit: usize,
}

fn default_search_limit() -> usize {
    10
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let hits = state
        .retrieval
        .semantic_search(&req.query, req.limit)
        .await
        .map_err(map_retrieval_error)?;
    Ok(Json(serde_json::json!({ "result": { "hits": hits } })))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if req.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }
    let classification = state.classifier.classify(&req.message);
    state.intent_stats.record(&classification);
    let filters = build_filters(classification.user_intent);

    let answer = state
        .retrieval
        .answer(&req.message, &filters)
        .await
        .map_err(map_retrieval_error)?;

    Ok(Json(serde_json::json!({
        "result": {
            "intent": classification,
            "filters": filters,
            "answer": answer.answer,
            "sources": answer.sources,
        }
    })))
}

// ============ POST /chat/stream ============

/// Replays the computed answer as an SSE frame sequence: a metadata frame,
/// word-delimited chunk frames, a sources frame, then a terminal done
/// frame. A failure yields a single error frame and ends the stream.
async fn handle_chat_stream(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    if req.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }
    let classification = state.classifier.classify(&req.message);
    state.intent_stats.record(&classification);
    let filters = build_filters(classification.user_intent);

    let mut frames: Vec<Event> = Vec::new();
    match state.retrieval.answer(&req.message, &filters).await {
        Ok(answer) => {
            let metadata = serde_json::json!({
                "intent": classification,
                "filters": filters,
            });
            frames.push(Event::default().event("metadata").data(metadata.to_string()));
            for word in answer.answer.split_whitespace() {
                frames.push(Event::default().event("chunk").data(word));
            }
            let sources = serde_json::json!({ "sources": answer.sources });
            frames.push(Event::default().event("sources").data(sources.to_string()));
            frames.push(Event::default().event("done").data("{}"));
        }
        Err(e) => {
            let error = serde_json::json!({ "message": e.to_string() });
            frames.push(Event::default().event("error").data(error.to_string()));
        }
    }

    let stream = tokio_stream::iter(frames.into_iter().map(Ok::<_, Infallible>));
    Ok(Sse::new(stream))
}

// ============ GET /intents/stats ============

async fn handle_intent_stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "result": state.intent_stats.snapshot() }))
}
