//! Admin HTTP server using Axum
//!
//! `GET /health` is open. Everything under `/admin` needs
//! `Authorization: Bearer <token>` and answers 503 while no token is
//! configured.

use axum::{
    extract::{Path, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{error, info, warn, Level};

use crate::application::{BatchError, BatchRunner, BatchSummary, SignalOutcome};
use crate::domain::TradeSignal;
use crate::evaluation::EvaluationError;
use crate::ports::StoreError;

const SERVICE_NAME: &str = "trade-integrity";

type ApiError = (StatusCode, Json<Value>);

#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<BatchRunner>,
    pub admin_token: Option<Arc<str>>,
    pub start_time: Arc<Instant>,
}

impl AppState {
    pub fn new(runner: Arc<BatchRunner>, admin_token: Option<String>) -> Self {
        Self {
            runner,
            admin_token: admin_token.map(Arc::from),
            start_time: Arc::new(Instant::now()),
        }
    }
}

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "uptime_seconds": state.start_time.elapsed().as_secs(),
        "service": SERVICE_NAME,
        "provider": state.runner.evaluator().provider_name(),
    }))
}

/// Rejects admin requests without the configured bearer token
async fn require_admin_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = state.admin_token.as_deref() else {
        warn!(
            path = %request.uri().path(),
            "Admin request refused: no admin token configured"
        );
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match provided {
        Some(token) if tokens_match(token.trim(), expected) => Ok(next.run(request).await),
        _ => {
            warn!(path = %request.uri().path(), "Admin request with missing or bad token");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

/// Compares without short-circuiting on the first differing byte
fn tokens_match(provided: &str, expected: &str) -> bool {
    let (a, b) = (provided.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn error_response(error: &BatchError) -> ApiError {
    let status = match error {
        BatchError::NotFound(_) | BatchError::Store(StoreError::NotFound(_)) => {
            StatusCode::NOT_FOUND
        }
        BatchError::Store(StoreError::StatusConflict { .. }) => StatusCode::CONFLICT,
        BatchError::Evaluation(EvaluationError::InvalidSignalState { .. }) => StatusCode::CONFLICT,
        BatchError::Evaluation(EvaluationError::InvalidSignal { .. }) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        BatchError::Evaluation(EvaluationError::ProviderUnavailable { .. }) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        BatchError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        error!(error = %error, "Admin request failed");
    }
    (status, Json(json!({ "error": error.to_string() })))
}

/// Run one batch pass and return its tally
async fn run_batch(State(state): State<AppState>) -> Result<Json<BatchSummary>, ApiError> {
    info!("Batch pass requested over HTTP");
    state
        .runner
        .evaluate_all_pending_trades()
        .await
        .map(Json)
        .map_err(|e| error_response(&e))
}

/// Evaluate and apply a single signal
async fn evaluate_trade(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SignalOutcome>, ApiError> {
    state
        .runner
        .evaluate_signal(&id)
        .await
        .map(Json)
        .map_err(|e| error_response(&e))
}

/// Get a stored signal by ID
async fn get_trade(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TradeSignal>, ApiError> {
    let signal = state
        .runner
        .store()
        .get(&id)
        .await
        .map_err(|e| error_response(&BatchError::Store(e)))?;

    signal
        .map(Json)
        .ok_or_else(|| error_response(&BatchError::NotFound(id)))
}

pub fn create_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/admin/trades/evaluate", post(run_batch))
        .route("/admin/trades/{id}/evaluate", post(evaluate_trade))
        .route("/admin/trades/{id}", get(get_trade))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_admin_token,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(admin)
        .layer(
            ServiceBuilder::new().layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                    .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                    .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
            ),
        )
        .with_state(state)
}

pub async fn start_server(bind: &str, state: AppState) -> std::io::Result<()> {
    if state.admin_token.is_none() {
        warn!("No admin token configured, admin routes will answer 503");
    }

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;

    info!("HTTP server listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, stopping HTTP server");
}
