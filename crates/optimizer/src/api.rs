//! HTTP API: health checks, Prometheus metrics, optimization and policy endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use optimizer_lib::{
    health::ComponentStatus, AdaptiveOptimizer, Component, OptimizerError, ScalingPolicy,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

/// Entries returned by the history endpoint when no limit is given
const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub optimizer: Arc<AdaptiveOptimizer>,
}

impl AppState {
    pub fn new(optimizer: Arc<AdaptiveOptimizer>) -> Self {
        Self { optimizer }
    }
}

/// Optimizer error rendered as a JSON response
pub struct ApiError(OptimizerError);

impl From<OptimizerError> for ApiError {
    fn from(err: OptimizerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            OptimizerError::PolicyNotFound(_) => StatusCode::NOT_FOUND,
            OptimizerError::InvalidPolicy(_) => StatusCode::BAD_REQUEST,
            OptimizerError::TransientMetrics(_) | OptimizerError::PredictionUnavailable { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message.into() })),
    )
        .into_response()
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.optimizer.health().health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.optimizer.health().readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn optimization_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.optimizer.get_optimization_metrics().await)
}

async fn baseline(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.optimizer.get_performance_baseline().await)
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

/// Recent entries, or a time range when `from` is given
async fn history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Response, ApiError> {
    let entries = match query.from {
        Some(from) => {
            let to = query.to.unwrap_or_else(Utc::now);
            if from > to {
                return Ok(bad_request("'from' must not be after 'to'"));
            }
            let mut entries = state.optimizer.get_history_range(from, to).await?;
            if let Some(limit) = query.limit {
                let skip = entries.len().saturating_sub(limit);
                entries.drain(..skip);
            }
            entries
        }
        None => {
            state
                .optimizer
                .get_optimization_history(query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
                .await?
        }
    };
    Ok(Json(entries).into_response())
}

#[derive(Debug, Default, Deserialize)]
struct RunRequest {
    component: Option<String>,
}

/// Run an optimization cycle now
async fn run_optimization(
    State(state): State<Arc<AppState>>,
    body: Option<Json<RunRequest>>,
) -> Response {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let component = match request.component.as_deref().map(str::parse::<Component>) {
        None => None,
        Some(Ok(component)) => Some(component),
        Some(Err(e)) => return bad_request(e),
    };

    info!(component = ?component, "Manual optimization requested");
    Json(state.optimizer.manual_optimization(component).await).into_response()
}

async fn list_policies(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.optimizer.list_policies().await)
}

async fn create_policy(
    State(state): State<Arc<AppState>>,
    Json(policy): Json<ScalingPolicy>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.optimizer.create_policy(policy).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_policy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ScalingPolicy>, ApiError> {
    Ok(Json(state.optimizer.get_policy(&id).await?))
}

async fn update_policy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(policy): Json<ScalingPolicy>,
) -> Result<Json<ScalingPolicy>, ApiError> {
    Ok(Json(state.optimizer.update_policy(&id, policy).await?))
}

async fn delete_policy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ScalingPolicy>, ApiError> {
    Ok(Json(state.optimizer.delete_policy(&id).await?))
}

/// Dry-run scaling decision for a policy
async fn scaling_decision(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.optimizer.get_scaling_decision(&id).await?))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/optimization/metrics", get(optimization_metrics))
        .route("/api/v1/optimization/baseline", get(baseline))
        .route("/api/v1/optimization/history", get(history))
        .route("/api/v1/optimization/run", post(run_optimization))
        .route("/api/v1/policies", get(list_policies).post(create_policy))
        .route(
            "/api/v1/policies/:id",
            get(get_policy).put(update_policy).delete(delete_policy),
        )
        .route("/api/v1/policies/:id/decision", get(scaling_decision))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
