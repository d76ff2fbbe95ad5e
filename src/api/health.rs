use crate::{api::routes::AppState, observability::MetricsRecorder};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

/// GET /health/live - Liveness probe
#[tracing::instrument(skip(state))]
pub async fn liveness(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.health_checker.liveness().await)
}

/// GET /health/ready - Readiness probe
#[tracing::instrument(skip(state))]
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.health_checker.readiness().await;

    if status.status == "ok" {
        (StatusCode::OK, Json(status))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(status))
    }
}

/// GET /metrics - Prometheus metrics
pub async fn metrics() -> Result<String, StatusCode> {
    MetricsRecorder::export().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
