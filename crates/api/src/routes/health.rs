use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Number of pool workers.
    pub pool_size: usize,
}

/// GET /health -- returns service health and pool size.
///
/// Reports `degraded` when the pipeline coordinator no longer answers.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let pipeline_healthy = state.pipeline.progress().await.is_ok();
    let status = if pipeline_healthy { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        pool_size: state.pipeline.pool_size(),
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
