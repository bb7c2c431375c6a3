use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use towebp_core::error::CoreError;
use towebp_pipeline::{ArchiveError, PipelineError};

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] and [`PipelineError`] and adds `BadRequest` for
/// malformed request bodies.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `towebp_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The pipeline refused or failed a request.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => classify_core_error(core),

            // --- Pipeline errors ---
            AppError::Pipeline(err) => match err {
                PipelineError::Core(core) => classify_core_error(core),
                PipelineError::Archive(ArchiveError::Empty) => (
                    StatusCode::BAD_REQUEST,
                    "VALIDATION_ERROR",
                    err.to_string(),
                ),
                PipelineError::Closed => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "PIPELINE_UNAVAILABLE",
                    "The conversion pipeline is shutting down".to_string(),
                ),
                other => {
                    tracing::error!(error = %other, "Pipeline error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn classify_core_error(core: &CoreError) -> (StatusCode, &'static str, String) {
    match core {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
    }
}
