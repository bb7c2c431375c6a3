//! Handlers that serve converted outputs.

use axum::extract::{Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use towebp_core::error::CoreError;
use towebp_core::format::TargetFormat;
use towebp_core::types::TaskId;
use towebp_pipeline::DEFAULT_ARCHIVE_NAME;

use crate::error::AppResult;
use crate::state::AppState;

/// GET /api/v1/download
///
/// Zip of every completed output, in original submission order.
pub async fn download_archive(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let bytes = state.pipeline.export_archive().await?;

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, "application/zip".to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{DEFAULT_ARCHIVE_NAME}\""),
            ),
        ],
        bytes,
    ))
}

/// GET /api/v1/download/{task_id}
pub async fn download_output(
    State(state): State<AppState>,
    Path(task_id): Path<TaskId>,
) -> AppResult<impl IntoResponse> {
    let result = state
        .pipeline
        .result(task_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "ConvertedFile",
            id: task_id,
        })?;

    let content_type = TargetFormat::from_output_name(&result.output_name)
        .map(TargetFormat::mime_type)
        .unwrap_or("application/octet-stream");

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, content_type.to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", result.output_name.replace('"', "")),
            ),
        ],
        result.output_bytes.to_vec(),
    ))
}
