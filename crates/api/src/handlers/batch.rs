//! Handlers for uploading inputs and inspecting or clearing the current run.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use towebp_core::report::{AdmissionReport, ProgressSnapshot, RunSnapshot};
use towebp_core::task::{is_supported_media_type, media_type_for_name, SourceFile};
use towebp_core::types::Generation;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Multipart text field carrying the next file's modification time (ms).
pub const LAST_MODIFIED_FIELD: &str = "last_modified";

/// Typed response for the upload endpoint.
#[derive(Debug, Serialize)]
pub struct UploadReport {
    #[serde(flatten)]
    pub admission: AdmissionReport,
    /// File parts skipped because they are not images.
    pub rejected: usize,
}

/// Typed response for `DELETE /batch`.
#[derive(Debug, Serialize)]
pub struct ClearResult {
    pub generation: Generation,
}

// -- Upload --

/// POST /api/v1/files
///
/// Every file part is one input. A `last_modified` text part applies to the
/// file part that follows it. Non-image parts are counted and skipped.
pub async fn upload_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<UploadReport>>)> {
    let mut files = Vec::new();
    let mut rejected = 0;
    let mut last_modified: Option<i64> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            if field.name() == Some(LAST_MODIFIED_FIELD) {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                let ms = text.trim().parse().map_err(|_| {
                    AppError::BadRequest(format!("Invalid {LAST_MODIFIED_FIELD} value '{text}'"))
                })?;
                last_modified = Some(ms);
            }
            continue;
        };

        let media_type = field
            .content_type()
            .filter(|ct| is_supported_media_type(ct))
            .map(str::to_string)
            .or_else(|| media_type_for_name(&file_name).map(str::to_string));

        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        let modified = last_modified.take().unwrap_or(0);

        match media_type {
            Some(media_type) => {
                files.push(SourceFile::new(file_name, media_type, modified, data.to_vec()));
            }
            None => {
                tracing::debug!(file_name = %file_name, "Skipping non-image upload");
                rejected += 1;
            }
        }
    }

    let received = files.len();
    let admission = state.pipeline.admit(files).await?;
    tracing::info!(
        received,
        rejected,
        admitted = admission.admitted,
        duplicates = admission.duplicates,
        "Upload processed",
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: UploadReport {
                admission,
                rejected,
            },
        }),
    ))
}

// -- Inspect --

/// GET /api/v1/batch
pub async fn get_batch(State(state): State<AppState>) -> AppResult<Json<DataResponse<RunSnapshot>>> {
    let snapshot = state.pipeline.snapshot().await?;
    Ok(Json(DataResponse { data: snapshot }))
}

/// GET /api/v1/stats
pub async fn get_stats(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<ProgressSnapshot>>> {
    let progress = state.pipeline.progress().await?;
    Ok(Json(DataResponse { data: progress }))
}

// -- Clear --

/// DELETE /api/v1/batch
///
/// Tears down the run and forgets every input.
pub async fn clear_batch(State(state): State<AppState>) -> AppResult<Json<DataResponse<ClearResult>>> {
    let generation = state.pipeline.clear().await?;
    Ok(Json(DataResponse {
        data: ClearResult { generation },
    }))
}
