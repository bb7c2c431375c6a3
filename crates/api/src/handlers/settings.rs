//! Handlers for encode settings and reprocessing.

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use towebp_core::format::{EncodeParams, TargetFormat};
use towebp_core::types::Generation;
use towebp_pipeline::SettingsOutcome;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for settings updates and forced reprocessing.
///
/// `format` accepts the short name (`webp`) or the MIME type (`image/webp`).
#[derive(Debug, Deserialize)]
pub struct SettingsRequest {
    pub format: String,
    pub quality: f32,
}

impl SettingsRequest {
    fn into_params(self) -> AppResult<EncodeParams> {
        let format: TargetFormat = self.format.parse()?;
        Ok(EncodeParams::new(format, self.quality)?)
    }
}

#[derive(Debug, Serialize)]
pub struct SettingsResult {
    pub params: EncodeParams,
    pub changed: bool,
    /// Generation of the reprocessing pass, if one was started.
    pub reprocessing: Option<Generation>,
}

#[derive(Debug, Serialize)]
pub struct ReprocessResult {
    pub generation: Generation,
}

/// PUT /api/v1/settings
///
/// Reprocesses only when the parameters changed and inputs exist.
pub async fn update_settings(
    State(state): State<AppState>,
    Json(input): Json<SettingsRequest>,
) -> AppResult<Json<DataResponse<SettingsResult>>> {
    let params = input.into_params()?;
    let outcome = state.pipeline.update_settings(params).await?;

    let (changed, reprocessing) = match outcome {
        SettingsOutcome::Unchanged => (false, None),
        SettingsOutcome::Updated => (true, None),
        SettingsOutcome::Reprocessing { generation } => (true, Some(generation)),
    };

    Ok(Json(DataResponse {
        data: SettingsResult {
            params,
            changed,
            reprocessing,
        },
    }))
}

/// POST /api/v1/reprocess
///
/// An empty body reprocesses with the current parameters.
pub async fn reprocess(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<DataResponse<ReprocessResult>>> {
    let params = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        let input: SettingsRequest = serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {e}")))?;
        Some(input.into_params()?)
    };

    let generation = state.pipeline.reprocess(params).await?;
    Ok(Json(DataResponse {
        data: ReprocessResult { generation },
    }))
}
