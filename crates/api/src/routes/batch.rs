use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::{batch, downloads, settings};
use crate::state::AppState;

/// Batch control routes, mounted directly under `/api/v1`.
///
/// ```text
/// POST   /files                -> upload_files       (multipart)
/// GET    /batch                -> get_batch
/// DELETE /batch                -> clear_batch
/// GET    /stats                -> get_stats
/// PUT    /settings             -> update_settings
/// POST   /reprocess            -> reprocess
/// GET    /download             -> download_archive
/// GET    /download/{task_id}   -> download_output
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/files", post(batch::upload_files))
        .route("/batch", get(batch::get_batch).delete(batch::clear_batch))
        .route("/stats", get(batch::get_stats))
        .route("/settings", put(settings::update_settings))
        .route("/reprocess", post(settings::reprocess))
        .route("/download", get(downloads::download_archive))
        .route("/download/{task_id}", get(downloads::download_output))
}
