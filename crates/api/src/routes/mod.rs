pub mod batch;
pub mod health;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws                          WebSocket event stream
///
/// /files                       upload inputs (POST, multipart)
/// /batch                       run snapshot (GET), clear all (DELETE)
/// /stats                       progress snapshot
/// /settings                    update encode parameters (PUT)
/// /reprocess                   force a reprocessing pass (POST)
/// /download                    zip of all completed outputs
/// /download/{task_id}          one completed output
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .merge(batch::router())
}
