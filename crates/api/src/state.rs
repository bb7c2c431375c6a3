use std::sync::Arc;

use towebp_pipeline::PipelineHandle;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything inside is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// The batch conversion pipeline. Its event bus feeds the WebSocket stream.
    pub pipeline: Arc<PipelineHandle>,
}
