use towebp_core::error::CoreError;

use crate::archive::ArchiveError;

/// Errors returned by [`PipelineHandle`](crate::handle::PipelineHandle).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The coordinator task has stopped (shutdown or panic).
    #[error("Pipeline coordinator is not running")]
    Closed,

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// A blocking archive job panicked or was cancelled.
    #[error("Background job failed: {0}")]
    Join(String),
}
