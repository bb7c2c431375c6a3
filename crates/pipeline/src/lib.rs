//! Batch conversion scheduling core.
//!
//! One coordinator task owns all scheduler state (admission, queue, slot
//! table, aggregation) and talks to a fixed pool of workers and a bounded
//! fallback path purely through messages. Outer surfaces drive it through
//! [`PipelineHandle`] and observe it through the
//! [`EventBus`](towebp_events::EventBus).

pub mod admission;
pub mod aggregator;
pub mod archive;
pub mod config;
mod coordinator;
pub mod error;
mod execution;
pub mod fallback;
pub mod handle;
pub mod pool;
pub mod queue;

pub use archive::{build_zip, ArchiveError, DEFAULT_ARCHIVE_NAME};
pub use config::PipelineConfig;
pub use coordinator::SettingsOutcome;
pub use error::PipelineError;
pub use handle::{PipelineBuilder, PipelineHandle};
