//! Records the pipeline publishes: per-task settlements, progress
//! snapshots, per-file rows, and admission summaries.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::format::EncodeParams;
use crate::scheduling::Route;
use crate::stats::{saved_percent, RunStats};
use crate::types::{Generation, TaskId};

// ---------------------------------------------------------------------------
// Terminal outcomes
// ---------------------------------------------------------------------------

/// Terminal per-task failure. Recorded, surfaced, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum TaskError {
    /// The input could not be read as an image.
    #[error("Decode failure: {0}")]
    Decode(String),

    /// The codec rejected the parameters or ran out of resources.
    #[error("Encode failure: {0}")]
    Encode(String),

    /// The executor went away before reporting (panic or closed inbox).
    #[error("Worker lost: {0}")]
    WorkerLost(String),
}

/// One successfully converted input. Added once per run, never mutated.
#[derive(Debug, Clone)]
pub struct CompletedResult {
    pub task_id: TaskId,
    pub submission_index: usize,
    pub output_name: String,
    pub output_bytes: Arc<[u8]>,
    pub original_size: u64,
    pub new_size: u64,
    /// Output size of the same output name in the previous run, if any.
    pub prior_size: Option<u64>,
}

impl CompletedResult {
    /// Per-file session diff: `new_size - prior_size`.
    pub fn diff(&self) -> Option<i64> {
        self.prior_size
            .map(|prior| self.new_size as i64 - prior as i64)
    }

    pub fn saved_percent(&self) -> i64 {
        saved_percent(self.original_size, self.new_size)
    }
}

/// What happened to a task, as seen by observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SettledOutcome {
    Completed {
        output_name: String,
        original_size: u64,
        new_size: u64,
        saved_percent: i64,
        /// Bytes gained (+) or lost (-) versus the previous run.
        diff: Option<i64>,
    },
    Failed {
        error: TaskError,
    },
}

/// Emitted exactly once per task when it reaches a terminal outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSettlement {
    pub task_id: TaskId,
    pub submission_index: usize,
    pub original_name: String,
    pub outcome: SettledOutcome,
}

impl TaskSettlement {
    pub fn completed(original_name: impl Into<String>, result: &CompletedResult) -> Self {
        Self {
            task_id: result.task_id,
            submission_index: result.submission_index,
            original_name: original_name.into(),
            outcome: SettledOutcome::Completed {
                output_name: result.output_name.clone(),
                original_size: result.original_size,
                new_size: result.new_size,
                saved_percent: result.saved_percent(),
                diff: result.diff(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, SettledOutcome::Completed { .. })
    }
}

// ---------------------------------------------------------------------------
// Progress and snapshots
// ---------------------------------------------------------------------------

/// Aggregate state republished to observers after changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub generation: Generation,
    pub params: EncodeParams,
    pub stats: RunStats,
    /// Sum of per-file diffs against the previous run.
    pub session_diff: i64,
    /// Whether a previous run's sizes are available for diffing.
    pub has_prior_run: bool,
}

/// Why the run state was reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetReason {
    Reprocess,
    Clear,
}

/// Display status of one archived input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RowStatus {
    /// Admitted but not yet materialised as a task.
    Waiting,
    Queued,
    Processing { route: RouteLabel },
    Done {
        output_name: String,
        new_size: u64,
        saved_percent: i64,
        diff: Option<i64>,
    },
    Failed { error: TaskError },
}

/// Serializable mirror of [`Route`] for rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteLabel {
    Pool,
    Fallback,
}

impl From<Route> for RouteLabel {
    fn from(route: Route) -> Self {
        match route {
            Route::Pool => RouteLabel::Pool,
            Route::Fallback => RouteLabel::Fallback,
        }
    }
}

/// One archived input, in original submission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRow {
    pub submission_index: usize,
    pub task_id: Option<TaskId>,
    pub original_name: String,
    pub original_size: u64,
    #[serde(flatten)]
    pub status: RowStatus,
}

/// Full view of the current run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub progress: ProgressSnapshot,
    pub rows: Vec<FileRow>,
}

/// Result of one ingestion batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionReport {
    /// Inputs accepted and appended to the archive.
    pub admitted: usize,
    /// Inputs rejected because their dedup key was already seen.
    pub duplicates: usize,
    /// Inputs expected in the current run after this batch.
    pub expected_file_count: u64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn result(new_size: u64, prior_size: Option<u64>) -> CompletedResult {
        CompletedResult {
            task_id: 1,
            submission_index: 0,
            output_name: "photo.webp".into(),
            output_bytes: Arc::from(vec![0u8; new_size as usize]),
            original_size: 100,
            new_size,
            prior_size,
        }
    }

    #[test]
    fn diff_against_prior_run() {
        assert_eq!(result(60, Some(40)).diff(), Some(20));
        assert_eq!(result(30, Some(40)).diff(), Some(-10));
        assert_eq!(result(30, None).diff(), None);
    }

    #[test]
    fn settlement_from_completed_result() {
        let settlement = TaskSettlement::completed("photo.png", &result(40, None));
        assert!(settlement.is_success());
        assert_eq!(
            settlement.outcome,
            SettledOutcome::Completed {
                output_name: "photo.webp".into(),
                original_size: 100,
                new_size: 40,
                saved_percent: 60,
                diff: None,
            }
        );
    }

    #[test]
    fn task_error_serializes_with_kind_tag() {
        let json = serde_json::to_value(TaskError::Decode("bad header".into())).unwrap();
        assert_eq!(json["kind"], "decode");
        assert_eq!(json["message"], "bad header");
    }

    #[test]
    fn row_status_flattens_into_row() {
        let row = FileRow {
            submission_index: 2,
            task_id: Some(9),
            original_name: "a.png".into(),
            original_size: 10,
            status: RowStatus::Processing {
                route: RouteLabel::Fallback,
            },
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["status"], "processing");
        assert_eq!(json["route"], "fallback");
        assert_eq!(json["task_id"], 9);
    }
}
