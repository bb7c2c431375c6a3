//! Result aggregation: in-flight bookkeeping, completed outputs, error
//! records, running totals and run-over-run diffing.
//!
//! The aggregator is plain data owned by the coordinator; it is only ever
//! invoked from the coordinator's message handlers, so no two writers can
//! touch it at once.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use towebp_codec::Encoded;
use towebp_core::report::{CompletedResult, SettledOutcome, TaskError, TaskSettlement};
use towebp_core::scheduling::Route;
use towebp_core::stats::RunStats;
use towebp_core::task::Task;
use towebp_core::types::{TaskId, Timestamp};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A task outstanding at the pool or the fallback path.
#[derive(Debug, Clone)]
pub struct InFlightJob {
    pub task: Task,
    pub started_at: Timestamp,
    pub route: Route,
}

/// A terminal failure of one task.
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub task_id: TaskId,
    pub submission_index: usize,
    pub original_name: String,
    pub error: TaskError,
}

// ---------------------------------------------------------------------------
// ResultAggregator
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ResultAggregator {
    in_flight: HashMap<TaskId, InFlightJob>,
    completed: HashMap<TaskId, CompletedResult>,
    errors: HashMap<TaskId, ErrorRecord>,
    /// `output_name -> new_size` of the previous run. Read-only during a run.
    prior_run: HashMap<String, u64>,
    stats: RunStats,
    session_diff: i64,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    /// Sum of per-file diffs against the previous run.
    pub fn session_diff(&self) -> i64 {
        self.session_diff
    }

    pub fn has_prior_run(&self) -> bool {
        !self.prior_run.is_empty()
    }

    // ---- counters driven by admission and the queue ----

    /// Inputs accepted into the current run (not yet tasks).
    pub fn record_admitted(&mut self, count: usize, bytes: u64) {
        self.stats.expected_file_count += count as u64;
        self.stats.total_input_bytes_seen += bytes;
    }

    /// A task was materialised; it counts towards the target from now on.
    pub fn record_materialized(&mut self) {
        self.stats.target_file_count += 1;
    }

    pub fn set_queue_depth(&mut self, depth: usize) {
        self.stats.observe_queue_depth(depth);
    }

    // ---- in-flight ----

    /// Start tracking a task handed to an executor.
    pub fn begin(&mut self, task: Task, route: Route) {
        self.in_flight.insert(
            task.id,
            InFlightJob {
                task,
                started_at: Utc::now(),
                route,
            },
        );
        self.stats.in_flight_count = self.in_flight.len() as u64;
    }

    /// Move an in-flight task to another execution path.
    pub fn reroute(&mut self, task_id: TaskId, route: Route) -> bool {
        match self.in_flight.get_mut(&task_id) {
            Some(job) => {
                job.route = route;
                true
            }
            None => false,
        }
    }

    pub fn in_flight(&self, task_id: TaskId) -> Option<&InFlightJob> {
        self.in_flight.get(&task_id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Tasks currently owned by `route`, including ones still waiting to run.
    pub fn in_flight_on(&self, route: Route) -> usize {
        self.in_flight.values().filter(|job| job.route == route).count()
    }

    // ---- settlement ----

    /// Record the terminal outcome of `task_id`.
    ///
    /// Returns `None` when the id is not in flight (already settled or from
    /// a discarded run); the outcome is then ignored.
    pub fn settle(
        &mut self,
        task_id: TaskId,
        outcome: Result<Encoded, TaskError>,
    ) -> Option<TaskSettlement> {
        let job = self.in_flight.remove(&task_id)?;
        self.stats.in_flight_count = self.in_flight.len() as u64;

        let elapsed_ms = (Utc::now() - job.started_at).num_milliseconds();
        let task = job.task;

        let settlement = match outcome {
            Ok(encoded) => {
                let output_name = task.output_name();
                let prior_size = self.prior_run.get(&output_name).copied();
                let result = CompletedResult {
                    task_id,
                    submission_index: task.submission_index,
                    output_name,
                    new_size: encoded.size,
                    output_bytes: Arc::from(encoded.data),
                    original_size: task.original_size(),
                    prior_size,
                };

                self.stats.completed_count += 1;
                self.stats.total_original_bytes_completed += result.original_size;
                self.stats.total_output_bytes_completed += result.new_size;
                if let Some(diff) = result.diff() {
                    self.session_diff += diff;
                }

                tracing::debug!(
                    task_id,
                    original_size = result.original_size,
                    new_size = result.new_size,
                    elapsed_ms,
                    "Task completed",
                );

                let settlement = TaskSettlement::completed(task.original_name(), &result);
                self.completed.insert(task_id, result);
                settlement
            }
            Err(error) => {
                tracing::warn!(task_id, name = %task.original_name(), error = %error, "Task failed");

                self.stats.error_count += 1;
                self.errors.insert(
                    task_id,
                    ErrorRecord {
                        task_id,
                        submission_index: task.submission_index,
                        original_name: task.original_name().to_string(),
                        error: error.clone(),
                    },
                );
                TaskSettlement {
                    task_id,
                    submission_index: task.submission_index,
                    original_name: task.original_name().to_string(),
                    outcome: SettledOutcome::Failed { error },
                }
            }
        };

        Some(settlement)
    }

    pub fn completed_result(&self, task_id: TaskId) -> Option<&CompletedResult> {
        self.completed.get(&task_id)
    }

    pub fn completed(&self) -> impl Iterator<Item = &CompletedResult> {
        self.completed.values()
    }

    pub fn error(&self, task_id: TaskId) -> Option<&ErrorRecord> {
        self.errors.get(&task_id)
    }

    // ---- run lifecycle ----

    /// Snapshot completed sizes into the prior-run index, then reset.
    ///
    /// The previous prior-run index is discarded.
    pub fn snapshot_prior_and_reset(&mut self) {
        self.prior_run = self
            .completed
            .values()
            .map(|r| (r.output_name.clone(), r.new_size))
            .collect();
        self.reset();
    }

    /// Reset everything, including the prior-run index.
    pub fn clear(&mut self) {
        self.prior_run.clear();
        self.reset();
    }

    fn reset(&mut self) {
        self.in_flight.clear();
        self.completed.clear();
        self.errors.clear();
        self.stats = RunStats::default();
        self.session_diff = 0;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
