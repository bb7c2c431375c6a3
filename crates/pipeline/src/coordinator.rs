//! The single coordinator task (Run Controller).
//!
//! Owns the admission controller, the scheduler queue, the pool's slot
//! table and the result aggregator. Every mutation of that state happens
//! inside one of this task's handlers, which never await, so a worker
//! message can never be processed in the middle of a lifecycle transition.
//!
//! The loop suspends only on the next command, the next worker message, or
//! the next scheduling tick.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use towebp_codec::{Codec, Encoded};
use towebp_core::format::EncodeParams;
use towebp_core::report::{
    AdmissionReport, CompletedResult, FileRow, ProgressSnapshot, ResetReason, RowStatus,
    RunSnapshot, TaskError, TaskSettlement,
};
use towebp_core::scheduling::{route_for, Route};
use towebp_core::task::{SourceFile, Task};
use towebp_core::types::{Generation, TaskId};
use towebp_events::{BatchEvent, EventBus, RenderBatcher};

use crate::admission::AdmissionController;
use crate::aggregator::ResultAggregator;
use crate::config::PipelineConfig;
use crate::execution::{ExecutionOrigin, ReplySender, WorkerMessage};
use crate::fallback::FallbackExecutor;
use crate::pool::ExecutorPool;
use crate::queue::SchedulerQueue;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Outcome of a settings update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsOutcome {
    /// Parameters were identical; nothing happened.
    Unchanged,
    /// Parameters stored; there was nothing to reprocess.
    Updated,
    /// Parameters stored and a reprocessing pass started.
    Reprocessing { generation: Generation },
}

/// Request sent from a [`PipelineHandle`](crate::handle::PipelineHandle).
pub(crate) enum Command {
    Admit {
        files: Vec<SourceFile>,
        reply: oneshot::Sender<AdmissionReport>,
    },
    Reprocess {
        params: Option<EncodeParams>,
        reply: oneshot::Sender<Generation>,
    },
    UpdateSettings {
        params: EncodeParams,
        reply: oneshot::Sender<SettingsOutcome>,
    },
    Clear {
        reply: oneshot::Sender<Generation>,
    },
    Progress {
        reply: oneshot::Sender<ProgressSnapshot>,
    },
    Snapshot {
        reply: oneshot::Sender<RunSnapshot>,
    },
    Results {
        reply: oneshot::Sender<Vec<CompletedResult>>,
    },
    Output {
        task_id: TaskId,
        reply: oneshot::Sender<Option<CompletedResult>>,
    },
    WaitIdle {
        reply: oneshot::Sender<ProgressSnapshot>,
    },
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

pub(crate) struct Coordinator {
    config: PipelineConfig,
    params: EncodeParams,
    generation: Generation,
    next_task_id: TaskId,

    codec: Arc<dyn Codec>,
    fallback_codec: Arc<dyn Codec>,
    bus: Arc<EventBus>,
    cancel: CancellationToken,
    replies: ReplySender,

    pool: ExecutorPool,
    fallback: FallbackExecutor,
    admission: AdmissionController,
    queue: SchedulerQueue,
    aggregator: ResultAggregator,

    /// `task_id -> submission_index` for every task ever minted. Survives
    /// reprocessing; cleared only by clear-all.
    original_order: HashMap<TaskId, usize>,
    /// `submission_index -> task_id` for the current generation.
    current_tasks: HashMap<usize, TaskId>,

    render: RenderBatcher<TaskSettlement>,
    idle_waiters: Vec<oneshot::Sender<ProgressSnapshot>>,
}

impl Coordinator {
    pub(crate) fn new(
        config: PipelineConfig,
        codec: Arc<dyn Codec>,
        fallback_codec: Arc<dyn Codec>,
        bus: Arc<EventBus>,
        cancel: CancellationToken,
        replies: ReplySender,
    ) -> Self {
        let generation = 0;
        let pool = ExecutorPool::spawn(
            config.pool_size,
            generation,
            Arc::clone(&codec),
            replies.clone(),
            &cancel,
        );
        let fallback = FallbackExecutor::new(
            generation,
            Arc::clone(&fallback_codec),
            config.fallback_concurrency,
            replies.clone(),
            &cancel,
        );

        Self {
            params: config.params,
            render: RenderBatcher::new(config.render_batch_limit),
            config,
            generation,
            next_task_id: 1,
            codec,
            fallback_codec,
            bus,
            cancel,
            replies,
            pool,
            fallback,
            admission: AdmissionController::new(),
            queue: SchedulerQueue::new(),
            aggregator: ResultAggregator::new(),
            original_order: HashMap::new(),
            current_tasks: HashMap::new(),
            idle_waiters: Vec::new(),
        }
    }

    /// Run until cancelled or every handle is dropped.
    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut worker_messages: mpsc::UnboundedReceiver<WorkerMessage>,
    ) {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            pool_size = self.config.pool_size,
            tick_ms = self.config.tick_interval.as_millis() as u64,
            format = %self.params.format,
            quality = self.params.quality,
            "Pipeline coordinator started",
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("Pipeline coordinator shutting down");
                    break;
                }
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        tracing::info!("All pipeline handles dropped, coordinator stopping");
                        break;
                    }
                },
                Some(message) = worker_messages.recv() => self.handle_worker_message(message),
                _ = ticker.tick() => self.on_tick(),
            }
        }

        self.pool.shutdown();
        self.fallback.shutdown();
    }

    // ---- commands ----

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Admit { files, reply } => {
                let report = self.admit(files);
                let _ = reply.send(report);
            }
            Command::Reprocess { params, reply } => {
                if let Some(params) = params {
                    self.params = params;
                }
                self.reprocess();
                let _ = reply.send(self.generation);
            }
            Command::UpdateSettings { params, reply } => {
                let _ = reply.send(self.update_settings(params));
            }
            Command::Clear { reply } => {
                self.clear_all();
                let _ = reply.send(self.generation);
            }
            Command::Progress { reply } => {
                let _ = reply.send(self.progress());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::Results { reply } => {
                let _ = reply.send(self.results_in_order());
            }
            Command::Output { task_id, reply } => {
                let _ = reply.send(self.aggregator.completed_result(task_id).cloned());
            }
            Command::WaitIdle { reply } => {
                self.idle_waiters.push(reply);
                self.notify_if_idle();
            }
        }
    }

    /// Append a batch to the session and start feeding it.
    fn admit(&mut self, files: Vec<SourceFile>) -> AdmissionReport {
        let admitted = self.admission.admit(files);
        self.aggregator
            .record_admitted(admitted.admitted, admitted.admitted_bytes);

        let report = AdmissionReport {
            admitted: admitted.admitted,
            duplicates: admitted.duplicates,
            expected_file_count: self.aggregator.stats().expected_file_count,
        };

        tracing::info!(
            generation = self.generation,
            admitted = report.admitted,
            duplicates = report.duplicates,
            expected = report.expected_file_count,
            "Batch admitted",
        );
        self.bus.publish(BatchEvent::BatchAdmitted {
            generation: self.generation,
            report,
        });

        self.render.mark_dirty();
        self.feed();
        self.notify_if_idle();
        report
    }

    fn update_settings(&mut self, params: EncodeParams) -> SettingsOutcome {
        if params == self.params {
            return SettingsOutcome::Unchanged;
        }
        self.params = params;
        if self.admission.archive().is_empty() {
            self.render.mark_dirty();
            return SettingsOutcome::Updated;
        }
        self.reprocess();
        SettingsOutcome::Reprocessing {
            generation: self.generation,
        }
    }

    // ---- lifecycle transitions ----

    /// Re-run every archived input under the current parameters.
    fn reprocess(&mut self) {
        // Snapshot before anything is torn down.
        self.aggregator.snapshot_prior_and_reset();
        self.rebuild_executors();
        self.queue.clear();
        self.current_tasks.clear();
        self.render.clear();

        self.admission.replay_archive();
        self.aggregator.record_admitted(
            self.admission.archive().len(),
            self.admission.archive_bytes(),
        );

        tracing::info!(
            generation = self.generation,
            files = self.admission.archive().len(),
            format = %self.params.format,
            quality = self.params.quality,
            "Reprocessing archive",
        );
        self.bus.publish(BatchEvent::RunReset {
            generation: self.generation,
            reason: ResetReason::Reprocess,
        });

        self.render.mark_dirty();
        self.feed();
        self.notify_if_idle();
    }

    /// Discard everything, including the archive and dedup history.
    fn clear_all(&mut self) {
        self.aggregator.clear();
        self.rebuild_executors();
        self.queue.clear();
        self.admission.clear();
        self.original_order.clear();
        self.current_tasks.clear();
        self.render.clear();

        tracing::info!(generation = self.generation, "Session cleared");
        self.bus.publish(BatchEvent::RunReset {
            generation: self.generation,
            reason: ResetReason::Clear,
        });

        self.render.mark_dirty();
        self.notify_if_idle();
    }

    /// Tear down the pool and fallback path and start a new generation.
    fn rebuild_executors(&mut self) {
        self.generation += 1;

        let pool = ExecutorPool::spawn(
            self.config.pool_size,
            self.generation,
            Arc::clone(&self.codec),
            self.replies.clone(),
            &self.cancel,
        );
        std::mem::replace(&mut self.pool, pool).shutdown();

        let fallback = FallbackExecutor::new(
            self.generation,
            Arc::clone(&self.fallback_codec),
            self.config.fallback_concurrency,
            self.replies.clone(),
            &self.cancel,
        );
        std::mem::replace(&mut self.fallback, fallback).shutdown();
    }

    // ---- scheduling ----

    /// Materialise the next admissible chunk, then run an assignment pass.
    fn feed(&mut self) {
        // Fallback tasks skip the queue but are just as materialised, so
        // they count against the same ceiling.
        let outstanding = self.queue.len() + self.aggregator.in_flight_on(Route::Fallback);
        let chunk = self.admission.next_chunk(self.pool.size(), outstanding);

        for (submission_index, source) in chunk {
            let task = Task {
                id: self.next_task_id,
                source,
                params: self.params,
                submission_index,
            };
            self.next_task_id += 1;

            self.original_order.insert(task.id, submission_index);
            self.current_tasks.insert(submission_index, task.id);
            self.aggregator.record_materialized();

            match route_for(task.kind()) {
                Route::Pool => self.queue.push(task),
                Route::Fallback => {
                    self.aggregator.begin(task.clone(), Route::Fallback);
                    self.fallback.execute(task);
                }
            }
        }

        // Deepest point of the queue: after the push, before assignment.
        self.aggregator.set_queue_depth(self.queue.len());
        self.schedule();
    }

    /// Greedy assignment of queued tasks to idle slots.
    fn schedule(&mut self) {
        for assignment in self.queue.assign(self.pool.slots_mut()) {
            let slot = assignment.slot;
            let task_id = assignment.task.id;
            self.aggregator.begin(assignment.task.clone(), Route::Pool);

            if let Err(task) = self.pool.dispatch(slot, assignment.task) {
                self.pool.release(slot, task.id);
                let lost = TaskError::WorkerLost(format!("worker {slot} is not accepting tasks"));
                self.record_outcome(task.id, Err(lost));
            } else {
                tracing::debug!(task_id, slot, generation = self.generation, "Task assigned");
            }
        }
        self.aggregator.set_queue_depth(self.queue.len());
    }

    fn on_tick(&mut self) {
        if self.admission.has_pending() {
            self.feed();
        }
        self.flush_render();
    }

    /// Publish at most one batch of row updates and one progress event.
    fn flush_render(&mut self) {
        let rows = self.render.take_batch();
        if !rows.is_empty() {
            self.bus.publish(BatchEvent::RowsUpdated {
                generation: self.generation,
                rows,
            });
        }
        if self.render.take_dirty() {
            self.bus.publish(BatchEvent::Progress(self.progress()));
        }
    }

    // ---- worker messages ----

    fn handle_worker_message(&mut self, message: WorkerMessage) {
        if message.generation() != self.generation {
            tracing::trace!(
                stale = message.generation(),
                current = self.generation,
                "Dropping message from a torn-down run",
            );
            return;
        }

        match message {
            WorkerMessage::Preview {
                task_id, preview, ..
            } => {
                let Some(&submission_index) = self.original_order.get(&task_id) else {
                    tracing::warn!(task_id, "Preview for unknown task ignored");
                    return;
                };
                self.bus.publish(BatchEvent::preview(
                    task_id,
                    submission_index,
                    Arc::from(preview),
                ));
            }
            WorkerMessage::Unsupported {
                slot, task, reason, ..
            } => {
                tracing::debug!(task_id = task.id, slot, reason = %reason, "Worker bounced task to fallback");
                self.pool.release(slot, task.id);
                if self.aggregator.reroute(task.id, Route::Fallback) {
                    self.fallback.execute(task);
                }
                self.feed();
            }
            WorkerMessage::Settled {
                origin,
                task_id,
                outcome,
                ..
            } => {
                // The slot goes idle before the next assignment pass.
                if let ExecutionOrigin::Pool(slot) = origin {
                    self.pool.release(slot, task_id);
                }
                self.record_outcome(task_id, outcome);
                self.feed();
                self.notify_if_idle();
            }
        }
    }

    fn record_outcome(&mut self, task_id: TaskId, outcome: Result<Encoded, TaskError>) {
        let Some(settlement) = self.aggregator.settle(task_id, outcome) else {
            tracing::warn!(task_id, "Result for unknown task ignored");
            return;
        };
        self.bus.publish(BatchEvent::TaskSettled(settlement.clone()));
        self.render.push(settlement);
    }

    // ---- views ----

    fn is_idle(&self) -> bool {
        !self.admission.has_pending()
            && self.queue.is_empty()
            && self.aggregator.in_flight_count() == 0
    }

    fn notify_if_idle(&mut self) {
        if self.idle_waiters.is_empty() || !self.is_idle() {
            return;
        }
        let progress = self.progress();
        for waiter in self.idle_waiters.drain(..) {
            let _ = waiter.send(progress.clone());
        }
    }

    fn progress(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            generation: self.generation,
            params: self.params,
            stats: self.aggregator.stats(),
            session_diff: self.aggregator.session_diff(),
            has_prior_run: self.aggregator.has_prior_run(),
        }
    }

    /// Completed outputs of the current run, in original submission order.
    fn results_in_order(&self) -> Vec<CompletedResult> {
        let mut results: Vec<CompletedResult> = self.aggregator.completed().cloned().collect();
        results.sort_by_key(|r| {
            self.original_order
                .get(&r.task_id)
                .copied()
                .unwrap_or(r.submission_index)
        });
        results
    }

    fn snapshot(&self) -> RunSnapshot {
        let rows = self
            .admission
            .archive()
            .iter()
            .enumerate()
            .map(|(submission_index, source)| FileRow {
                submission_index,
                task_id: self.current_tasks.get(&submission_index).copied(),
                original_name: source.name.clone(),
                original_size: source.size(),
                status: self.row_status(submission_index),
            })
            .collect();

        RunSnapshot {
            progress: self.progress(),
            rows,
        }
    }

    fn row_status(&self, submission_index: usize) -> RowStatus {
        let Some(&task_id) = self.current_tasks.get(&submission_index) else {
            return RowStatus::Waiting;
        };
        if let Some(job) = self.aggregator.in_flight(task_id) {
            return RowStatus::Processing {
                route: job.route.into(),
            };
        }
        if let Some(result) = self.aggregator.completed_result(task_id) {
            return RowStatus::Done {
                output_name: result.output_name.clone(),
                new_size: result.new_size,
                saved_percent: result.saved_percent(),
                diff: result.diff(),
            };
        }
        if let Some(record) = self.aggregator.error(task_id) {
            return RowStatus::Failed {
                error: record.error.clone(),
            };
        }
        RowStatus::Queued
    }
}
