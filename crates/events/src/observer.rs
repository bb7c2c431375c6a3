//! Callback-style observer interface over the [`EventBus`](crate::bus::EventBus).
//!
//! Presentation layers implement [`BatchObserver`] and hand it to
//! [`ObserverBridge::run`] (or [`ObserverBridge::spawn`]). The pipeline
//! itself never calls observers directly; it only publishes events.

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use towebp_core::report::{ProgressSnapshot, ResetReason, TaskSettlement};
use towebp_core::types::{Generation, TaskId};

use crate::bus::BatchEvent;

/// Receives pipeline notifications.
///
/// Only the three core callbacks are required; the others default to no-ops.
pub trait BatchObserver: Send {
    fn on_progress(&mut self, progress: &ProgressSnapshot);

    fn on_task_settled(&mut self, settlement: &TaskSettlement);

    fn on_run_reset(&mut self, generation: Generation, reason: ResetReason);

    /// A render tick flushed these coalesced row updates.
    fn on_rows_updated(&mut self, _rows: &[TaskSettlement]) {}

    fn on_preview(&mut self, _task_id: TaskId, _preview: &[u8]) {}
}

/// Drives a [`BatchObserver`] from a bus subscription.
pub struct ObserverBridge;

impl ObserverBridge {
    /// Dispatch events to `observer` until the bus is dropped.
    ///
    /// A lagging receiver skips the dropped events and keeps going; the next
    /// progress event carries the full aggregate state anyway.
    pub async fn run<O: BatchObserver>(
        mut observer: O,
        mut receiver: broadcast::Receiver<BatchEvent>,
    ) -> O {
        loop {
            match receiver.recv().await {
                Ok(event) => Self::dispatch(&mut observer, &event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Observer lagged, some events were dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!("Event bus closed, observer bridge stopping");
                    break;
                }
            }
        }
        observer
    }

    /// Spawn [`run`](Self::run) on the current runtime.
    pub fn spawn<O>(observer: O, receiver: broadcast::Receiver<BatchEvent>) -> JoinHandle<O>
    where
        O: BatchObserver + 'static,
    {
        tokio::spawn(Self::run(observer, receiver))
    }

    /// Route one event to the matching callback.
    pub fn dispatch<O: BatchObserver + ?Sized>(observer: &mut O, event: &BatchEvent) {
        match event {
            BatchEvent::Progress(progress) => observer.on_progress(progress),
            BatchEvent::TaskSettled(settlement) => observer.on_task_settled(settlement),
            BatchEvent::RunReset { generation, reason } => {
                observer.on_run_reset(*generation, *reason)
            }
            BatchEvent::RowsUpdated { rows, .. } => observer.on_rows_updated(rows),
            BatchEvent::TaskPreview {
                task_id, preview, ..
            } => observer.on_preview(*task_id, preview),
            BatchEvent::BatchAdmitted { .. } => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use towebp_core::format::EncodeParams;
    use towebp_core::report::{SettledOutcome, TaskError};
    use towebp_core::stats::RunStats;

    #[derive(Default)]
    struct Recorder {
        progress: Vec<u64>,
        settled: Vec<TaskId>,
        resets: Vec<(Generation, ResetReason)>,
        rows: usize,
    }

    impl BatchObserver for Recorder {
        fn on_progress(&mut self, progress: &ProgressSnapshot) {
            self.progress.push(progress.stats.completed_count);
        }

        fn on_task_settled(&mut self, settlement: &TaskSettlement) {
            self.settled.push(settlement.task_id);
        }

        fn on_run_reset(&mut self, generation: Generation, reason: ResetReason) {
            self.resets.push((generation, reason));
        }

        fn on_rows_updated(&mut self, rows: &[TaskSettlement]) {
            self.rows += rows.len();
        }
    }

    fn settlement(task_id: TaskId) -> TaskSettlement {
        TaskSettlement {
            task_id,
            submission_index: task_id as usize,
            original_name: format!("{task_id}.png"),
            outcome: SettledOutcome::Failed {
                error: TaskError::Encode("boom".into()),
            },
        }
    }

    #[tokio::test]
    async fn bridge_routes_events_until_bus_closes() {
        let bus = EventBus::default();
        let handle = ObserverBridge::spawn(Recorder::default(), bus.subscribe());

        bus.publish(BatchEvent::TaskSettled(settlement(1)));
        bus.publish(BatchEvent::TaskSettled(settlement(2)));
        bus.publish(BatchEvent::RowsUpdated {
            generation: 0,
            rows: vec![settlement(1), settlement(2)],
        });
        bus.publish(BatchEvent::Progress(ProgressSnapshot {
            generation: 0,
            params: EncodeParams::default(),
            stats: RunStats {
                completed_count: 2,
                ..Default::default()
            },
            session_diff: 0,
            has_prior_run: false,
        }));
        bus.publish(BatchEvent::RunReset {
            generation: 1,
            reason: ResetReason::Reprocess,
        });
        drop(bus);

        let recorder = handle.await.unwrap();
        assert_eq!(recorder.settled, vec![1, 2]);
        assert_eq!(recorder.rows, 2);
        assert_eq!(recorder.progress, vec![2]);
        assert_eq!(recorder.resets, vec![(1, ResetReason::Reprocess)]);
    }

    #[tokio::test]
    async fn lagged_observer_keeps_receiving() {
        let bus = EventBus::new(2);
        let rx = bus.subscribe();

        for id in 0..5 {
            bus.publish(BatchEvent::TaskSettled(settlement(id)));
        }
        drop(bus);

        let recorder = ObserverBridge::run(Recorder::default(), rx).await;
        // Only the newest events survive in a full buffer.
        assert_eq!(recorder.settled, vec![3, 4]);
    }
}
