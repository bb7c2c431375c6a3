//! Fixed-size executor pool.
//!
//! [`ExecutorPool`] spawns one long-lived tokio task per worker. Each worker
//! owns a capacity-1 inbox, so it can never hold more than the single task
//! its [`WorkerSlot`] says it holds. Workers never touch coordinator state;
//! they only send [`WorkerMessage`]s back.
//!
//! A pool belongs to exactly one run generation. Reprocessing and clearing
//! shut the pool down and spawn a fresh one.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use towebp_codec::{Codec, CodecError};
use towebp_core::scheduling::{idle_slots, WorkerSlot};
use towebp_core::task::Task;
use towebp_core::types::{Generation, SlotIndex, TaskId};

use crate::execution::{execute_blocking, ExecutionOrigin, ReplySender, WorkerMessage};

/// Internal bookkeeping for a single worker.
struct ManagedWorker {
    inbox: mpsc::Sender<Task>,
    task_handle: JoinHandle<()>,
}

/// N parallel workers plus the slot table the coordinator schedules on.
pub struct ExecutorPool {
    generation: Generation,
    slots: Vec<WorkerSlot>,
    workers: Vec<ManagedWorker>,
    /// Pool-wide token, a child of the pipeline's master token.
    cancel: CancellationToken,
}

impl ExecutorPool {
    /// Spawn `size` idle workers for `generation`.
    pub(crate) fn spawn(
        size: usize,
        generation: Generation,
        codec: Arc<dyn Codec>,
        replies: ReplySender,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        let workers = (0..size)
            .map(|slot| {
                let (inbox, rx) = mpsc::channel(1);
                let task_handle = tokio::spawn(run_worker(
                    slot,
                    generation,
                    Arc::clone(&codec),
                    rx,
                    replies.clone(),
                    cancel.clone(),
                ));
                ManagedWorker { inbox, task_handle }
            })
            .collect();

        tracing::info!(generation, pool_size = size, "Executor pool spawned");

        Self {
            generation,
            slots: idle_slots(size),
            workers,
            cancel,
        }
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn slots(&self) -> &[WorkerSlot] {
        &self.slots
    }

    pub(crate) fn slots_mut(&mut self) -> &mut [WorkerSlot] {
        &mut self.slots
    }

    pub fn busy_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_busy()).count()
    }

    /// Hand an assigned task to its worker.
    ///
    /// The slot must already be `Assigned` to `task`. An idle worker always
    /// has room in its inbox; if the worker is gone the task is handed back.
    pub(crate) fn dispatch(&self, slot: SlotIndex, task: Task) -> Result<(), Task> {
        let Some(worker) = self.workers.get(slot) else {
            return Err(task);
        };
        worker.inbox.try_send(task).map_err(|e| match e {
            mpsc::error::TrySendError::Full(task) | mpsc::error::TrySendError::Closed(task) => {
                tracing::warn!(slot, task_id = task.id, "Worker inbox unavailable");
                task
            }
        })
    }

    /// Return a slot to `Idle` if it is running `task_id`.
    pub(crate) fn release(&mut self, slot: SlotIndex, task_id: TaskId) -> bool {
        match self.slots.get_mut(slot) {
            Some(s) => s.release(task_id),
            None => false,
        }
    }

    /// Cancel every worker without waiting for outstanding replies.
    ///
    /// Encodes already running on blocking threads finish in the background;
    /// their replies carry this pool's generation and are dropped.
    pub(crate) fn shutdown(self) {
        self.cancel.cancel();
        for worker in &self.workers {
            worker.task_handle.abort();
        }
        tracing::info!(
            generation = self.generation,
            busy = self.busy_count(),
            "Executor pool torn down"
        );
    }
}

/// Worker loop: wait for a task, run it, report, repeat.
async fn run_worker(
    slot: SlotIndex,
    generation: Generation,
    codec: Arc<dyn Codec>,
    mut inbox: mpsc::Receiver<Task>,
    replies: ReplySender,
    cancel: CancellationToken,
) {
    loop {
        let task = tokio::select! {
            _ = cancel.cancelled() => break,
            task = inbox.recv() => match task {
                Some(task) => task,
                None => break,
            },
        };

        let task_id = task.id;
        tracing::debug!(slot, task_id, generation, "Worker started task");

        let (task, outcome) = tokio::select! {
            _ = cancel.cancelled() => break,
            done = execute_blocking(Arc::clone(&codec), task, generation, replies.clone()) => done,
        };

        let message = match outcome {
            Ok(Ok(encoded)) => WorkerMessage::Settled {
                generation,
                origin: ExecutionOrigin::Pool(slot),
                task_id,
                outcome: Ok(encoded),
            },
            Ok(Err(CodecError::UnsupportedInput(reason))) => WorkerMessage::Unsupported {
                generation,
                slot,
                task,
                reason,
            },
            Ok(Err(e)) => WorkerMessage::Settled {
                generation,
                origin: ExecutionOrigin::Pool(slot),
                task_id,
                outcome: Err(e.into_task_error()),
            },
            Err(lost) => WorkerMessage::Settled {
                generation,
                origin: ExecutionOrigin::Pool(slot),
                task_id,
                outcome: Err(lost),
            },
        };

        if replies.send(message).is_err() {
            break;
        }
    }

    tracing::debug!(slot, generation, "Worker exited");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
