//! Fallback execution path for inputs the pool cannot handle.
//!
//! Fallback runs are fire-and-forget relative to the scheduling loop and
//! never occupy a [`WorkerSlot`](towebp_core::scheduling::WorkerSlot).
//! Their concurrency is capped by a semaphore so a batch dominated by
//! fallback inputs cannot spawn unbounded blocking work.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use towebp_codec::Codec;
use towebp_core::task::Task;
use towebp_core::types::Generation;

use crate::execution::{execute_blocking, ExecutionOrigin, ReplySender, WorkerMessage};

pub struct FallbackExecutor {
    generation: Generation,
    codec: Arc<dyn Codec>,
    permits: Arc<Semaphore>,
    replies: ReplySender,
    cancel: CancellationToken,
}

impl FallbackExecutor {
    pub(crate) fn new(
        generation: Generation,
        codec: Arc<dyn Codec>,
        concurrency: usize,
        replies: ReplySender,
        parent: &CancellationToken,
    ) -> Self {
        Self {
            generation,
            codec,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            replies,
            cancel: parent.child_token(),
        }
    }

    /// Start `task` in the background and return immediately.
    ///
    /// The terminal outcome arrives on the reply channel exactly like a pool
    /// worker's, tagged [`ExecutionOrigin::Fallback`].
    pub(crate) fn execute(&self, task: Task) {
        let generation = self.generation;
        let codec = Arc::clone(&self.codec);
        let permits = Arc::clone(&self.permits);
        let replies = self.replies.clone();
        let cancel = self.cancel.clone();

        tracing::debug!(task_id = task.id, generation, "Task routed to fallback");

        tokio::spawn(async move {
            let _permit = tokio::select! {
                _ = cancel.cancelled() => return,
                permit = permits.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };

            let task_id = task.id;
            let (_, outcome) = tokio::select! {
                _ = cancel.cancelled() => return,
                done = execute_blocking(codec, task, generation, replies.clone()) => done,
            };

            // Unsupported here is terminal: there is nowhere left to route it.
            let outcome = match outcome {
                Ok(result) => result.map_err(|e| e.into_task_error()),
                Err(lost) => Err(lost),
            };

            let _ = replies.send(WorkerMessage::Settled {
                generation,
                origin: ExecutionOrigin::Fallback,
                task_id,
                outcome,
            });
        });
    }

    /// Abandon queued and running fallback executions of this generation.
    pub(crate) fn shutdown(self) {
        self.cancel.cancel();
        self.permits.close();
    }
}
