//! The reply contract shared by pool workers and the fallback executor.
//!
//! Both paths run [`run_codec`] on a blocking thread and report through the
//! same [`WorkerMessage`] channel, so the coordinator's result handling does
//! not care which path produced an outcome.

use std::sync::Arc;

use tokio::sync::mpsc;
use towebp_codec::{Codec, CodecError, Encoded};
use towebp_core::report::TaskError;
use towebp_core::task::Task;
use towebp_core::types::{Generation, SlotIndex, TaskId};

/// Sending half of the coordinator's reply channel.
pub(crate) type ReplySender = mpsc::UnboundedSender<WorkerMessage>;

/// Which execution path produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExecutionOrigin {
    Pool(SlotIndex),
    Fallback,
}

/// Message from an executor to the coordinator.
///
/// Every message carries the generation it was started under; the
/// coordinator drops anything from an older generation.
#[derive(Debug)]
pub(crate) enum WorkerMessage {
    Preview {
        generation: Generation,
        task_id: TaskId,
        preview: Vec<u8>,
    },
    Settled {
        generation: Generation,
        origin: ExecutionOrigin,
        task_id: TaskId,
        outcome: Result<Encoded, TaskError>,
    },
    /// A pool worker cannot execute this input; the task must move to the
    /// fallback path.
    Unsupported {
        generation: Generation,
        slot: SlotIndex,
        task: Task,
        reason: String,
    },
}

impl WorkerMessage {
    pub(crate) fn generation(&self) -> Generation {
        match self {
            WorkerMessage::Preview { generation, .. }
            | WorkerMessage::Settled { generation, .. }
            | WorkerMessage::Unsupported { generation, .. } => *generation,
        }
    }
}

/// Thumbnail then encode one task. Runs on a blocking thread.
///
/// The preview is sent as soon as it exists so observers see it before the
/// encode finishes. Thumbnail failures are ignored.
pub(crate) fn run_codec(
    codec: &dyn Codec,
    task: &Task,
    generation: Generation,
    replies: &ReplySender,
) -> Result<Encoded, CodecError> {
    let input = &task.source.data;

    match codec.thumbnail(input) {
        Ok(preview) => {
            let _ = replies.send(WorkerMessage::Preview {
                generation,
                task_id: task.id,
                preview,
            });
        }
        Err(e) => {
            tracing::debug!(task_id = task.id, error = %e, "Thumbnail skipped");
        }
    }

    codec.encode(input, &task.params)
}

/// Run [`run_codec`] on the blocking pool and flatten a panic into
/// [`TaskError::WorkerLost`].
pub(crate) async fn execute_blocking(
    codec: Arc<dyn Codec>,
    task: Task,
    generation: Generation,
    replies: ReplySender,
) -> (Task, Result<Result<Encoded, CodecError>, TaskError>) {
    let job_task = task.clone();
    let joined = tokio::task::spawn_blocking(move || {
        run_codec(codec.as_ref(), &job_task, generation, &replies)
    })
    .await;

    let outcome = joined.map_err(|e| TaskError::WorkerLost(e.to_string()));
    (task, outcome)
}
