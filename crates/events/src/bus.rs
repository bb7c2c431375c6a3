//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the single publish point of the pipeline coordinator.
//! It is shared via `Arc<EventBus>` between the pipeline and any outer
//! surface that wants to observe it (WebSocket stream, CLI progress log).

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use towebp_core::report::{AdmissionReport, ProgressSnapshot, ResetReason, TaskSettlement};
use towebp_core::types::{Generation, TaskId};

// ---------------------------------------------------------------------------
// BatchEvent
// ---------------------------------------------------------------------------

/// Something observable happened in the pipeline.
///
/// Serialized with a `type` tag so WebSocket clients can switch on it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEvent {
    /// Aggregate stats changed. Published at most once per scheduling tick.
    Progress(ProgressSnapshot),

    /// A task reached its terminal outcome. Published exactly once per task.
    TaskSettled(TaskSettlement),

    /// Best-effort preview of a task's input, produced before encoding.
    TaskPreview {
        task_id: TaskId,
        submission_index: usize,
        preview_size: usize,
        #[serde(skip)]
        preview: Arc<[u8]>,
    },

    /// Coalesced row updates flushed on a render tick.
    RowsUpdated {
        generation: Generation,
        rows: Vec<TaskSettlement>,
    },

    /// An ingestion batch was accepted.
    BatchAdmitted {
        generation: Generation,
        report: AdmissionReport,
    },

    /// The run state was wiped; observers should drop per-run state.
    RunReset {
        generation: Generation,
        reason: ResetReason,
    },
}

impl BatchEvent {
    /// Dot-separated event name, e.g. `"task.settled"`, for logs.
    pub fn event_type(&self) -> &'static str {
        match self {
            BatchEvent::Progress(_) => "progress",
            BatchEvent::TaskSettled(_) => "task.settled",
            BatchEvent::TaskPreview { .. } => "task.preview",
            BatchEvent::RowsUpdated { .. } => "rows.updated",
            BatchEvent::BatchAdmitted { .. } => "batch.admitted",
            BatchEvent::RunReset { .. } => "run.reset",
        }
    }

    pub fn preview(task_id: TaskId, submission_index: usize, preview: Arc<[u8]>) -> Self {
        BatchEvent::TaskPreview {
            task_id,
            submission_index,
            preview_size: preview.len(),
            preview,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
pub const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`BatchEvent`].
pub struct EventBus {
    sender: broadcast::Sender<BatchEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: BatchEvent) {
        // A SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
