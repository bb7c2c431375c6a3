//! Worker slot state machine, routing, and the pure assignment pass.
//!
//! This module has no async runtime dependency so the scheduling rules can
//! be exercised without spawning real workers. The pipeline crate owns the
//! actual queue and slot table and calls [`try_assign_all`] after every
//! queue insertion and every completion.

use std::collections::VecDeque;

use serde::Serialize;

use crate::error::CoreError;
use crate::task::{InputKind, Task};
use crate::types::{SlotIndex, TaskId};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Smallest chunk fed into the queue per admission tick.
pub const MIN_CHUNK_SIZE: usize = 4;

/// Backpressure ceiling as a multiple of the pool size.
pub const BACKPRESSURE_FACTOR: usize = 2;

/// Smallest pool ever created by [`default_pool_size`].
pub const MIN_POOL_SIZE: usize = 2;

// ---------------------------------------------------------------------------
// Sizing rules
// ---------------------------------------------------------------------------

/// Pool size derived from the host's parallelism: one core is left for the
/// coordinator, with a floor of [`MIN_POOL_SIZE`].
pub fn default_pool_size(available_parallelism: usize) -> usize {
    available_parallelism.saturating_sub(1).max(MIN_POOL_SIZE)
}

/// Number of inputs materialised per admission tick: `max(pool_size, 4)`.
pub fn chunk_size(pool_size: usize) -> usize {
    pool_size.max(MIN_CHUNK_SIZE)
}

/// Maximum queue depth before admission pauses: `pool_size * 2`.
pub fn backpressure_ceiling(pool_size: usize) -> usize {
    pool_size * BACKPRESSURE_FACTOR
}

/// How many new tasks may be queued right now without crossing the ceiling.
///
/// Returns 0 when the queue is at or above the ceiling; otherwise the chunk
/// size capped by the remaining headroom.
pub fn admission_allowance(pool_size: usize, queue_depth: usize) -> usize {
    let ceiling = backpressure_ceiling(pool_size);
    if queue_depth >= ceiling {
        return 0;
    }
    chunk_size(pool_size).min(ceiling - queue_depth)
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Where a task executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Pool,
    Fallback,
}

/// Routing decision made up front from the input kind. A pool worker may
/// still bounce a task to the fallback path later.
pub fn route_for(kind: InputKind) -> Route {
    match kind {
        InputKind::Raster => Route::Pool,
        InputKind::Vector => Route::Fallback,
    }
}

// ---------------------------------------------------------------------------
// WorkerSlot state machine
// ---------------------------------------------------------------------------

/// `Idle -> Assigned -> Idle`, forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SlotState {
    Idle,
    Assigned { task_id: TaskId },
}

/// One member of the executor pool as seen by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerSlot {
    pub index: SlotIndex,
    pub state: SlotState,
}

impl WorkerSlot {
    pub fn new(index: SlotIndex) -> Self {
        Self {
            index,
            state: SlotState::Idle,
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.state, SlotState::Assigned { .. })
    }

    pub fn current_task(&self) -> Option<TaskId> {
        match self.state {
            SlotState::Assigned { task_id } => Some(task_id),
            SlotState::Idle => None,
        }
    }

    /// `Idle -> Assigned`. Assigning a busy slot is a conflict.
    pub fn assign(&mut self, task_id: TaskId) -> Result<(), CoreError> {
        if let SlotState::Assigned { task_id: current } = self.state {
            return Err(CoreError::Conflict(format!(
                "Slot {} already runs task {current}, cannot take task {task_id}",
                self.index
            )));
        }
        self.state = SlotState::Assigned { task_id };
        Ok(())
    }

    /// `Assigned -> Idle`, only if the slot is running `task_id`.
    ///
    /// Returns `false` (and leaves the slot untouched) when the slot is idle
    /// or runs a different task.
    pub fn release(&mut self, task_id: TaskId) -> bool {
        if self.current_task() == Some(task_id) {
            self.state = SlotState::Idle;
            true
        } else {
            false
        }
    }
}

/// Build `size` idle slots indexed `0..size`.
pub fn idle_slots(size: usize) -> Vec<WorkerSlot> {
    (0..size).map(WorkerSlot::new).collect()
}

// ---------------------------------------------------------------------------
// Assignment pass
// ---------------------------------------------------------------------------

/// A queued task bound to an idle slot.
#[derive(Debug)]
pub struct Assignment {
    pub slot: SlotIndex,
    pub task: Task,
}

/// Greedy multi-assignment: scan slots `0..N` in order, giving the head of
/// the FIFO to each idle slot, until no idle slot remains or the queue is
/// empty.
///
/// Every returned slot has already been transitioned to `Assigned`.
pub fn try_assign_all(queue: &mut VecDeque<Task>, slots: &mut [WorkerSlot]) -> Vec<Assignment> {
    let mut assignments = Vec::new();
    for slot in slots.iter_mut() {
        if queue.is_empty() {
            break;
        }
        if slot.is_busy() {
            continue;
        }
        if let Some(task) = queue.pop_front() {
            // Cannot conflict: the slot was checked idle above.
            let _ = slot.assign(task.id);
            assignments.push(Assignment {
                slot: slot.index,
                task,
            });
        }
    }
    assignments
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
