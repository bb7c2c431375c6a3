use std::collections::VecDeque;

use towebp_core::scheduling::{try_assign_all, Assignment, WorkerSlot};
use towebp_core::task::Task;
use towebp_core::types::TaskId;

/// Pending-work FIFO. Mutated only by the coordinator.
#[derive(Debug, Default)]
pub struct SchedulerQueue {
    tasks: VecDeque<Task>,
}

impl SchedulerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: Task) {
        self.tasks.push_back(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, task_id: TaskId) -> bool {
        self.tasks.iter().any(|t| t.id == task_id)
    }

    /// Greedy pass: bind the queue head to every idle slot in slot order.
    pub fn assign(&mut self, slots: &mut [WorkerSlot]) -> Vec<Assignment> {
        try_assign_all(&mut self.tasks, slots)
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }
}
