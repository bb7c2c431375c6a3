//! Coalesced render batching.

use std::collections::VecDeque;

/// Row updates flushed per render tick unless configured otherwise.
pub const DEFAULT_RENDER_BATCH_LIMIT: usize = 100;

/// Buffers row updates between render ticks.
///
/// Any number of completions between two ticks collapse into one progress
/// redraw (the dirty flag) and at most `limit` row updates. Rows beyond the
/// limit carry over to the next tick in arrival order.
#[derive(Debug)]
pub struct RenderBatcher<T> {
    pending: VecDeque<T>,
    limit: usize,
    dirty: bool,
}

impl<T> RenderBatcher<T> {
    pub fn new(limit: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            limit: limit.max(1),
            dirty: false,
        }
    }

    /// Queue a row update and mark the aggregate view dirty.
    pub fn push(&mut self, row: T) {
        self.pending.push_back(row);
        self.dirty = true;
    }

    /// Mark the aggregate view dirty without a row update.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Clear the dirty flag, returning whether it was set.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Up to `limit` oldest row updates.
    pub fn take_batch(&mut self) -> Vec<T> {
        let n = self.pending.len().min(self.limit);
        self.pending.drain(..n).collect()
    }

    /// Drop everything buffered, e.g. at run reset.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.dirty = false;
    }
}

impl<T> Default for RenderBatcher<T> {
    fn default() -> Self {
        Self::new(DEFAULT_RENDER_BATCH_LIMIT)
    }
}
