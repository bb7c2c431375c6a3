//! Deduplicating, chunked, backpressure-limited ingestion.
//!
//! The controller owns the session archive (every input ever admitted, in
//! submission order) and the list of archived inputs not yet materialised
//! as tasks. The coordinator pulls chunks from it with [`next_chunk`],
//! which never returns more than the queue can take without crossing the
//! backpressure ceiling.
//!
//! [`next_chunk`]: AdmissionController::next_chunk

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use towebp_core::scheduling::admission_allowance;
use towebp_core::task::{DedupKey, SourceFile};

/// Outcome of [`AdmissionController::admit`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Admitted {
    pub admitted: usize,
    pub duplicates: usize,
    /// Sum of the sizes of the admitted inputs.
    pub admitted_bytes: u64,
}

#[derive(Debug, Default)]
pub struct AdmissionController {
    /// Dedup keys seen this session. Survives reprocessing.
    seen: HashSet<DedupKey>,
    archive: Vec<Arc<SourceFile>>,
    /// Archive indices waiting to become tasks, in archive order.
    pending: VecDeque<usize>,
}

impl AdmissionController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter dedup collisions, archive the survivors and mark them pending.
    ///
    /// Duplicates within the same batch are rejected too.
    pub fn admit(&mut self, files: Vec<SourceFile>) -> Admitted {
        let mut outcome = Admitted::default();
        for file in files {
            if !self.seen.insert(file.dedup_key()) {
                tracing::debug!(name = %file.name, size = file.size(), "Duplicate input rejected");
                outcome.duplicates += 1;
                continue;
            }
            outcome.admitted += 1;
            outcome.admitted_bytes += file.size();
            self.pending.push_back(self.archive.len());
            self.archive.push(Arc::new(file));
        }
        outcome
    }

    /// Take the next chunk of `(submission_index, source)` pairs.
    ///
    /// Empty when nothing is pending or the queue is at the ceiling.
    pub fn next_chunk(
        &mut self,
        pool_size: usize,
        queue_depth: usize,
    ) -> Vec<(usize, Arc<SourceFile>)> {
        let allowance = admission_allowance(pool_size, queue_depth).min(self.pending.len());
        self.pending
            .drain(..allowance)
            .filter_map(|index| {
                self.archive
                    .get(index)
                    .map(|source| (index, Arc::clone(source)))
            })
            .collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn archive(&self) -> &[Arc<SourceFile>] {
        &self.archive
    }

    pub fn archive_bytes(&self) -> u64 {
        self.archive.iter().map(|f| f.size()).sum()
    }

    /// Mark the whole archive pending again, in archive order.
    ///
    /// Used by reprocessing; the archive and seen set are untouched.
    pub fn replay_archive(&mut self) {
        self.pending = (0..self.archive.len()).collect();
    }

    /// Forget everything, including the dedup history.
    pub fn clear(&mut self) {
        self.seen.clear();
        self.archive.clear();
        self.pending.clear();
    }
}
