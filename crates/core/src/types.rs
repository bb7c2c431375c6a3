/// Task ids are minted monotonically per pipeline and never reused, not even
/// across reprocessing passes.
pub type TaskId = u64;

/// Position of a worker in the executor pool (`0..pool_size`).
pub type SlotIndex = usize;

/// Run generation counter. Bumped on every reprocess and every clear so
/// that replies from a torn-down pool can be recognised and dropped.
pub type Generation = u64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
