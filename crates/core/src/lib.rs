//! Domain model and pure scheduling rules for the towebp batch converter.
//!
//! Nothing in this crate performs I/O or depends on an async runtime, so
//! the scheduling invariants (slot mutual exclusion, backpressure headroom,
//! stats conservation) are unit-testable in isolation.

pub mod error;
pub mod format;
pub mod report;
pub mod scheduling;
pub mod stats;
pub mod task;
pub mod types;
