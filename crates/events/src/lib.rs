//! Event bus and observer plumbing for the conversion pipeline.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`BatchEvent`]: everything the pipeline tells the outside world.
//! - [`BatchObserver`]: callback-style interface for presentation layers,
//!   driven from the bus by [`ObserverBridge`].
//! - [`RenderBatcher`]: coalesces row updates and flushes them at a fixed
//!   per-tick cap.

pub mod bus;
pub mod observer;
pub mod render;

pub use bus::{BatchEvent, EventBus};
pub use observer::{BatchObserver, ObserverBridge};
pub use render::{RenderBatcher, DEFAULT_RENDER_BATCH_LIMIT};
