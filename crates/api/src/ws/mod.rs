//! WebSocket stream of pipeline events.
//!
//! Every connection gets its own subscription to the pipeline's event bus
//! and receives each [`BatchEvent`](towebp_events::BatchEvent) as one JSON
//! text frame.

mod handler;

pub use handler::ws_handler;
