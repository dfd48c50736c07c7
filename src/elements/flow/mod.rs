//! Flow control elements.
//!
//! - [`Queue`]: bounded buffer queue with backpressure, placed between chain
//!   segments

mod queue;

pub use queue::{LeakyMode, Queue, QueueStats};
