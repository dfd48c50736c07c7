//! Built-in chain elements.
//!
//! ## Endpoints
//! - [`AppSrc`]: injects encoded buffers from application code
//! - [`AppSink`]: hands finished samples to application code
//!
//! ## Flow
//! - [`Queue`]: bounded queue with backpressure between chain segments
//!
//! ## Transforms
//! - [`Identity`]: passes buffers unchanged, counting them
//! - [`VideoConvertElement`]: converts raw frames between pixel formats
//!
//! The per-frame vision filters live in [`crate::vision`].

pub mod app;
pub mod flow;
mod identity;
pub mod transform;

pub use app::{AppSink, AppSrc, EncodedSample, SampleReceiver};
pub use flow::{LeakyMode, Queue, QueueStats};
pub use identity::{BufferCallback, Identity, IdentityCounters, IdentityStats};
pub use transform::VideoConvertElement;
