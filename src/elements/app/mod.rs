//! Application integration: the two ends of a chain.
//!
//! - [`AppSrc`]: inject encoded buffers from application code
//! - [`AppSink`]: extract finished samples to application code

mod appsink;
mod appsrc;

pub(crate) use appsink::FlushSignal;
pub use appsink::{AppSink, EncodedSample, SampleReceiver};
pub use appsrc::AppSrc;
