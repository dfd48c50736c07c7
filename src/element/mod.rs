//! Element system for visionpipe chains.
//!
//! An [`Element`] is one processing stage: it receives a [`Buffer`] and
//! returns zero or more buffers as an [`Output`]. Elements are synchronous;
//! the chain's worker threads do the scheduling and the queues between
//! segments provide backpressure.
//!
//! Before data flows, adjacent elements are linked: the assembler intersects
//! the upstream element's [`output_caps`](Element::output_caps) with the
//! downstream element's [`input_caps`](Element::input_caps) and hands the
//! result to both sides.
//!
//! [`Buffer`]: crate::buffer::Buffer

mod traits;

pub use traits::{Element, Output};
