//! # visionpipe
//!
//! A real-time RTP video pipeline with a pluggable per-frame vision stage.
//!
//! Encoded RTP/VP8 packets are injected per track, decoded by host-provided
//! stages, converted to a packed pixel layout, run through a frame filter
//! (edge detection by default), re-encoded, and handed back as owned samples.
//!
//! ## Features
//!
//! - **Format negotiation**: pixel-format tags mapped to channel layouts and back
//! - **Borrowed frame views**: filters see frame memory only for the duration of a call
//! - **Bounded queues**: strict byte ceilings with blocking or leaky backpressure
//! - **Atomic assembly**: a chain is either fully linked or nothing is left allocated
//! - **Degrade-by-drop egress**: a slow consumer loses samples, never stalls the chain
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use visionpipe::prelude::*;
//!
//! let mut factory = ElementFactory::new();
//! register_codecs(&mut factory); // rtpjitterbuffer, rtpvp8depay, vp8dec, vp8enc
//!
//! let config = PipelineConfig::reference();
//! let mut chain = ChainBuilder::new(&factory).build("track-1", &config.stages())?;
//! let samples = chain.take_receiver().unwrap();
//! samples.forward(|track, data, len, duration| send_to_peer(track, data, len, duration))?;
//!
//! chain.start()?;
//! chain.ingress().inject(rtp_packet)?;
//! chain.stop()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod buffer;
pub mod converters;
pub mod element;
pub mod elements;
pub mod error;
pub mod format;
pub mod frame;
pub mod metadata;
pub mod negotiation;
pub mod observability;
pub mod pipeline;
pub mod vision;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::buffer::Buffer;
    pub use crate::element::{Element, Output};
    pub use crate::elements::{AppSink, AppSrc, EncodedSample, Queue, SampleReceiver};
    pub use crate::error::{Error, Result};
    pub use crate::format::{Caps, PixelFormatTag, VideoCaps, VideoInfo};
    pub use crate::metadata::Metadata;
    pub use crate::pipeline::{
        ChainBuilder, ElementFactory, PipelineChain, PipelineConfig, PipelineState, StageSpec,
        parse_pipeline,
    };
    pub use crate::vision::{CannyFilter, FrameFilter, GrayscaleFilter, TransformStage};
}

pub use error::{Error, Result};
