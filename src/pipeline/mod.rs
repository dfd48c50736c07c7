//! Chain construction and execution.
//!
//! - [`config`]: typed stage configuration and [`StageSpec`] lists
//! - [`parser`]: launch descriptions (`appsrc ! queue ! vp8dec threads=16 ! ...`)
//! - [`ElementFactory`]: named stage constructors
//! - [`ChainBuilder`]: all-or-nothing assembly into a [`PipelineChain`]
//! - [`PipelineChain`]: worker threads, lifecycle and ordered teardown
//!
//! # Example
//!
//! ```rust,ignore
//! use visionpipe::pipeline::{ChainBuilder, ElementFactory, parse_pipeline};
//!
//! let mut factory = ElementFactory::new();
//! factory.register("vp8dec", |spec| host::vp8_decoder(spec));
//! // ... jitter buffer, depayloader, encoder
//!
//! let specs = parse_pipeline(
//!     "appsrc ! queue ! vp8dec threads=16 ! queue ! videoconvert ! queue ! visioncannyfilter \
//!      ! videoconvert ! queue ! vp8enc ! appsink sync=false drop=true",
//! )?;
//! let mut chain = ChainBuilder::new(&factory).build("track-1", &specs)?;
//! chain.start()?;
//! ```

mod builder;
mod chain;
pub mod config;
mod factory;
pub mod parser;

pub use builder::{ChainBuilder, build};
pub use chain::{PipelineChain, PipelineState};
pub use config::{PipelineConfig, QueuePlacement, StageSpec, describe};
pub use factory::{ElementConstructor, ElementFactory};
pub use parser::{PropertyValue, parse_pipeline};
