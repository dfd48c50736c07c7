//! Per-frame vision transforms.
//!
//! A [`FrameFilter`] is a small capability contract: set up scratch state
//! for a negotiated format, then process frames given borrowed views.
//! [`TransformStage`] wraps any filter into a chain [`Element`], owning the
//! negotiated formats, the filter's scratch state, and the output buffer.
//!
//! ```rust
//! use visionpipe::format::{PixelFormatTag, VideoInfo};
//! use visionpipe::vision::{CannyFilter, TransformStage};
//!
//! let mut stage = TransformStage::new(CannyFilter::new());
//! let info = VideoInfo::new(PixelFormatTag::Rgb, 64, 48);
//! stage.negotiate(info, info).unwrap();
//!
//! let input = vec![0u8; info.frame_size()];
//! let mut output = vec![0u8; info.frame_size()];
//! stage.transform_frame(&input, &mut output).unwrap();
//! stage.release();
//! ```
//!
//! [`Element`]: crate::element::Element

mod canny;
mod filter;
mod grayscale;
pub mod imgproc;
mod stage;

pub use canny::{CannyFilter, CannyScratch};
pub use filter::{FrameFilter, NegotiatedFormat};
pub use grayscale::GrayscaleFilter;
pub use imgproc::CannyThresholds;
pub use stage::{StageState, TransformStage};
