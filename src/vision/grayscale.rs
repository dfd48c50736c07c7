//! Luma extraction filter.

use super::filter::{FrameFilter, NegotiatedFormat};
use super::imgproc::{self, ChannelOrder};
use crate::error::{Error, Result};
use crate::format::{PixelFormatTag, VideoCaps};
use crate::frame::{FrameView, FrameViewMut};

/// Converts packed 8-bit color frames to GRAY8, honoring the input channel order.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrayscaleFilter;

impl GrayscaleFilter {
    /// Create the filter.
    pub fn new() -> Self {
        Self
    }
}

impl FrameFilter for GrayscaleFilter {
    type Scratch = ChannelOrder;

    fn name(&self) -> &str {
        "visiongrayscale"
    }

    fn input_caps(&self) -> VideoCaps {
        use PixelFormatTag::*;
        VideoCaps::formats(&[Rgb, Bgr, Rgbx, Xrgb, Bgrx, Xbgr, Rgba, Argb, Bgra, Abgr])
    }

    fn output_caps(&self) -> VideoCaps {
        VideoCaps::formats(&[PixelFormatTag::Gray8])
    }

    fn on_negotiate(
        &mut self,
        input: &NegotiatedFormat,
        output: &NegotiatedFormat,
    ) -> Result<ChannelOrder> {
        if (output.desc.width(), output.desc.height()) != (input.desc.width(), input.desc.height())
        {
            return Err(Error::rejected(self.name(), "scaling is not supported"));
        }
        ChannelOrder::of(input.info.tag)
            .ok_or_else(|| Error::rejected(self.name(), format!("{} has no color order", input.info.tag)))
    }

    fn on_frame(&self, order: &mut ChannelOrder, input: FrameView<'_>, mut output: FrameViewMut<'_>) {
        imgproc::to_gray(&input, *order, output.as_bytes_mut());
    }
}
