//! Edge-detection filter.

use super::filter::{FrameFilter, NegotiatedFormat};
use super::imgproc::{self, CannyThresholds, ChannelOrder, EdgeWorkspace};
use crate::error::{Error, Result};
use crate::format::{ChannelLayout, PixelFormatTag, VideoCaps};
use crate::frame::{FrameView, FrameViewMut, Plane};

/// Keeps the input pixels that lie on detected edges and blacks out the rest.
///
/// Per frame: luma conversion, 3x3 median smoothing, dual-threshold edge
/// detection (60 / 160 by default), then a masked copy of the input.
///
/// Luma is computed with the first byte of each pixel weighted as blue, the
/// way the reference pipeline always has.
#[derive(Debug, Clone, Default)]
pub struct CannyFilter {
    thresholds: CannyThresholds,
}

/// Scratch state for [`CannyFilter`]: two planes sized to the frame.
#[derive(Debug)]
pub struct CannyScratch {
    gray: Plane,
    edges: Plane,
    workspace: EdgeWorkspace,
}

impl CannyScratch {
    /// Smoothed luma of the last frame.
    pub fn gray(&self) -> &Plane {
        &self.gray
    }

    /// Edge mask of the last frame (255 on edges, 0 elsewhere).
    pub fn edges(&self) -> &Plane {
        &self.edges
    }
}

impl CannyFilter {
    /// Create a filter with the default thresholds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use custom hysteresis thresholds.
    pub fn with_thresholds(mut self, low: i32, high: i32) -> Self {
        self.thresholds = CannyThresholds { low, high };
        self
    }

    /// Current thresholds.
    pub fn thresholds(&self) -> CannyThresholds {
        self.thresholds
    }
}

impl FrameFilter for CannyFilter {
    type Scratch = CannyScratch;

    fn name(&self) -> &str {
        "visioncannyfilter"
    }

    fn input_caps(&self) -> VideoCaps {
        VideoCaps::formats(&[PixelFormatTag::Rgb])
    }

    fn output_caps(&self) -> VideoCaps {
        VideoCaps::formats(&[PixelFormatTag::Rgb])
    }

    fn on_negotiate(
        &mut self,
        input: &NegotiatedFormat,
        output: &NegotiatedFormat,
    ) -> Result<CannyScratch> {
        if input.desc.layout() != ChannelLayout::C3U8 {
            return Err(Error::rejected(
                self.name(),
                format!("needs 3-channel input, got {:?}", input.desc.layout()),
            ));
        }
        if output.desc != input.desc {
            return Err(Error::rejected(
                self.name(),
                format!("output {} must match input {}", output.info, input.info),
            ));
        }

        let (w, h) = (input.desc.width(), input.desc.height());
        let scratch = CannyScratch {
            gray: Plane::new(w, h)?,
            edges: Plane::new(w, h)?,
            workspace: EdgeWorkspace::new(w as usize, h as usize)?,
        };
        tracing::debug!(width = w, height = h, "allocated edge scratch");
        Ok(scratch)
    }

    fn on_frame(
        &self,
        scratch: &mut CannyScratch,
        input: FrameView<'_>,
        mut output: FrameViewMut<'_>,
    ) {
        imgproc::to_gray(&input, ChannelOrder::BGR, scratch.gray.as_mut_slice());
        imgproc::median_blur_3x3(&mut scratch.gray, &mut scratch.workspace);
        imgproc::canny(
            &scratch.gray,
            &mut scratch.edges,
            self.thresholds,
            &mut scratch.workspace,
        );
        imgproc::copy_masked(&input, &scratch.edges, &mut output);
    }

    fn on_release(&mut self, scratch: CannyScratch) {
        let CannyScratch {
            gray,
            edges,
            workspace,
        } = scratch;
        drop(workspace);
        drop(edges);
        drop(gray);
    }
}
