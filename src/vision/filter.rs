//! The filter capability contract.

use crate::error::Result;
use crate::format::{PixelBufferDescriptor, VideoCaps, VideoInfo};
use crate::frame::{FrameView, FrameViewMut};

/// One side of a negotiated link: the external description and the buffer
/// shape it resolved to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NegotiatedFormat {
    /// External tag and size.
    pub info: VideoInfo,
    /// Internal buffer shape.
    pub desc: PixelBufferDescriptor,
}

/// A per-frame image algorithm.
///
/// The stage calls [`on_negotiate`](FrameFilter::on_negotiate) once per
/// accepted format pair and keeps the returned scratch until the next
/// negotiation or release. [`on_frame`](FrameFilter::on_frame) then runs for
/// every frame with views that live only for that call.
pub trait FrameFilter: Send + 'static {
    /// Working state sized to the negotiated format.
    type Scratch: Send;

    /// Filter name, used for logging and errors.
    fn name(&self) -> &str;

    /// Input formats this filter handles.
    fn input_caps(&self) -> VideoCaps;

    /// Output formats this filter can produce.
    fn output_caps(&self) -> VideoCaps;

    /// Accept or decline a format pair and build scratch state for it.
    ///
    /// Declining is done by returning [`Error::NegotiationRejected`]; the
    /// stage stays unconfigured and the caller may retry with other
    /// candidates. Allocation failures should surface as
    /// [`Error::AllocationFailed`].
    ///
    /// [`Error::NegotiationRejected`]: crate::Error::NegotiationRejected
    /// [`Error::AllocationFailed`]: crate::Error::AllocationFailed
    fn on_negotiate(
        &mut self,
        input: &NegotiatedFormat,
        output: &NegotiatedFormat,
    ) -> Result<Self::Scratch>;

    /// Produce one complete output frame from `input`.
    ///
    /// Must write every byte of `output`.
    fn on_frame(
        &self,
        scratch: &mut Self::Scratch,
        input: FrameView<'_>,
        output: FrameViewMut<'_>,
    );

    /// Give scratch state back. The default just drops it.
    fn on_release(&mut self, scratch: Self::Scratch) {
        drop(scratch);
    }
}
