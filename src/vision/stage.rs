//! Transform stage: binds a [`FrameFilter`] into a chain.

use super::filter::{FrameFilter, NegotiatedFormat};
use crate::buffer::Buffer;
use crate::element::{Element, Output};
use crate::error::{Error, Result};
use crate::format::{Caps, VideoCaps, VideoInfo};
use crate::frame::{FrameView, FrameViewMut};
use crate::negotiation;
use bytes::BytesMut;

/// Lifecycle of a [`TransformStage`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageState {
    /// No format agreed; no scratch state.
    Unconfigured,
    /// Format agreed and scratch allocated; no frame seen yet.
    Negotiated,
    /// At least one frame processed with the current format.
    Active,
    /// Scratch and frame buffers released. Terminal.
    Released,
}

/// A chain element running one [`FrameFilter`].
///
/// Owns the negotiated input/output formats, the filter's scratch state and
/// a reusable output frame buffer. Scratch state exists exactly while the
/// stage is `Negotiated` or `Active`.
pub struct TransformStage<F: FrameFilter> {
    name: String,
    filter: F,
    state: StageState,
    formats: Option<(NegotiatedFormat, NegotiatedFormat)>,
    scratch: Option<F::Scratch>,
    frame_buffer: BytesMut,
    downstream: VideoCaps,
    frames: u64,
}

impl<F: FrameFilter> TransformStage<F> {
    /// Wrap `filter` in an unconfigured stage.
    pub fn new(filter: F) -> Self {
        let downstream = filter.output_caps();
        Self {
            name: filter.name().to_string(),
            filter,
            state: StageState::Unconfigured,
            formats: None,
            scratch: None,
            frame_buffer: BytesMut::new(),
            downstream,
            frames: 0,
        }
    }

    /// Set a custom instance name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Current state.
    pub fn state(&self) -> StageState {
        self.state
    }

    /// Negotiated input side.
    pub fn input_format(&self) -> Option<&NegotiatedFormat> {
        self.formats.as_ref().map(|(i, _)| i)
    }

    /// Negotiated output side.
    pub fn output_format(&self) -> Option<&NegotiatedFormat> {
        self.formats.as_ref().map(|(_, o)| o)
    }

    /// The filter's scratch state, present only after negotiation.
    pub fn scratch(&self) -> Option<&F::Scratch> {
        self.scratch.as_ref()
    }

    /// The wrapped filter.
    pub fn filter(&self) -> &F {
        &self.filter
    }

    /// Frames processed since creation.
    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    fn resolve_side(&self, info: &VideoInfo, caps: &VideoCaps, side: &str) -> Result<NegotiatedFormat> {
        if !caps.accepts(info) {
            return Err(Error::rejected(
                &self.name,
                format!("{side} {info} not in {}", Caps::Raw(caps.clone())),
            ));
        }
        let desc = negotiation::resolve(info).map_err(|e| Error::rejected(&self.name, e.to_string()))?;
        Ok(NegotiatedFormat { info: *info, desc })
    }

    /// Agree on one input/output pair.
    ///
    /// Resolves both sides, then asks the filter to set up scratch state. Any
    /// previous scratch is released first. On failure the stage is left
    /// `Unconfigured` with no scratch.
    pub fn negotiate(&mut self, input: VideoInfo, output: VideoInfo) -> Result<()> {
        if self.state == StageState::Released {
            return Err(Error::InvalidState(format!("{} is released", self.name)));
        }
        self.drop_scratch();

        let attempt = self
            .resolve_side(&input, &self.filter.input_caps(), "input")
            .and_then(|i| {
                self.resolve_side(&output, &self.filter.output_caps(), "output")
                    .map(|o| (i, o))
            });
        let (in_fmt, out_fmt) = match attempt {
            Ok(pair) => pair,
            Err(e) => {
                tracing::debug!(stage = %self.name, %input, %output, error = %e, "format declined");
                return Err(e);
            }
        };

        match self.filter.on_negotiate(&in_fmt, &out_fmt) {
            Ok(scratch) => {
                self.scratch = Some(scratch);
                self.formats = Some((in_fmt, out_fmt));
                self.state = StageState::Negotiated;
                tracing::info!(stage = %self.name, %input, %output, "negotiated");
                Ok(())
            }
            Err(e) => {
                tracing::debug!(stage = %self.name, %input, %output, error = %e, "filter declined format");
                Err(match e {
                    Error::UnsupportedFormat(reason) => Error::rejected(&self.name, reason),
                    other => other,
                })
            }
        }
    }

    /// Negotiate for `input`, trying each acceptable output in turn.
    ///
    /// Returns the output description that was accepted.
    pub fn negotiate_input(&mut self, input: VideoInfo) -> Result<VideoInfo> {
        let Some(allowed) = self.filter.output_caps().intersect(&self.downstream) else {
            return Err(Error::rejected(&self.name, "downstream accepts no output format"));
        };

        let mut last = None;
        for proposal in negotiation::output_proposals(&input, &allowed) {
            match self.negotiate(input, proposal) {
                Ok(()) => return Ok(proposal),
                Err(e) if e.is_negotiation_failure() => last = Some(e),
                Err(e) => return Err(e),
            }
        }
        Err(last.unwrap_or_else(|| {
            Error::rejected(&self.name, format!("no output candidate for {input}"))
        }))
    }

    /// Run the filter on one frame.
    ///
    /// `input` and `output` must hold at least one frame of the negotiated
    /// input and output format respectively.
    pub fn transform_frame(&mut self, input: &[u8], output: &mut [u8]) -> Result<()> {
        let (Some((in_fmt, out_fmt)), Some(scratch)) = (self.formats.as_ref(), self.scratch.as_mut())
        else {
            return Err(Error::InvalidState(format!(
                "{} has no negotiated format ({:?})",
                self.name, self.state
            )));
        };
        let in_view = FrameView::new(in_fmt.desc, input)?;
        let out_view = FrameViewMut::new(out_fmt.desc, output)?;
        self.filter.on_frame(scratch, in_view, out_view);

        self.state = StageState::Active;
        self.frames += 1;
        Ok(())
    }

    fn drop_scratch(&mut self) {
        if let Some(scratch) = self.scratch.take() {
            self.filter.on_release(scratch);
            tracing::debug!(stage = %self.name, "scratch released");
        }
        self.formats = None;
        if self.state != StageState::Released {
            self.state = StageState::Unconfigured;
        }
    }

    /// Release scratch state, then the stage's frame buffer. Idempotent.
    pub fn release(&mut self) {
        if self.state == StageState::Released {
            return;
        }
        self.drop_scratch();
        self.frame_buffer = BytesMut::new();
        self.state = StageState::Released;
        tracing::debug!(stage = %self.name, frames = self.frames, "stage released");
    }
}

impl<F: FrameFilter> Element for TransformStage<F> {
    fn process(&mut self, buffer: Buffer) -> Result<Output> {
        let Some(info) = buffer.metadata().video else {
            return Err(Error::Element(format!("{}: buffer carries no video info", self.name)));
        };
        if self.input_format().map(|f| f.info) != Some(info) {
            self.negotiate_input(info)?;
        }
        let Some(out_fmt) = self.output_format().copied() else {
            return Err(Error::InvalidState(format!("{} lost its format", self.name)));
        };

        let mut frame = std::mem::take(&mut self.frame_buffer);
        frame.clear();
        frame.resize(out_fmt.desc.frame_len(), 0);
        let result = self.transform_frame(buffer.as_bytes(), &mut frame);
        let data = frame.split().freeze();
        self.frame_buffer = frame;
        result?;

        let (_, mut metadata) = buffer.into_parts();
        metadata.video = Some(out_fmt.info);
        Ok(Output::Single(Buffer::new(data, metadata)))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn input_caps(&self) -> Caps {
        Caps::Raw(self.filter.input_caps())
    }

    fn output_caps(&self) -> Caps {
        Caps::Raw(self.filter.output_caps())
    }

    fn link_downstream(&mut self, caps: &Caps) -> Result<()> {
        if let Some(raw) = caps.as_raw() {
            self.downstream = raw.clone();
        }
        Ok(())
    }

    fn release(&mut self) {
        TransformStage::release(self);
    }
}

impl<F: FrameFilter> Drop for TransformStage<F> {
    fn drop(&mut self) {
        self.release();
    }
}
