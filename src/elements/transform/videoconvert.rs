//! Video format conversion element.
//!
//! Converts raw frames into a format the downstream neighbor accepts
//! (e.g., RGBA camera frames into RGB for the edge filter).

use crate::buffer::Buffer;
use crate::converters::{ColorConvert, is_convertible};
use crate::element::{Element, Output};
use crate::error::{Error, Result};
use crate::format::{Caps, PixelFormatTag, VideoCaps, VideoInfo};
use bytes::BytesMut;

/// Video format conversion element.
///
/// The output format is, in order of preference:
///
/// 1. the format forced with [`with_output_format`](Self::with_output_format)
/// 2. the input format, when downstream accepts it (no conversion)
/// 3. the first convertible format in downstream preference order
///
/// # Example
///
/// ```rust
/// use visionpipe::buffer::Buffer;
/// use visionpipe::element::Element;
/// use visionpipe::elements::VideoConvertElement;
/// use visionpipe::format::{PixelFormatTag, VideoInfo};
/// use visionpipe::metadata::Metadata;
///
/// let mut convert = VideoConvertElement::new().with_output_format(PixelFormatTag::Bgr);
/// let info = VideoInfo::new(PixelFormatTag::Rgb, 1, 1);
/// let out = convert
///     .process(Buffer::new(vec![1u8, 2, 3], Metadata::new().with_video(info)))
///     .unwrap()
///     .into_single()
///     .unwrap();
/// assert_eq!(out.as_bytes(), &[3, 2, 1]);
/// ```
pub struct VideoConvertElement {
    name: String,
    /// Forced output format.
    output_format: Option<PixelFormatTag>,
    /// What the downstream link accepts.
    downstream: VideoCaps,
    /// Cached converter (rebuilt when the input changes).
    converter: Option<ColorConvert>,
    frame_buffer: BytesMut,
}

impl VideoConvertElement {
    /// Create a converter that follows the downstream caps.
    pub fn new() -> Self {
        Self {
            name: "videoconvert".to_string(),
            output_format: None,
            downstream: VideoCaps::any(),
            converter: None,
            frame_buffer: BytesMut::new(),
        }
    }

    /// Set the instance name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Always produce `format`.
    pub fn with_output_format(mut self, format: PixelFormatTag) -> Self {
        self.output_format = Some(format);
        self
    }

    /// Every format this element reads and writes.
    pub fn supported_formats() -> Vec<PixelFormatTag> {
        PixelFormatTag::ALL
            .iter()
            .copied()
            .filter(|t| is_convertible(*t))
            .collect()
    }

    fn choose_output(&self, input: &VideoInfo) -> Result<PixelFormatTag> {
        if let Some(forced) = self.output_format {
            return Ok(forced);
        }
        let accepts = |tag: PixelFormatTag| {
            self.downstream
                .accepts(&VideoInfo::new(tag, input.width, input.height))
        };
        if accepts(input.tag) {
            return Ok(input.tag);
        }
        let candidates: &[PixelFormatTag] = if self.downstream.formats.is_empty() {
            &PixelFormatTag::ALL
        } else {
            &self.downstream.formats
        };
        candidates
            .iter()
            .copied()
            .find(|t| is_convertible(*t) && accepts(*t))
            .ok_or_else(|| {
                Error::rejected(
                    &self.name,
                    format!("no convertible format for {input} accepted downstream"),
                )
            })
    }

    fn ensure_converter(&mut self, input: VideoInfo) -> Result<ColorConvert> {
        if let Some(conv) = self.converter.filter(|c| c.input() == input) {
            return Ok(conv);
        }
        let output = self.choose_output(&input)?;
        let conv = ColorConvert::new(input, output)?;
        tracing::info!(
            element = %self.name,
            "converting {} -> {}",
            input,
            conv.output().tag
        );
        self.converter = Some(conv);
        Ok(conv)
    }
}

impl Default for VideoConvertElement {
    fn default() -> Self {
        Self::new()
    }
}

impl Element for VideoConvertElement {
    fn process(&mut self, buffer: Buffer) -> Result<Output> {
        let Some(info) = buffer.metadata().video else {
            return Err(Error::Element(format!(
                "{}: buffer carries no video info",
                self.name
            )));
        };
        let conv = self.ensure_converter(info)?;
        if conv.output().tag == info.tag {
            return Ok(Output::Single(buffer));
        }

        let mut frame = std::mem::take(&mut self.frame_buffer);
        frame.clear();
        frame.resize(conv.output().frame_size(), 0);
        let result = conv.convert(buffer.as_bytes(), &mut frame);
        let data = frame.split().freeze();
        self.frame_buffer = frame;
        result?;

        let (_, mut metadata) = buffer.into_parts();
        metadata.video = Some(conv.output());
        Ok(Output::Single(Buffer::new(data, metadata)))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn input_caps(&self) -> Caps {
        Caps::raw(&Self::supported_formats())
    }

    fn output_caps(&self) -> Caps {
        match self.output_format {
            Some(tag) => Caps::raw(&[tag]),
            None => Caps::raw(&Self::supported_formats()),
        }
    }

    fn link_downstream(&mut self, caps: &Caps) -> Result<()> {
        if let Some(raw) = caps.as_raw() {
            self.downstream = raw.clone();
            self.converter = None;
        }
        Ok(())
    }

    fn release(&mut self) {
        self.converter = None;
        self.frame_buffer = BytesMut::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;

    fn frame(tag: PixelFormatTag, w: u32, h: u32, fill: u8) -> Buffer {
        let info = VideoInfo::new(tag, w, h);
        Buffer::new(vec![fill; info.frame_size()], Metadata::new().with_video(info))
    }

    #[test]
    fn test_passthrough_when_downstream_accepts_input() {
        let mut convert = VideoConvertElement::new();
        convert
            .link_downstream(&Caps::raw(&[PixelFormatTag::Bgr, PixelFormatTag::Rgb]))
            .unwrap();
        let input = frame(PixelFormatTag::Rgb, 4, 4, 9);
        let data = input.data().clone();
        let out = convert.process(input).unwrap().into_single().unwrap();
        assert_eq!(out.data().as_ptr(), data.as_ptr());
    }

    #[test]
    fn test_follows_downstream_preference() {
        let mut convert = VideoConvertElement::new();
        convert
            .link_downstream(&Caps::raw(&[PixelFormatTag::Rgb]))
            .unwrap();
        let out = convert
            .process(frame(PixelFormatTag::Rgba, 2, 2, 100))
            .unwrap()
            .into_single()
            .unwrap();
        let info = out.metadata().video.unwrap();
        assert_eq!(info.tag, PixelFormatTag::Rgb);
        assert_eq!(out.len(), 12);
        assert!(out.as_bytes().iter().all(|&b| b == 100));
    }

    #[test]
    fn test_no_common_format_is_rejected() {
        let mut convert = VideoConvertElement::new();
        convert
            .link_downstream(&Caps::raw(&[PixelFormatTag::Gray16Le]))
            .unwrap();
        let err = convert
            .process(frame(PixelFormatTag::Rgb, 2, 2, 0))
            .unwrap_err();
        assert!(err.is_negotiation_failure());
    }

    #[test]
    fn test_missing_video_info() {
        let mut convert = VideoConvertElement::new();
        assert!(convert.process(Buffer::new(vec![0u8; 3], Metadata::new())).is_err());
    }
}
