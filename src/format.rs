//! Media format and capabilities types.
//!
//! Two vocabularies live here:
//!
//! - **External** descriptions as exchanged between stages: [`PixelFormatTag`]
//!   plus a size ([`VideoInfo`]), and link capabilities ([`Caps`]).
//! - **Internal** frame-memory shapes: [`ChannelLayout`] plus a size
//!   ([`PixelBufferDescriptor`]). Several tags share one layout; the tag alone
//!   carries the channel order.
//!
//! Converting between the two is the job of [`crate::negotiation`].

use crate::error::{Error, Result};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// CapsValue - constraint value for negotiation
// ============================================================================

/// A dimension constraint: fixed, an inclusive range, or unconstrained.
///
/// ```rust
/// use visionpipe::format::CapsValue;
///
/// let any: CapsValue<u32> = CapsValue::Any;
/// let range = CapsValue::Range { min: 16, max: 4096 };
/// assert_eq!(any.intersect(&range), Some(range.clone()));
/// assert_eq!(range.intersect(&CapsValue::Fixed(640)), Some(CapsValue::Fixed(640)));
/// assert_eq!(range.intersect(&CapsValue::Fixed(8)), None);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CapsValue<T> {
    /// Exact value.
    Fixed(T),
    /// Inclusive range of acceptable values.
    Range {
        /// Minimum acceptable value.
        min: T,
        /// Maximum acceptable value.
        max: T,
    },
    /// Unconstrained.
    #[default]
    Any,
}

impl<T: Copy + Ord> CapsValue<T> {
    /// Check if a value satisfies this constraint.
    pub fn accepts(&self, value: T) -> bool {
        match *self {
            Self::Fixed(v) => v == value,
            Self::Range { min, max } => value >= min && value <= max,
            Self::Any => true,
        }
    }

    /// Common ground of two constraints, `None` when they don't overlap.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        match (*self, *other) {
            (Self::Any, o) => Some(o),
            (s, Self::Any) => Some(s),
            (Self::Fixed(v), o) | (o, Self::Fixed(v)) => o.accepts(v).then_some(Self::Fixed(v)),
            (Self::Range { min: a, max: b }, Self::Range { min: c, max: d }) => {
                let (lo, hi) = (a.max(c), b.min(d));
                match lo.cmp(&hi) {
                    std::cmp::Ordering::Less => Some(Self::Range { min: lo, max: hi }),
                    std::cmp::Ordering::Equal => Some(Self::Fixed(lo)),
                    std::cmp::Ordering::Greater => None,
                }
            }
        }
    }
}

// ============================================================================
// Pixel formats
// ============================================================================

/// External pixel-format identifier, spelled as on the wire (`"RGB"`, `"GRAY8"`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PixelFormatTag {
    /// 8-bit luma.
    Gray8,
    /// Packed 24-bit R, G, B.
    Rgb,
    /// Packed 24-bit B, G, R.
    Bgr,
    /// Packed 32-bit R, G, B, padding.
    Rgbx,
    /// Packed 32-bit padding, R, G, B.
    Xrgb,
    /// Packed 32-bit B, G, R, padding.
    Bgrx,
    /// Packed 32-bit padding, B, G, R.
    Xbgr,
    /// Packed 32-bit R, G, B, A.
    Rgba,
    /// Packed 32-bit A, R, G, B.
    Argb,
    /// Packed 32-bit B, G, R, A.
    Bgra,
    /// Packed 32-bit A, B, G, R.
    Abgr,
    /// 16-bit luma, little endian.
    Gray16Le,
    /// 16-bit luma, big endian.
    Gray16Be,
    /// Planar YUV 4:2:0 (decoder output; not a packed layout).
    I420,
    /// Semi-planar YUV 4:2:0 (not a packed layout).
    Nv12,
}

impl PixelFormatTag {
    /// Every known tag. The packed ones come first, in catalog order.
    pub const ALL: [PixelFormatTag; 15] = [
        Self::Gray8,
        Self::Rgb,
        Self::Bgr,
        Self::Rgbx,
        Self::Xrgb,
        Self::Bgrx,
        Self::Xbgr,
        Self::Rgba,
        Self::Argb,
        Self::Bgra,
        Self::Abgr,
        Self::Gray16Le,
        Self::Gray16Be,
        Self::I420,
        Self::Nv12,
    ];

    /// Wire name of the tag.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gray8 => "GRAY8",
            Self::Rgb => "RGB",
            Self::Bgr => "BGR",
            Self::Rgbx => "RGBx",
            Self::Xrgb => "xRGB",
            Self::Bgrx => "BGRx",
            Self::Xbgr => "xBGR",
            Self::Rgba => "RGBA",
            Self::Argb => "ARGB",
            Self::Bgra => "BGRA",
            Self::Abgr => "ABGR",
            Self::Gray16Le => "GRAY16_LE",
            Self::Gray16Be => "GRAY16_BE",
            Self::I420 => "I420",
            Self::Nv12 => "NV12",
        }
    }

    /// Bytes needed for one frame of this format.
    pub fn frame_size(self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        match self {
            Self::Gray8 => w * h,
            Self::Gray16Le | Self::Gray16Be => w * h * 2,
            Self::Rgb | Self::Bgr => w * h * 3,
            Self::I420 | Self::Nv12 => w * h + 2 * (w.div_ceil(2) * h.div_ceil(2)),
            _ => w * h * 4,
        }
    }
}

impl fmt::Display for PixelFormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PixelFormatTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| Error::UnsupportedFormat(s.to_string()))
    }
}

/// Internal channel layout of a packed frame buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelLayout {
    /// One 8-bit channel.
    C1U8,
    /// Three 8-bit channels.
    C3U8,
    /// Four 8-bit channels.
    C4U8,
    /// One 16-bit channel.
    C1U16,
}

impl ChannelLayout {
    /// Bytes per pixel.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::C1U8 => 1,
            Self::C1U16 => 2,
            Self::C3U8 => 3,
            Self::C4U8 => 4,
        }
    }

    /// Number of channels.
    pub const fn channels(self) -> usize {
        match self {
            Self::C1U8 | Self::C1U16 => 1,
            Self::C3U8 => 3,
            Self::C4U8 => 4,
        }
    }
}

/// Internal shape of one frame's memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PixelBufferDescriptor {
    layout: ChannelLayout,
    width: u32,
    height: u32,
}

impl PixelBufferDescriptor {
    /// Create a descriptor. Both dimensions must be non-zero.
    pub fn new(layout: ChannelLayout, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidFrame(format!(
                "frame dimensions must be non-zero, got {width}x{height}"
            )));
        }
        Ok(Self {
            layout,
            width,
            height,
        })
    }

    /// Channel layout.
    #[inline]
    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row (rows are tightly packed).
    #[inline]
    pub fn stride(&self) -> usize {
        self.width as usize * self.layout.bytes_per_pixel()
    }

    /// Bytes in one frame.
    #[inline]
    pub fn frame_len(&self) -> usize {
        self.stride() * self.height as usize
    }

    /// Same dimensions, different layout.
    pub fn with_layout(&self, layout: ChannelLayout) -> Self {
        Self { layout, ..*self }
    }
}

/// External description of a raw video stream: tag plus size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VideoInfo {
    /// Pixel format.
    pub tag: PixelFormatTag,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl VideoInfo {
    /// Create a video description.
    pub const fn new(tag: PixelFormatTag, width: u32, height: u32) -> Self {
        Self { tag, width, height }
    }

    /// Bytes per frame.
    pub fn frame_size(&self) -> usize {
        self.tag.frame_size(self.width, self.height)
    }
}

impl fmt::Display for VideoInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "video/x-raw,format={},width={},height={}",
            self.tag, self.width, self.height
        )
    }
}

// ============================================================================
// Caps
// ============================================================================

/// Encoded video codec.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VideoCodec {
    /// VP8.
    Vp8,
}

/// RTP stream description.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RtpCaps {
    /// Media kind (`"video"`).
    pub media: String,
    /// RTP payload type.
    pub payload: u8,
    /// RTP clock rate in Hz.
    pub clock_rate: u32,
    /// Encoding name.
    pub encoding_name: String,
}

impl RtpCaps {
    /// VP8 over RTP as carried by the ingress stage.
    pub fn vp8() -> Self {
        Self {
            media: "video".into(),
            payload: 96,
            clock_rate: 90_000,
            encoding_name: "VP8-DRAFT-IETF-01".into(),
        }
    }
}

impl fmt::Display for RtpCaps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "application/x-rtp,media=(string){},payload=(int){},clock-rate=(int){},encoding-name=(string){}",
            self.media, self.payload, self.clock_rate, self.encoding_name
        )
    }
}

/// Raw video capabilities: acceptable tags (in preference order) and sizes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoCaps {
    /// Acceptable pixel formats, most preferred first.
    pub formats: SmallVec<[PixelFormatTag; 8]>,
    /// Width constraint.
    pub width: CapsValue<u32>,
    /// Height constraint.
    pub height: CapsValue<u32>,
}

impl VideoCaps {
    /// Accepts the given formats at any size.
    pub fn formats(formats: &[PixelFormatTag]) -> Self {
        Self {
            formats: formats.iter().copied().collect(),
            width: CapsValue::Any,
            height: CapsValue::Any,
        }
    }

    /// Accepts every known format at any size.
    pub fn any() -> Self {
        Self::formats(&PixelFormatTag::ALL)
    }

    /// Restrict both dimensions.
    pub fn with_size(mut self, width: CapsValue<u32>, height: CapsValue<u32>) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Check if a concrete stream description satisfies these caps.
    pub fn accepts(&self, info: &VideoInfo) -> bool {
        self.formats.contains(&info.tag)
            && self.width.accepts(info.width)
            && self.height.accepts(info.height)
    }

    /// Common ground, keeping this side's format order.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let formats: SmallVec<[PixelFormatTag; 8]> = self
            .formats
            .iter()
            .copied()
            .filter(|tag| other.formats.contains(tag))
            .collect();
        if formats.is_empty() {
            return None;
        }
        Some(Self {
            formats,
            width: self.width.intersect(&other.width)?,
            height: self.height.intersect(&other.height)?,
        })
    }
}

/// Capabilities advertised by a stage's input or output.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum Caps {
    /// Anything.
    #[default]
    Any,
    /// RTP packets.
    Rtp(RtpCaps),
    /// Encoded video frames.
    Encoded(VideoCodec),
    /// Raw video frames.
    Raw(VideoCaps),
}

impl Caps {
    /// Shorthand for raw video caps over a set of formats.
    pub fn raw(formats: &[PixelFormatTag]) -> Self {
        Self::Raw(VideoCaps::formats(formats))
    }

    /// Intersect two caps, `None` when the link cannot carry anything.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Any, o) => Some(o.clone()),
            (s, Self::Any) => Some(s.clone()),
            (Self::Rtp(a), Self::Rtp(b)) => (a == b).then(|| Self::Rtp(a.clone())),
            (Self::Encoded(a), Self::Encoded(b)) => (a == b).then_some(Self::Encoded(*a)),
            (Self::Raw(a), Self::Raw(b)) => a.intersect(b).map(Self::Raw),
            _ => None,
        }
    }

    /// Raw video part of these caps, if any.
    pub fn as_raw(&self) -> Option<&VideoCaps> {
        match self {
            Self::Raw(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("ANY"),
            Self::Rtp(rtp) => rtp.fmt(f),
            Self::Encoded(VideoCodec::Vp8) => f.write_str("video/x-vp8"),
            Self::Raw(v) => {
                f.write_str("video/x-raw,format={")?;
                for (i, tag) in v.formats.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    f.write_str(tag.as_str())?;
                }
                f.write_str("}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_names_round_trip() {
        for tag in PixelFormatTag::ALL {
            assert_eq!(tag.as_str().parse::<PixelFormatTag>().unwrap(), tag);
        }
        assert!(matches!(
            "YUY2".parse::<PixelFormatTag>(),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_frame_size() {
        assert_eq!(PixelFormatTag::Rgb.frame_size(640, 480), 921_600);
        assert_eq!(PixelFormatTag::Gray16Be.frame_size(4, 2), 16);
        assert_eq!(PixelFormatTag::I420.frame_size(4, 4), 24);
        assert_eq!(PixelFormatTag::I420.frame_size(3, 3), 9 + 8);
    }

    #[test]
    fn test_descriptor_rejects_zero() {
        assert!(PixelBufferDescriptor::new(ChannelLayout::C3U8, 0, 10).is_err());
        let desc = PixelBufferDescriptor::new(ChannelLayout::C3U8, 640, 480).unwrap();
        assert_eq!(desc.stride(), 1920);
        assert_eq!(desc.frame_len(), 921_600);
        assert_eq!(desc.with_layout(ChannelLayout::C1U8).frame_len(), 307_200);
    }

    #[test]
    fn test_caps_value_intersect() {
        let r1 = CapsValue::Range { min: 10u32, max: 100 };
        let r2 = CapsValue::Range { min: 100u32, max: 200 };
        assert_eq!(r1.intersect(&r2), Some(CapsValue::Fixed(100)));
        assert_eq!(
            r1.intersect(&CapsValue::Range { min: 150, max: 200 }),
            None
        );
        assert_eq!(
            CapsValue::Fixed(5u32).intersect(&CapsValue::Fixed(6)),
            None
        );
    }

    #[test]
    fn test_video_caps_intersect_keeps_order() {
        let a = VideoCaps::formats(&[PixelFormatTag::Bgr, PixelFormatTag::Rgb]);
        let b = VideoCaps::formats(&[PixelFormatTag::Rgb, PixelFormatTag::Bgr]);
        let both = a.intersect(&b).unwrap();
        assert_eq!(
            both.formats.as_slice(),
            &[PixelFormatTag::Bgr, PixelFormatTag::Rgb]
        );
        let gray = VideoCaps::formats(&[PixelFormatTag::Gray8]);
        assert!(a.intersect(&gray).is_none());
    }

    #[test]
    fn test_caps_intersect_kinds() {
        let rtp = Caps::Rtp(RtpCaps::vp8());
        assert_eq!(rtp.intersect(&Caps::Any), Some(rtp.clone()));
        assert!(rtp.intersect(&Caps::Encoded(VideoCodec::Vp8)).is_none());
        assert!(
            Caps::raw(&[PixelFormatTag::Rgb])
                .intersect(&Caps::raw(&[PixelFormatTag::Rgb]))
                .is_some()
        );
    }

    #[test]
    fn test_video_caps_accepts() {
        let caps = VideoCaps::formats(&[PixelFormatTag::Rgb])
            .with_size(CapsValue::Range { min: 2, max: 1920 }, CapsValue::Any);
        assert!(caps.accepts(&VideoInfo::new(PixelFormatTag::Rgb, 640, 480)));
        assert!(!caps.accepts(&VideoInfo::new(PixelFormatTag::Bgr, 640, 480)));
        assert!(!caps.accepts(&VideoInfo::new(PixelFormatTag::Rgb, 1, 480)));
    }
}
