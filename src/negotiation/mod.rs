//! Pixel-format negotiation.
//!
//! Maps external [`PixelFormatTag`]s onto the internal [`ChannelLayout`]
//! used to shape frame memory, and back. Every function here is a pure
//! table lookup; errors are plain values the caller may recover from by
//! trying another candidate.
//!
//! | Layout | Tags |
//! |--------|------|
//! | `C1U8` | GRAY8 |
//! | `C3U8` | RGB, BGR |
//! | `C4U8` | RGBx, xRGB, BGRx, xBGR, RGBA, ARGB, BGRA, ABGR |
//! | `C1U16` | GRAY16_LE, GRAY16_BE |
//!
//! Planar YUV tags are known to the pipeline but have no packed layout, so
//! they fail to resolve.

use crate::error::{Error, Result};
use crate::format::{ChannelLayout, PixelBufferDescriptor, PixelFormatTag, VideoCaps, VideoInfo};
use smallvec::SmallVec;

/// Candidate tags for one layout. Eight is the widest group.
pub type Candidates = SmallVec<[PixelFormatTag; 8]>;

const CATALOG: [(PixelFormatTag, ChannelLayout); 13] = [
    (PixelFormatTag::Gray8, ChannelLayout::C1U8),
    (PixelFormatTag::Rgb, ChannelLayout::C3U8),
    (PixelFormatTag::Bgr, ChannelLayout::C3U8),
    (PixelFormatTag::Rgbx, ChannelLayout::C4U8),
    (PixelFormatTag::Xrgb, ChannelLayout::C4U8),
    (PixelFormatTag::Bgrx, ChannelLayout::C4U8),
    (PixelFormatTag::Xbgr, ChannelLayout::C4U8),
    (PixelFormatTag::Rgba, ChannelLayout::C4U8),
    (PixelFormatTag::Argb, ChannelLayout::C4U8),
    (PixelFormatTag::Bgra, ChannelLayout::C4U8),
    (PixelFormatTag::Abgr, ChannelLayout::C4U8),
    (PixelFormatTag::Gray16Le, ChannelLayout::C1U16),
    (PixelFormatTag::Gray16Be, ChannelLayout::C1U16),
];

/// Layout a tag maps to.
pub fn layout_of(tag: PixelFormatTag) -> Result<ChannelLayout> {
    CATALOG
        .iter()
        .find(|(t, _)| *t == tag)
        .map(|(_, layout)| *layout)
        .ok_or_else(|| Error::UnsupportedFormat(tag.to_string()))
}

/// Resolve an external stream description into an internal buffer descriptor.
///
/// ```rust
/// use visionpipe::format::{ChannelLayout, PixelFormatTag, VideoInfo};
/// use visionpipe::negotiation::resolve;
///
/// let desc = resolve(&VideoInfo::new(PixelFormatTag::Bgr, 640, 480)).unwrap();
/// assert_eq!(desc.layout(), ChannelLayout::C3U8);
/// assert!(resolve(&VideoInfo::new(PixelFormatTag::I420, 640, 480)).is_err());
/// ```
pub fn resolve(info: &VideoInfo) -> Result<PixelBufferDescriptor> {
    let layout = layout_of(info.tag)?;
    PixelBufferDescriptor::new(layout, info.width, info.height)
}

/// Every tag that maps to `layout`, in catalog order.
pub fn candidates(layout: ChannelLayout) -> Candidates {
    CATALOG
        .iter()
        .filter(|(_, l)| *l == layout)
        .map(|(tag, _)| *tag)
        .collect()
}

/// Inverse of [`resolve`]: describe `desc` externally using `tag`.
///
/// Fails when `tag` does not share the descriptor's layout.
pub fn describe(desc: &PixelBufferDescriptor, tag: PixelFormatTag) -> Result<VideoInfo> {
    let layout = layout_of(tag)?;
    if layout != desc.layout() {
        return Err(Error::UnsupportedFormat(format!(
            "{tag} does not carry a {:?} buffer",
            desc.layout()
        )));
    }
    Ok(VideoInfo::new(tag, desc.width(), desc.height()))
}

/// Output proposals for a stage fed `input`, in the order they should be tried.
///
/// Only resolvable tags that `downstream` accepts at the input size are
/// offered. The input tag comes first when acceptable (so same-layout filters
/// keep channel order), then the rest in `downstream` preference order.
pub fn output_proposals(input: &VideoInfo, downstream: &VideoCaps) -> SmallVec<[VideoInfo; 8]> {
    let mut proposals: SmallVec<[VideoInfo; 8]> = SmallVec::new();
    let preferred = std::iter::once(input.tag).filter(|tag| downstream.formats.contains(tag));
    for tag in preferred.chain(downstream.formats.iter().copied()) {
        let info = VideoInfo::new(tag, input.width, input.height);
        if layout_of(tag).is_ok() && downstream.accepts(&info) && !proposals.contains(&info) {
            proposals.push(info);
        }
    }
    proposals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_groups() {
        assert_eq!(candidates(ChannelLayout::C1U8).as_slice(), &[PixelFormatTag::Gray8]);
        assert_eq!(
            candidates(ChannelLayout::C3U8).as_slice(),
            &[PixelFormatTag::Rgb, PixelFormatTag::Bgr]
        );
        assert_eq!(candidates(ChannelLayout::C4U8).len(), 8);
        assert_eq!(
            candidates(ChannelLayout::C1U16).as_slice(),
            &[PixelFormatTag::Gray16Le, PixelFormatTag::Gray16Be]
        );
    }

    #[test]
    fn test_planar_tags_unsupported() {
        for tag in [PixelFormatTag::I420, PixelFormatTag::Nv12] {
            let err = resolve(&VideoInfo::new(tag, 16, 16)).unwrap_err();
            assert!(matches!(err, Error::UnsupportedFormat(_)));
        }
    }

    #[test]
    fn test_resolve_rejects_empty_frame() {
        assert!(resolve(&VideoInfo::new(PixelFormatTag::Rgb, 0, 480)).is_err());
    }

    #[test]
    fn test_describe_checks_layout() {
        let desc = resolve(&VideoInfo::new(PixelFormatTag::Rgb, 8, 8)).unwrap();
        assert_eq!(
            describe(&desc, PixelFormatTag::Bgr).unwrap(),
            VideoInfo::new(PixelFormatTag::Bgr, 8, 8)
        );
        assert!(describe(&desc, PixelFormatTag::Rgba).is_err());
    }

    #[test]
    fn test_output_proposals_prefer_input_tag() {
        let input = VideoInfo::new(PixelFormatTag::Bgr, 4, 4);
        let downstream = VideoCaps::formats(&[
            PixelFormatTag::I420,
            PixelFormatTag::Rgb,
            PixelFormatTag::Bgr,
        ]);
        let tags: Vec<_> = output_proposals(&input, &downstream)
            .iter()
            .map(|i| i.tag)
            .collect();
        assert_eq!(tags, vec![PixelFormatTag::Bgr, PixelFormatTag::Rgb]);
    }
}
