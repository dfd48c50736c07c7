//! Integration tests for pixel-format negotiation.
//!
//! These tests verify that:
//! - Every resolvable tag round-trips through the layout it selects
//! - Unresolvable tags fail with `UnsupportedFormat`
//! - Output proposals only offer formats downstream can take

use visionpipe::error::Error;
use visionpipe::format::{ChannelLayout, PixelFormatTag, VideoCaps, VideoInfo};
use visionpipe::negotiation::{candidates, describe, output_proposals, resolve};

#[test]
fn test_every_supported_tag_round_trips() {
    let mut supported = 0;
    for tag in PixelFormatTag::ALL {
        let info = VideoInfo::new(tag, 640, 480);
        let Ok(desc) = resolve(&info) else {
            continue;
        };
        supported += 1;

        let group = candidates(desc.layout());
        assert!(group.contains(&tag), "{tag} missing from its own candidate group");
        for candidate in group {
            let back = resolve(&VideoInfo::new(candidate, 640, 480)).unwrap();
            assert_eq!(back, desc, "{candidate} resolves differently from {tag}");
        }
        assert_eq!(describe(&desc, tag).unwrap(), info);
    }
    assert_eq!(supported, 13);
}

#[test]
fn test_unsupported_tags_fail() {
    for tag in [PixelFormatTag::I420, PixelFormatTag::Nv12] {
        let err = resolve(&VideoInfo::new(tag, 640, 480)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)), "{tag}: {err}");
        assert!(err.is_negotiation_failure());
    }
}

#[test]
fn test_layout_sizes() {
    let cases = [
        (PixelFormatTag::Gray8, ChannelLayout::C1U8, 640 * 480),
        (PixelFormatTag::Bgr, ChannelLayout::C3U8, 640 * 480 * 3),
        (PixelFormatTag::Abgr, ChannelLayout::C4U8, 640 * 480 * 4),
        (PixelFormatTag::Gray16Be, ChannelLayout::C1U16, 640 * 480 * 2),
    ];
    for (tag, layout, len) in cases {
        let desc = resolve(&VideoInfo::new(tag, 640, 480)).unwrap();
        assert_eq!(desc.layout(), layout);
        assert_eq!(desc.frame_len(), len);
        assert_eq!(desc.frame_len(), tag.frame_size(640, 480));
    }
}

#[test]
fn test_describe_refuses_other_layout() {
    let desc = resolve(&VideoInfo::new(PixelFormatTag::Rgb, 8, 8)).unwrap();
    assert!(describe(&desc, PixelFormatTag::Rgba).is_err());
    assert!(describe(&desc, PixelFormatTag::I420).is_err());
}

#[test]
fn test_proposals_follow_downstream() {
    use PixelFormatTag::*;
    let input = VideoInfo::new(Rgb, 32, 32);

    let downstream = VideoCaps::formats(&[Bgr, Rgb, I420]);
    let proposals = output_proposals(&input, &downstream);
    let tags: Vec<_> = proposals.iter().map(|p| p.tag).collect();
    // Input tag first, planar formats never offered.
    assert_eq!(tags, vec![Rgb, Bgr]);
    assert!(proposals.iter().all(|p| p.width == 32 && p.height == 32));

    let none = output_proposals(&input, &VideoCaps::formats(&[I420, Nv12]));
    assert!(none.is_empty());
}
