//! Integration tests for the transform stage and the edge-detection filter.
//!
//! These tests verify that:
//! - Every output pixel is the input pixel or black
//! - Processing is deterministic
//! - A 640x480 RGB stage negotiates and sizes its scratch to the frame
//! - Scratch state lives exactly between negotiation and release

use visionpipe::buffer::Buffer;
use visionpipe::element::Element;
use visionpipe::error::Error;
use visionpipe::format::{PixelFormatTag, VideoInfo};
use visionpipe::metadata::Metadata;
use visionpipe::vision::{CannyFilter, GrayscaleFilter, StageState, TransformStage};

/// Deterministic pseudo-random bytes.
fn noise(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (state >> 56) as u8
        })
        .collect()
}

/// A bright rectangle on a dim, noisy background.
fn scene(width: u32, height: u32) -> Vec<u8> {
    let mut data = noise((width * height * 3) as usize, 7);
    for y in 0..height {
        for x in 0..width {
            let i = ((y * width + x) * 3) as usize;
            let inside = x > width / 4 && x < width * 3 / 4 && y > height / 4 && y < height * 3 / 4;
            let base = if inside { 200 } else { 30 };
            for c in 0..3 {
                data[i + c] = base + data[i + c] % 8;
            }
        }
    }
    data
}

fn canny_stage(info: VideoInfo) -> TransformStage<CannyFilter> {
    let mut stage = TransformStage::new(CannyFilter::new());
    stage.negotiate(info, info).unwrap();
    stage
}

#[test]
fn test_output_pixels_are_input_or_zero() {
    let info = VideoInfo::new(PixelFormatTag::Rgb, 96, 64);
    let mut stage = canny_stage(info);

    for seed in [1, 2, 3] {
        let input = noise(info.frame_size(), seed);
        let mut output = vec![0xAAu8; info.frame_size()];
        stage.transform_frame(&input, &mut output).unwrap();

        for (i, (out, inp)) in output.chunks(3).zip(input.chunks(3)).enumerate() {
            assert!(
                out == inp || out == [0, 0, 0],
                "pixel {i}: {out:?} is neither {inp:?} nor black"
            );
        }
    }
}

#[test]
fn test_scene_has_edges_and_background() {
    let info = VideoInfo::new(PixelFormatTag::Rgb, 120, 80);
    let mut stage = canny_stage(info);
    let input = scene(120, 80);
    let mut output = vec![0u8; info.frame_size()];
    stage.transform_frame(&input, &mut output).unwrap();

    let kept = output.chunks(3).filter(|p| *p != [0, 0, 0]).count();
    assert!(kept > 0, "rectangle outline not detected");
    assert!(kept < 120 * 80 / 2, "most of the frame should be masked out");
    // Far corner is flat background.
    assert_eq!(&output[..3], &[0, 0, 0]);
}

#[test]
fn test_processing_is_deterministic() {
    let info = VideoInfo::new(PixelFormatTag::Rgb, 80, 60);
    let input = scene(80, 60);

    let mut stage = canny_stage(info);
    let mut first = vec![0u8; info.frame_size()];
    let mut second = vec![0u8; info.frame_size()];
    stage.transform_frame(&input, &mut first).unwrap();
    stage.transform_frame(&input, &mut second).unwrap();
    assert_eq!(first, second);

    let mut fresh = canny_stage(info);
    let mut third = vec![0u8; info.frame_size()];
    fresh.transform_frame(&input, &mut third).unwrap();
    assert_eq!(first, third);
}

#[test]
fn test_vga_rgb_negotiation() {
    let info = VideoInfo::new(PixelFormatTag::Rgb, 640, 480);
    let mut stage = TransformStage::new(CannyFilter::new());
    assert_eq!(stage.state(), StageState::Unconfigured);
    assert!(stage.scratch().is_none());

    stage.negotiate(info, info).unwrap();
    assert_eq!(stage.state(), StageState::Negotiated);
    let input = stage.input_format().unwrap();
    assert_eq!(input.desc.layout().channels(), 3);
    assert_eq!(input.desc.layout().bytes_per_pixel(), 3);

    let scratch = stage.scratch().unwrap();
    for plane in [scratch.gray(), scratch.edges()] {
        assert_eq!((plane.width(), plane.height()), (640, 480));
        assert_eq!(plane.desc().layout().channels(), 1);
    }

    stage.release();
    assert_eq!(stage.state(), StageState::Released);
    assert!(stage.scratch().is_none());
}

#[test]
fn test_rejection_is_recoverable() {
    let mut stage = TransformStage::new(CannyFilter::new());
    let bgr = VideoInfo::new(PixelFormatTag::Bgr, 64, 48);
    let err = stage.negotiate(bgr, bgr).unwrap_err();
    assert!(err.is_negotiation_failure());
    assert_eq!(stage.state(), StageState::Unconfigured);

    let rgb = VideoInfo::new(PixelFormatTag::Rgb, 64, 48);
    stage.negotiate(rgb, rgb).unwrap();
    assert_eq!(stage.state(), StageState::Negotiated);
}

#[test]
fn test_element_process_negotiates_from_metadata() {
    let info = VideoInfo::new(PixelFormatTag::Rgb, 64, 48);
    let mut stage = TransformStage::new(CannyFilter::new());
    let buffer = Buffer::new(scene(64, 48), Metadata::with_sequence(3).with_video(info));

    let out = stage.process(buffer).unwrap().into_single().unwrap();
    assert_eq!(out.len(), info.frame_size());
    assert_eq!(out.metadata().sequence, 3);
    assert_eq!(out.metadata().video, Some(info));
    assert_eq!(stage.state(), StageState::Active);
    assert_eq!(stage.frames_processed(), 1);
}

#[test]
fn test_short_frame_is_an_error() {
    let info = VideoInfo::new(PixelFormatTag::Rgb, 64, 48);
    let mut stage = canny_stage(info);
    let input = vec![0u8; info.frame_size() - 1];
    let mut output = vec![0u8; info.frame_size()];
    assert!(matches!(
        stage.transform_frame(&input, &mut output),
        Err(Error::InvalidFrame(_))
    ));
}

#[test]
fn test_grayscale_changes_layout() {
    let input_info = VideoInfo::new(PixelFormatTag::Bgra, 32, 16);
    let mut stage = TransformStage::new(GrayscaleFilter::new());
    let accepted = stage.negotiate_input(input_info).unwrap();
    assert_eq!(accepted, VideoInfo::new(PixelFormatTag::Gray8, 32, 16));

    let mut input = vec![0u8; input_info.frame_size()];
    for px in input.chunks_mut(4) {
        px.copy_from_slice(&[255, 255, 255, 255]);
    }
    let mut output = vec![0u8; accepted.frame_size()];
    stage.transform_frame(&input, &mut output).unwrap();
    assert!(output.iter().all(|&v| v == 255));
}
