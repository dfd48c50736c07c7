//! Benchmarks for colorspace conversion.
//!
//! Run with:
//!   cargo bench -- colorspace

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use visionpipe::converters::ColorConvert;
use visionpipe::format::{PixelFormatTag, VideoInfo};

/// Common resolutions to benchmark
const RESOLUTIONS: &[(u32, u32, &str)] = &[
    (640, 480, "VGA"),
    (1280, 720, "720p"),
    (1920, 1080, "1080p"),
];

/// I420 frame with a luma gradient and neutral chroma.
fn i420_frame(width: u32, height: u32) -> Vec<u8> {
    let mut input = vec![0u8; PixelFormatTag::I420.frame_size(width, height)];
    let y_size = (width * height) as usize;
    for (i, px) in input[..y_size].iter_mut().enumerate() {
        *px = ((i * 255) / y_size) as u8;
    }
    input[y_size..].fill(128);
    input
}

fn bench_i420_to_rgb(c: &mut Criterion) {
    let mut group = c.benchmark_group("i420_to_rgb");

    for &(width, height, name) in RESOLUTIONS {
        let input = i420_frame(width, height);
        let mut output = vec![0u8; PixelFormatTag::Rgb.frame_size(width, height)];
        group.throughput(Throughput::Bytes(input.len() as u64));

        let converter = ColorConvert::new(
            VideoInfo::new(PixelFormatTag::I420, width, height),
            PixelFormatTag::Rgb,
        )
        .expect("Failed to create converter");

        group.bench_with_input(BenchmarkId::new("convert", name), &input, |b, input| {
            b.iter(|| {
                converter.convert(input, &mut output).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_rgb_to_i420(c: &mut Criterion) {
    let mut group = c.benchmark_group("rgb_to_i420");

    for &(width, height, name) in RESOLUTIONS {
        let input: Vec<u8> = (0..PixelFormatTag::Rgb.frame_size(width, height))
            .map(|i| (i % 251) as u8)
            .collect();
        let mut output = vec![0u8; PixelFormatTag::I420.frame_size(width, height)];
        group.throughput(Throughput::Bytes(input.len() as u64));

        let converter = ColorConvert::new(
            VideoInfo::new(PixelFormatTag::Rgb, width, height),
            PixelFormatTag::I420,
        )
        .expect("Failed to create converter");

        group.bench_with_input(BenchmarkId::new("convert", name), &input, |b, input| {
            b.iter(|| {
                converter.convert(input, &mut output).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_packed_swizzle(c: &mut Criterion) {
    let mut group = c.benchmark_group("packed_swizzle");
    let (width, height) = (1280, 720);

    for (from, to) in [
        (PixelFormatTag::Rgb, PixelFormatTag::Bgrx),
        (PixelFormatTag::Rgba, PixelFormatTag::Rgb),
        (PixelFormatTag::Gray8, PixelFormatTag::Rgb),
    ] {
        let input = vec![90u8; from.frame_size(width, height)];
        let mut output = vec![0u8; to.frame_size(width, height)];
        group.throughput(Throughput::Bytes(input.len() as u64));

        let converter = ColorConvert::new(VideoInfo::new(from, width, height), to)
            .expect("Failed to create converter");

        group.bench_with_input(
            BenchmarkId::new("convert", format!("{from}->{to}")),
            &input,
            |b, input| {
                b.iter(|| {
                    converter.convert(input, &mut output).unwrap();
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_i420_to_rgb,
    bench_rgb_to_i420,
    bench_packed_swizzle
);
criterion_main!(benches);
