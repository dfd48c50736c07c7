//! One track through the edge-detection chain.
//!
//! The RTP and VP8 stages come from the host media runtime, so this demo
//! registers a `rawvideoparse` stand-in that reads each injected packet as a
//! raw RGB frame. Everything after it is the real chain: convert, edge
//! filter, convert to I420, egress.
//!
//! Run with: cargo run --example canny_track

use std::time::Duration;
use visionpipe::buffer::Buffer;
use visionpipe::element::{Element, Output};
use visionpipe::error::{Error, Result};
use visionpipe::format::{Caps, PixelFormatTag, VideoInfo};
use visionpipe::pipeline::{ChainBuilder, ElementFactory, parse_pipeline};

const WIDTH: u32 = 160;
const HEIGHT: u32 = 120;

/// Tags each packet with a fixed raw RGB frame description.
struct RawVideoParse {
    info: VideoInfo,
}

impl Element for RawVideoParse {
    fn process(&mut self, mut buffer: Buffer) -> Result<Output> {
        if buffer.len() < self.info.frame_size() {
            return Err(Error::InvalidFrame(format!(
                "{} bytes is short of a {} frame",
                buffer.len(),
                self.info
            )));
        }
        buffer.metadata_mut().video = Some(self.info);
        Ok(buffer.into())
    }

    fn name(&self) -> &str {
        "rawvideoparse"
    }

    fn output_caps(&self) -> Caps {
        Caps::raw(&[self.info.tag])
    }

    fn is_compute(&self) -> bool {
        false
    }
}

/// A white disc moving across a grey background.
fn frame(index: u32) -> Vec<u8> {
    let (cx, cy, r) = ((20 + index * 6) as i64, (HEIGHT / 2) as i64, 25i64);
    let mut data = Vec::with_capacity((WIDTH * HEIGHT * 3) as usize);
    for y in 0..HEIGHT as i64 {
        for x in 0..WIDTH as i64 {
            let inside = (x - cx).pow(2) + (y - cy).pow(2) <= r * r;
            let v = if inside { 240 } else { 60 };
            data.extend_from_slice(&[v, v, v]);
        }
    }
    data
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "visionpipe=info".into()),
        )
        .init();

    let mut factory = ElementFactory::new();
    factory.register("rawvideoparse", |spec| {
        let width = spec.properties.get_u32("width")?.unwrap_or(WIDTH);
        let height = spec.properties.get_u32("height")?.unwrap_or(HEIGHT);
        Ok(Box::new(RawVideoParse {
            info: VideoInfo::new(PixelFormatTag::Rgb, width, height),
        }))
    });

    let description = format!(
        "appsrc do-timestamp=true ! rawvideoparse width={WIDTH} height={HEIGHT} \
         ! queue max-size-bytes=83886080 ! videoconvert \
         ! queue ! visioncannyfilter low-threshold=60 high-threshold=160 \
         ! queue ! videoconvert format=I420 \
         ! queue ! appsink sync=false drop=true max-buffers=64"
    );
    println!("Chain: {description}\n");

    let specs = parse_pipeline(&description)?;
    let mut chain = ChainBuilder::new(&factory).build("demo-track", &specs)?;
    let samples = chain.take_receiver().ok_or_else(|| Error::InvalidState("no receiver".into()))?;

    let consumer = samples.forward(|track, data, len, duration| {
        let edges = data.iter().take(len * 2 / 3).filter(|&&v| v > 128).count();
        println!("{track}: {len} byte sample, {duration} ns, {edges} bright luma pixels");
    })?;

    chain.start()?;
    let ingress = chain.ingress();
    for i in 0..20 {
        ingress.inject(frame(i))?;
        std::thread::sleep(Duration::from_millis(10));
    }
    chain.drain()?;

    let forwarded = consumer
        .join()
        .map_err(|_| Error::Element("consumer thread panicked".into()))?;
    println!("\nForwarded {forwarded} samples");
    Ok(())
}
