//! Pixel format conversion (colorspace conversion).
//!
//! Converts between planar I420, GRAY8 and every packed 8-bit RGB-family
//! tag using BT.601 fixed-point math (coefficients scaled by 1024).

use crate::error::{Error, Result};
use crate::format::{PixelFormatTag, VideoInfo};
use crate::vision::imgproc::ChannelOrder;

/// Whether [`ColorConvert`] can read and write `tag`.
pub fn is_convertible(tag: PixelFormatTag) -> bool {
    matches!(tag, PixelFormatTag::I420 | PixelFormatTag::Gray8) || ChannelOrder::of(tag).is_some()
}

/// How one packed pixel is laid out.
#[derive(Clone, Copy, Debug)]
enum Packing {
    Gray,
    Color {
        order: ChannelOrder,
        bpp: usize,
        pad: Option<usize>,
    },
}

impl Packing {
    fn of(tag: PixelFormatTag) -> Option<Self> {
        if tag == PixelFormatTag::Gray8 {
            return Some(Self::Gray);
        }
        let order = ChannelOrder::of(tag)?;
        let bpp = tag.frame_size(1, 1);
        // The padding/alpha byte is whichever index the color channels don't use.
        let pad = (bpp == 4).then(|| 6 - (order.r + order.g + order.b));
        Some(Self::Color { order, bpp, pad })
    }

    fn bpp(self) -> usize {
        match self {
            Self::Gray => 1,
            Self::Color { bpp, .. } => bpp,
        }
    }

    #[inline]
    fn read(self, px: &[u8]) -> (u8, u8, u8) {
        match self {
            Self::Gray => (px[0], px[0], px[0]),
            Self::Color { order, .. } => (px[order.r], px[order.g], px[order.b]),
        }
    }

    #[inline]
    fn write(self, px: &mut [u8], (r, g, b): (u8, u8, u8)) {
        match self {
            Self::Gray => px[0] = rgb_to_yuv(r, g, b).0,
            Self::Color { order, pad, .. } => {
                px[order.r] = r;
                px[order.g] = g;
                px[order.b] = b;
                if let Some(a) = pad {
                    px[a] = 255;
                }
            }
        }
    }
}

#[inline]
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y = y as i32;
    let u = u as i32 - 128;
    let v = v as i32 - 128;
    let r = y + ((1436 * v) >> 10);
    let g = y - ((352 * u + 731 * v) >> 10);
    let b = y + ((1815 * u) >> 10);
    (
        r.clamp(0, 255) as u8,
        g.clamp(0, 255) as u8,
        b.clamp(0, 255) as u8,
    )
}

#[inline]
fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let y = ((306 * r + 601 * g + 117 * b) >> 10).clamp(0, 255);
    let u = (((-173 * r - 339 * g + 512 * b) >> 10) + 128).clamp(0, 255);
    let v = (((512 * r - 429 * g - 83 * b) >> 10) + 128).clamp(0, 255);
    (y as u8, u as u8, v as u8)
}

/// Converts frames of one fixed size from one format to another.
#[derive(Debug, Clone, Copy)]
pub struct ColorConvert {
    input: VideoInfo,
    output: VideoInfo,
}

impl ColorConvert {
    /// Create a converter from `input` to `output` tag at the same size.
    pub fn new(input: VideoInfo, output: PixelFormatTag) -> Result<Self> {
        for tag in [input.tag, output] {
            if !is_convertible(tag) {
                return Err(Error::UnsupportedFormat(format!("cannot convert {tag}")));
            }
        }
        if input.width == 0 || input.height == 0 {
            return Err(Error::Config("width and height must be non-zero".into()));
        }
        let yuv = input.tag == PixelFormatTag::I420 || output == PixelFormatTag::I420;
        if yuv && (input.width % 2 != 0 || input.height % 2 != 0) {
            return Err(Error::Config("I420 requires even width and height".into()));
        }
        Ok(Self {
            input,
            output: VideoInfo::new(output, input.width, input.height),
        })
    }

    /// Input description.
    pub fn input(&self) -> VideoInfo {
        self.input
    }

    /// Output description.
    pub fn output(&self) -> VideoInfo {
        self.output
    }

    /// Convert one frame.
    pub fn convert(&self, input: &[u8], output: &mut [u8]) -> Result<()> {
        let need_in = self.input.frame_size();
        let need_out = self.output.frame_size();
        if input.len() < need_in || output.len() < need_out {
            return Err(Error::InvalidFrame(format!(
                "{} -> {}: got {} / {} bytes, need {need_in} / {need_out}",
                self.input.tag,
                self.output.tag,
                input.len(),
                output.len()
            )));
        }
        let (input, output) = (&input[..need_in], &mut output[..need_out]);

        match (Packing::of(self.input.tag), Packing::of(self.output.tag)) {
            _ if self.input.tag == self.output.tag => output.copy_from_slice(input),
            (None, Some(dst)) => self.from_i420(input, output, dst),
            (Some(src), None) => self.to_i420(input, output, src),
            (Some(src), Some(dst)) => {
                for (s, d) in input
                    .chunks_exact(src.bpp())
                    .zip(output.chunks_exact_mut(dst.bpp()))
                {
                    dst.write(d, src.read(s));
                }
            }
            (None, None) => unreachable!("I420 to I420 is a copy"),
        }
        Ok(())
    }

    fn from_i420(&self, input: &[u8], output: &mut [u8], dst: Packing) {
        let (w, h) = (self.input.width as usize, self.input.height as usize);
        let cw = w / 2;
        let (y_plane, chroma) = input.split_at(w * h);
        let (u_plane, v_plane) = chroma.split_at(cw * (h / 2));
        let bpp = dst.bpp();

        for row in 0..h {
            for col in 0..w {
                let c = (row / 2) * cw + col / 2;
                let rgb = yuv_to_rgb(y_plane[row * w + col], u_plane[c], v_plane[c]);
                let i = (row * w + col) * bpp;
                dst.write(&mut output[i..i + bpp], rgb);
            }
        }
    }

    fn to_i420(&self, input: &[u8], output: &mut [u8], src: Packing) {
        let (w, h) = (self.input.width as usize, self.input.height as usize);
        let cw = w / 2;
        let (y_plane, chroma) = output.split_at_mut(w * h);
        let (u_plane, v_plane) = chroma.split_at_mut(cw * (h / 2));
        let bpp = src.bpp();

        for row in (0..h).step_by(2) {
            for col in (0..w).step_by(2) {
                let (mut u_sum, mut v_sum) = (0u32, 0u32);
                for (dy, dx) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
                    let p = (row + dy) * w + col + dx;
                    let (r, g, b) = src.read(&input[p * bpp..(p + 1) * bpp]);
                    let (y, u, v) = rgb_to_yuv(r, g, b);
                    y_plane[p] = y;
                    u_sum += u as u32;
                    v_sum += v as u32;
                }
                let c = (row / 2) * cw + col / 2;
                u_plane[c] = (u_sum / 4) as u8;
                v_plane[c] = (v_sum / 4) as u8;
            }
        }
    }
}
