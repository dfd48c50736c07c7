//! Image-processing kernels used by the built-in filters.
//!
//! Everything here is a plain function over views and planes. Border pixels
//! are handled by replicating the nearest edge row/column.

use crate::error::{Error, Result};
use crate::format::{ChannelLayout, PixelFormatTag};
use crate::frame::{FrameView, FrameViewMut, Plane};

// BT.601 luma weights, Q14.
const LUMA_B: u32 = 1868;
const LUMA_G: u32 = 9617;
const LUMA_R: u32 = 4899;
const LUMA_SHIFT: u32 = 14;

// tan(22.5 deg), Q15.
const TAN_22_5: i32 = 13573;

const EDGE_NONE: u8 = 0;
const EDGE_WEAK: u8 = 1;
const EDGE_STRONG: u8 = 2;

/// Byte position of blue, green and red within one packed pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelOrder {
    /// Offset of blue.
    pub b: usize,
    /// Offset of green.
    pub g: usize,
    /// Offset of red.
    pub r: usize,
}

impl ChannelOrder {
    /// B, G, R.
    pub const BGR: Self = Self { b: 0, g: 1, r: 2 };
    /// R, G, B.
    pub const RGB: Self = Self { b: 2, g: 1, r: 0 };

    /// Channel order of a packed color tag, `None` for gray and planar formats.
    pub fn of(tag: PixelFormatTag) -> Option<Self> {
        use PixelFormatTag::*;
        match tag {
            Rgb | Rgbx | Rgba => Some(Self::RGB),
            Bgr | Bgrx | Bgra => Some(Self::BGR),
            Xrgb | Argb => Some(Self { b: 3, g: 2, r: 1 }),
            Xbgr | Abgr => Some(Self { b: 1, g: 2, r: 3 }),
            _ => None,
        }
    }
}

/// Dual thresholds for [`canny`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CannyThresholds {
    /// Gradients at or below this are never edges.
    pub low: i32,
    /// Gradients above this always seed an edge.
    pub high: i32,
}

impl Default for CannyThresholds {
    fn default() -> Self {
        Self { low: 60, high: 160 }
    }
}

fn try_filled<T: Clone>(len: usize, value: T, what: &str) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|e| Error::AllocationFailed(format!("{what} ({len} elements): {e}")))?;
    v.resize(len, value);
    Ok(v)
}

/// Working memory for [`median_blur_3x3`] and [`canny`], sized once per frame shape.
#[derive(Debug)]
pub struct EdgeWorkspace {
    width: usize,
    height: usize,
    rows: Vec<u8>,
    dx: Vec<i16>,
    dy: Vec<i16>,
    mag: Vec<i32>,
    stack: Vec<u32>,
}

impl EdgeWorkspace {
    /// Allocate for `width` x `height` frames.
    pub fn new(width: usize, height: usize) -> Result<Self> {
        let len = width * height;
        let mut stack = Vec::new();
        stack
            .try_reserve_exact(len)
            .map_err(|e| Error::AllocationFailed(format!("edge stack: {e}")))?;
        Ok(Self {
            width,
            height,
            rows: try_filled(2 * width, 0, "median rows")?,
            dx: try_filled(len, 0, "sobel dx")?,
            dy: try_filled(len, 0, "sobel dy")?,
            mag: try_filled(len, 0, "gradient magnitude")?,
            stack,
        })
    }

    fn fits(&self, plane: &Plane) -> bool {
        plane.width() == self.width && plane.height() == self.height
    }
}

/// Convert a 3- or 4-channel 8-bit view to luma.
///
/// `order` says where blue, green and red sit inside each pixel.
pub fn to_gray(src: &FrameView<'_>, order: ChannelOrder, dst: &mut [u8]) {
    let bpp = src.desc().layout().bytes_per_pixel();
    debug_assert!(matches!(
        src.desc().layout(),
        ChannelLayout::C3U8 | ChannelLayout::C4U8
    ));
    debug_assert!(dst.len() >= src.width() * src.height());

    for (px, out) in src.as_bytes().chunks_exact(bpp).zip(dst.iter_mut()) {
        let sum = px[order.b] as u32 * LUMA_B
            + px[order.g] as u32 * LUMA_G
            + px[order.r] as u32 * LUMA_R;
        *out = ((sum + (1 << (LUMA_SHIFT - 1))) >> LUMA_SHIFT) as u8;
    }
}

/// 3x3 median filter, in place.
pub fn median_blur_3x3(plane: &mut Plane, ws: &mut EdgeWorkspace) {
    debug_assert!(ws.fits(plane));
    let (w, h) = (plane.width(), plane.height());
    let (prev, cur) = ws.rows.split_at_mut(w);
    let buf = plane.as_mut_slice();

    prev.copy_from_slice(&buf[..w]);
    for y in 0..h {
        cur.copy_from_slice(&buf[y * w..(y + 1) * w]);
        let (head, tail) = buf.split_at_mut((y + 1) * w);
        let below: &[u8] = if tail.is_empty() { cur } else { &tail[..w] };
        let out = &mut head[y * w..];

        for x in 0..w {
            let xl = x.saturating_sub(1);
            let xr = (x + 1).min(w - 1);
            let mut win = [
                prev[xl], prev[x], prev[xr], cur[xl], cur[x], cur[xr], below[xl], below[x],
                below[xr],
            ];
            win.sort_unstable();
            out[x] = win[4];
        }
        prev.copy_from_slice(cur);
    }
}

/// Dual-threshold edge detector with a 3x3 Sobel aperture and L1 gradient.
///
/// Writes 255 at edge pixels and 0 elsewhere.
pub fn canny(src: &Plane, dst: &mut Plane, thresholds: CannyThresholds, ws: &mut EdgeWorkspace) {
    debug_assert!(ws.fits(src) && ws.fits(dst));
    let (w, h) = (src.width(), src.height());
    let gray = src.as_slice();

    for y in 0..h {
        let r0 = &gray[y.saturating_sub(1) * w..][..w];
        let r1 = &gray[y * w..][..w];
        let r2 = &gray[(y + 1).min(h - 1) * w..][..w];
        for x in 0..w {
            let xl = x.saturating_sub(1);
            let xr = (x + 1).min(w - 1);
            let gx = (r0[xr] as i32 + 2 * r1[xr] as i32 + r2[xr] as i32)
                - (r0[xl] as i32 + 2 * r1[xl] as i32 + r2[xl] as i32);
            let gy = (r2[xl] as i32 + 2 * r2[x] as i32 + r2[xr] as i32)
                - (r0[xl] as i32 + 2 * r0[x] as i32 + r0[xr] as i32);
            let i = y * w + x;
            ws.dx[i] = gx as i16;
            ws.dy[i] = gy as i16;
            ws.mag[i] = gx.abs() + gy.abs();
        }
    }

    let mag = &ws.mag;
    let at = |x: isize, y: isize| -> i32 {
        if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
            0
        } else {
            mag[y as usize * w + x as usize]
        }
    };

    let map = dst.as_mut_slice();
    map.fill(EDGE_NONE);
    ws.stack.clear();

    for y in 0..h {
        for x in 0..w {
            let i = y * w + x;
            let m = mag[i];
            if m <= thresholds.low {
                continue;
            }
            let (gx, gy) = (ws.dx[i] as i32, ws.dy[i] as i32);
            let (xi, yi) = (x as isize, y as isize);
            let tg22x = gx.abs() * TAN_22_5;
            let ys = gy.abs() << 15;

            let is_peak = if ys < tg22x {
                m > at(xi - 1, yi) && m >= at(xi + 1, yi)
            } else if ys > tg22x + (gx.abs() << 16) {
                m > at(xi, yi - 1) && m >= at(xi, yi + 1)
            } else {
                let s: isize = if (gx ^ gy) < 0 { -1 } else { 1 };
                m > at(xi - s, yi - 1) && m > at(xi + s, yi + 1)
            };

            if is_peak {
                if m > thresholds.high {
                    map[i] = EDGE_STRONG;
                    ws.stack.push(i as u32);
                } else {
                    map[i] = EDGE_WEAK;
                }
            }
        }
    }

    while let Some(i) = ws.stack.pop() {
        let (x, y) = ((i as usize) % w, (i as usize) / w);
        for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                let n = ny * w + nx;
                if map[n] == EDGE_WEAK {
                    map[n] = EDGE_STRONG;
                    ws.stack.push(n as u32);
                }
            }
        }
    }

    for v in map.iter_mut() {
        *v = if *v == EDGE_STRONG { 255 } else { 0 };
    }
}

/// Zero `dst`, then copy the pixels of `src` where `mask` is non-zero.
pub fn copy_masked(src: &FrameView<'_>, mask: &Plane, dst: &mut FrameViewMut<'_>) {
    debug_assert_eq!(src.desc(), dst.desc());
    let bpp = src.desc().layout().bytes_per_pixel();
    dst.fill(0);
    for ((s, d), &m) in src
        .as_bytes()
        .chunks_exact(bpp)
        .zip(dst.as_bytes_mut().chunks_exact_mut(bpp))
        .zip(mask.as_slice())
    {
        if m != 0 {
            d.copy_from_slice(s);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::PixelBufferDescriptor;

    fn plane_from(w: u32, h: u32, data: &[u8]) -> Plane {
        let mut p = Plane::new(w, h).unwrap();
        p.as_mut_slice().copy_from_slice(data);
        p
    }

    #[test]
    fn test_gray_weights() {
        let desc = PixelBufferDescriptor::new(ChannelLayout::C3U8, 3, 1).unwrap();
        let px = [255u8, 0, 0, 0, 255, 0, 0, 0, 255];
        let view = FrameView::new(desc, &px).unwrap();
        let mut gray = Plane::new(3, 1).unwrap();

        to_gray(&view, ChannelOrder::BGR, gray.as_mut_slice());
        assert_eq!(gray.as_slice(), &[29, 150, 76]);

        to_gray(&view, ChannelOrder::RGB, gray.as_mut_slice());
        assert_eq!(gray.as_slice(), &[76, 150, 29]);
    }

    #[test]
    fn test_gray_white_stays_white() {
        let desc = PixelBufferDescriptor::new(ChannelLayout::C4U8, 2, 1).unwrap();
        let px = [255u8; 8];
        let view = FrameView::new(desc, &px).unwrap();
        let mut gray = Plane::new(2, 1).unwrap();
        to_gray(
            &view,
            ChannelOrder::of(PixelFormatTag::Argb).unwrap(),
            gray.as_mut_slice(),
        );
        assert_eq!(gray.as_slice(), &[255, 255]);
    }

    #[test]
    fn test_median_removes_impulse() {
        let mut data = [10u8; 25];
        data[12] = 250;
        let mut plane = plane_from(5, 5, &data);
        let mut ws = EdgeWorkspace::new(5, 5).unwrap();
        median_blur_3x3(&mut plane, &mut ws);
        assert!(plane.as_slice().iter().all(|&v| v == 10));
    }

    #[test]
    fn test_median_keeps_step_edge() {
        let mut data = [0u8; 36];
        for y in 0..6 {
            for x in 3..6 {
                data[y * 6 + x] = 200;
            }
        }
        let mut plane = plane_from(6, 6, &data);
        let mut ws = EdgeWorkspace::new(6, 6).unwrap();
        median_blur_3x3(&mut plane, &mut ws);
        assert_eq!(plane.as_slice(), &data);
    }

    #[test]
    fn test_canny_flat_image_has_no_edges() {
        let src = plane_from(8, 8, &[128u8; 64]);
        let mut dst = Plane::new(8, 8).unwrap();
        let mut ws = EdgeWorkspace::new(8, 8).unwrap();
        canny(&src, &mut dst, CannyThresholds::default(), &mut ws);
        assert!(dst.as_slice().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_canny_vertical_step() {
        let (w, h) = (16usize, 8usize);
        let mut data = vec![0u8; w * h];
        for y in 0..h {
            for x in w / 2..w {
                data[y * w + x] = 255;
            }
        }
        let src = plane_from(w as u32, h as u32, &data);
        let mut dst = Plane::new(w as u32, h as u32).unwrap();
        let mut ws = EdgeWorkspace::new(w, h).unwrap();
        canny(&src, &mut dst, CannyThresholds::default(), &mut ws);

        let out = dst.as_slice();
        assert!(out.iter().all(|&v| v == 0 || v == 255));
        for y in 0..h {
            let row = &out[y * w..(y + 1) * w];
            // One-pixel-wide line at the step, nothing elsewhere.
            assert_eq!(row.iter().filter(|&&v| v == 255).count(), 1);
            assert_eq!(row[w / 2 - 1], 255);
        }
    }

    #[test]
    fn test_copy_masked() {
        let desc = PixelBufferDescriptor::new(ChannelLayout::C3U8, 2, 1).unwrap();
        let src = [1u8, 2, 3, 4, 5, 6];
        let mut out = [9u8; 6];
        let mask = plane_from(2, 1, &[0, 255]);
        let view = FrameView::new(desc, &src).unwrap();
        let mut out_view = FrameViewMut::new(desc, &mut out).unwrap();
        copy_masked(&view, &mask, &mut out_view);
        assert_eq!(out, [0, 0, 0, 4, 5, 6]);
    }
}
