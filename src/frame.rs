//! Non-owning frame views and owned scratch planes.
//!
//! A [`FrameView`] / [`FrameViewMut`] shapes a borrowed byte region with a
//! [`PixelBufferDescriptor`]. The borrow ties the view to the call that built
//! it, so a filter can never keep a view past the frame it was handed.
//!
//! Rows are tightly packed: `stride == width * bytes_per_pixel`.

use crate::error::{Error, Result};
use crate::format::{ChannelLayout, PixelBufferDescriptor};

fn check_len(desc: &PixelBufferDescriptor, len: usize) -> Result<()> {
    if len < desc.frame_len() {
        return Err(Error::InvalidFrame(format!(
            "{}x{} {:?} frame needs {} bytes, region has {}",
            desc.width(),
            desc.height(),
            desc.layout(),
            desc.frame_len(),
            len
        )));
    }
    Ok(())
}

/// Read-only view over one frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameView<'a> {
    desc: PixelBufferDescriptor,
    data: &'a [u8],
}

impl<'a> FrameView<'a> {
    /// Build a view over `data`. Bytes past the frame length are ignored.
    pub fn new(desc: PixelBufferDescriptor, data: &'a [u8]) -> Result<Self> {
        check_len(&desc, data.len())?;
        Ok(Self {
            desc,
            data: &data[..desc.frame_len()],
        })
    }

    /// Frame shape.
    #[inline]
    pub fn desc(&self) -> &PixelBufferDescriptor {
        &self.desc
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> usize {
        self.desc.width() as usize
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> usize {
        self.desc.height() as usize
    }

    /// Bytes per row.
    #[inline]
    pub fn stride(&self) -> usize {
        self.desc.stride()
    }

    /// The whole frame.
    #[inline]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Row `y`.
    #[inline]
    pub fn row(&self, y: usize) -> &'a [u8] {
        let stride = self.stride();
        &self.data[y * stride..(y + 1) * stride]
    }

    /// Bytes of the pixel at (`x`, `y`).
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> &'a [u8] {
        let bpp = self.desc.layout().bytes_per_pixel();
        let start = y * self.stride() + x * bpp;
        &self.data[start..start + bpp]
    }
}

/// Writable view over one frame.
#[derive(Debug)]
pub struct FrameViewMut<'a> {
    desc: PixelBufferDescriptor,
    data: &'a mut [u8],
}

impl<'a> FrameViewMut<'a> {
    /// Build a writable view over `data`.
    pub fn new(desc: PixelBufferDescriptor, data: &'a mut [u8]) -> Result<Self> {
        check_len(&desc, data.len())?;
        let len = desc.frame_len();
        Ok(Self {
            desc,
            data: &mut data[..len],
        })
    }

    /// Frame shape.
    #[inline]
    pub fn desc(&self) -> &PixelBufferDescriptor {
        &self.desc
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> usize {
        self.desc.width() as usize
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> usize {
        self.desc.height() as usize
    }

    /// Bytes per row.
    #[inline]
    pub fn stride(&self) -> usize {
        self.desc.stride()
    }

    /// The whole frame.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..]
    }

    /// The whole frame, writable.
    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data[..]
    }

    /// Row `y`, writable.
    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        let stride = self.stride();
        &mut self.data[y * stride..(y + 1) * stride]
    }

    /// Set every byte of the frame.
    pub fn fill(&mut self, value: u8) {
        self.data.fill(value);
    }

    /// Reborrow as a read-only view.
    pub fn as_view(&self) -> FrameView<'_> {
        FrameView {
            desc: self.desc,
            data: &self.data[..],
        }
    }
}

/// Owned single-channel 8-bit working buffer.
///
/// Allocation is fallible so a failed scratch allocation surfaces as
/// [`Error::AllocationFailed`] instead of aborting.
#[derive(Debug, Clone)]
pub struct Plane {
    desc: PixelBufferDescriptor,
    data: Vec<u8>,
}

impl Plane {
    /// Allocate a zeroed `width` x `height` plane.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let desc = PixelBufferDescriptor::new(ChannelLayout::C1U8, width, height)?;
        let len = desc.frame_len();
        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|e| {
            Error::AllocationFailed(format!("{width}x{height} plane ({len} bytes): {e}"))
        })?;
        data.resize(len, 0);
        Ok(Self { desc, data })
    }

    /// Plane shape.
    #[inline]
    pub fn desc(&self) -> &PixelBufferDescriptor {
        &self.desc
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> usize {
        self.desc.width() as usize
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> usize {
        self.desc.height() as usize
    }

    /// Plane bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Plane bytes, writable.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Read-only view over the plane.
    pub fn view(&self) -> FrameView<'_> {
        FrameView {
            desc: self.desc,
            data: &self.data,
        }
    }

    /// Writable view over the plane.
    pub fn view_mut(&mut self) -> FrameViewMut<'_> {
        FrameViewMut {
            desc: self.desc,
            data: &mut self.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb(w: u32, h: u32) -> PixelBufferDescriptor {
        PixelBufferDescriptor::new(ChannelLayout::C3U8, w, h).unwrap()
    }

    #[test]
    fn test_view_rows_and_pixels() {
        let data: Vec<u8> = (0..24).collect();
        let view = FrameView::new(rgb(4, 2), &data).unwrap();
        assert_eq!(view.stride(), 12);
        assert_eq!(view.row(1)[0], 12);
        assert_eq!(view.pixel(1, 1), &[15, 16, 17]);
    }

    #[test]
    fn test_view_rejects_short_region() {
        let data = vec![0u8; 23];
        let err = FrameView::new(rgb(4, 2), &data).unwrap_err();
        assert!(matches!(err, Error::InvalidFrame(_)));
    }

    #[test]
    fn test_view_ignores_trailing_bytes() {
        let mut data = vec![1u8; 30];
        let mut view = FrameViewMut::new(rgb(4, 2), &mut data).unwrap();
        view.fill(0);
        assert_eq!(view.as_bytes().len(), 24);
        assert_eq!(&data[24..], &[1u8; 6]);
    }

    #[test]
    fn test_plane_allocation() {
        let mut plane = Plane::new(640, 480).unwrap();
        assert_eq!(plane.as_slice().len(), 640 * 480);
        assert!(plane.as_slice().iter().all(|&b| b == 0));
        plane.view_mut().row_mut(2)[3] = 9;
        assert_eq!(plane.view().pixel(3, 2), &[9]);
        assert!(Plane::new(0, 4).is_err());
    }
}
