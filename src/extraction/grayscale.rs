//! Grayscale reduction.
//!
//! Frames are area-averaged down to a small square so that feature
//! length depends on the configured resolution rather than the camera.
//! Optional bit reduction keeps only the low-order bits of each value,
//! where sensor noise lives.

use crate::capture::Frame;

/// A reduced grayscale image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayImage {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl GrayImage {
    pub fn new(width: usize, height: usize, data: Vec<u8>) -> Self {
        debug_assert_eq!(width * height, data.len());
        Self {
            width,
            height,
            data,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub(crate) fn at(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }
}

/// Area-averages `frame` into a `size x size` image.
///
/// When `size` is 0 the frame is kept at native resolution. When the
/// target is larger than the source along an axis, the nearest source
/// pixel is repeated.
pub fn reduce(frame: &Frame, size: u32, lsb_bits: u8) -> GrayImage {
    let (src_w, src_h) = (frame.width() as usize, frame.height() as usize);
    let (dst_w, dst_h) = if size == 0 {
        (src_w, src_h)
    } else {
        (size as usize, size as usize)
    };

    let mut data = Vec::with_capacity(dst_w * dst_h);
    for oy in 0..dst_h {
        let (y0, y1) = span(oy, dst_h, src_h);
        for ox in 0..dst_w {
            let (x0, x1) = span(ox, dst_w, src_w);
            let mut sum = 0u64;
            for y in y0..y1 {
                let row = &frame.pixels()[y * src_w..(y + 1) * src_w];
                sum += row[x0..x1].iter().map(|&p| p as u64).sum::<u64>();
            }
            let count = ((y1 - y0) * (x1 - x0)) as u64;
            // Round half up, matching area interpolation.
            data.push(((sum + count / 2) / count) as u8);
        }
    }

    if lsb_bits < 8 {
        let mask = ((1u16 << lsb_bits) - 1) as u8;
        data.iter_mut().for_each(|v| *v &= mask);
    }

    GrayImage::new(dst_w, dst_h, data)
}

/// Source index range `[start, end)` covered by output cell `i`.
fn span(i: usize, dst: usize, src: usize) -> (usize, usize) {
    let start = i * src / dst;
    let end = ((i + 1) * src / dst).max(start + 1).min(src);
    (start.min(src - 1), end)
}
