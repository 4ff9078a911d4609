//! Normalized Sobel edge strength, an optional hint for boundary tracing.

use image::{GrayImage, Luma};
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use rayon::prelude::*;

use crate::buffer::PixelBuffer;

/// Magnitudes below this fraction of the strongest edge are zeroed.
pub const EDGE_FLOOR: f32 = 0.2;

/// Per-pixel edge strength in `[0, 1]`, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeMap {
    pub width: u32,
    pub height: u32,
    pub values: Vec<f32>,
}

impl EdgeMap {
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.values[y as usize * self.width as usize + x as usize]
    }

    /// Pixels that survived the noise floor.
    pub fn edge_pixel_count(&self) -> usize {
        self.values.iter().filter(|v| **v > 0.0).count()
    }
}

/// Sobel gradient magnitude over the red channel, normalized by the maximum
/// magnitude in the image.
///
/// The one-pixel border is left at zero. Interior pixels whose magnitude does
/// not exceed [`EDGE_FLOOR`] times the maximum are zeroed as well.
pub fn detect_edges(buffer: &PixelBuffer) -> EdgeMap {
    let width = buffer.width();
    let height = buffer.height();
    let red = GrayImage::from_fn(width, height, |x, y| Luma([buffer.pixel(x, y)[0]]));
    let gx = horizontal_sobel(&red);
    let gy = vertical_sobel(&red);
    let gx = gx.as_raw();
    let gy = gy.as_raw();

    let magnitudes: Vec<f32> = (0..buffer.pixel_count())
        .into_par_iter()
        .map(|i| {
            let x = (i % width as usize) as u32;
            let y = (i / width as usize) as u32;
            if x == 0 || y == 0 || x + 1 >= width || y + 1 >= height {
                return 0.0;
            }
            let dx = gx[i] as f32;
            let dy = gy[i] as f32;
            (dx * dx + dy * dy).sqrt()
        })
        .collect();

    let max = magnitudes.iter().copied().fold(0.0f32, f32::max);
    let values = if max > 0.0 {
        let floor = max * EDGE_FLOOR;
        magnitudes
            .par_iter()
            .map(|&m| if m > floor { (m / max).min(1.0) } else { 0.0 })
            .collect()
    } else {
        vec![0.0; magnitudes.len()]
    };

    EdgeMap {
        width,
        height,
        values,
    }
}
