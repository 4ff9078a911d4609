//! Opacity-filtered color sampling over a pixel buffer.

use crate::buffer::PixelBuffer;
use crate::color::Color;

/// Collect the RGB value of every pixel whose alpha is at least
/// `alpha_cutoff`, in raster scan order.
///
/// With `quantize_bin` set, each channel is first rounded to the nearest
/// multiple of the bin size, which keeps the number of distinct colors
/// small enough for frequency ranking.
pub fn sample_pixels(
    buffer: &PixelBuffer,
    alpha_cutoff: u8,
    quantize_bin: Option<u8>,
) -> Vec<Color> {
    let bin = quantize_bin.filter(|&b| b > 1);
    buffer
        .pixels()
        .filter(|p| p[3] >= alpha_cutoff)
        .map(|p| match bin {
            Some(bin) => Color::new(
                quantize_channel(p[0], bin),
                quantize_channel(p[1], bin),
                quantize_channel(p[2], bin),
            ),
            None => Color::new(p[0], p[1], p[2]),
        })
        .collect()
}

/// Round a channel to the nearest multiple of `bin` (halves round up),
/// saturating at 255.
pub fn quantize_channel(value: u8, bin: u8) -> u8 {
    if bin <= 1 {
        return value;
    }
    let steps = (value as f64 / bin as f64).round();
    (steps * bin as f64).min(255.0) as u8
}
