use image::{DynamicImage, ImageFormat, RgbaImage};

use crate::error::{Result, StencilError};

/// Largest encoded image accepted by [`PixelBuffer::decode`].
pub const MAX_ENCODED_BYTES: usize = 5 * 1024 * 1024;

/// A decoded RGBA8 image in row-major order.
///
/// The pipeline only ever reads from a buffer; a run never mutates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap raw RGBA samples, failing fast on zero dimensions or a sample
    /// array whose length is not `width * height * 4`.
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(StencilError::InvalidInput(format!(
                "image dimensions must be non-zero, got {width}x{height}"
            )));
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| {
                StencilError::InvalidInput(format!("image {width}x{height} is too large"))
            })?;
        if rgba.len() != expected {
            return Err(StencilError::InvalidInput(format!(
                "buffer size mismatch: expected {expected} bytes for {width}x{height}, got {}",
                rgba.len()
            )));
        }
        Ok(Self {
            width,
            height,
            rgba,
        })
    }

    pub fn from_rgba_image(image: RgbaImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw())
    }

    /// Decode PNG or JPEG bytes. Anything larger than [`MAX_ENCODED_BYTES`]
    /// or in another format is rejected before decoding.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_ENCODED_BYTES {
            return Err(StencilError::TooLarge {
                size: bytes.len(),
                limit: MAX_ENCODED_BYTES,
            });
        }
        match image::guess_format(bytes) {
            Ok(ImageFormat::Png) | Ok(ImageFormat::Jpeg) => {}
            _ => return Err(StencilError::UnsupportedFormat),
        }
        let decoded: DynamicImage = image::load_from_memory(bytes)?;
        Self::from_rgba_image(decoded.to_rgba8())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.rgba
    }

    /// RGBA samples at `(x, y)`. Callers stay within the image bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.rgba[i],
            self.rgba[i + 1],
            self.rgba[i + 2],
            self.rgba[i + 3],
        ]
    }

    /// Pixels in raster scan order.
    pub fn pixels(&self) -> impl Iterator<Item = [u8; 4]> + '_ {
        self.rgba
            .chunks_exact(4)
            .map(|p| [p[0], p[1], p[2], p[3]])
    }

    /// One row of RGBA samples.
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.width as usize * 4;
        let start = y as usize * stride;
        &self.rgba[start..start + stride]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::io::Cursor;

    #[test]
    fn test_rejects_zero_dimensions() {
        let err = PixelBuffer::new(0, 4, Vec::new()).unwrap_err();
        assert!(matches!(err, StencilError::InvalidInput(_)));
    }

    #[test]
    fn test_rejects_length_mismatch() {
        let err = PixelBuffer::new(2, 2, vec![0u8; 15]).unwrap_err();
        assert!(matches!(err, StencilError::InvalidInput(_)));
    }

    #[test]
    fn test_pixel_addressing() {
        let mut rgba = vec![0u8; 3 * 2 * 4];
        let i = (1 * 3 + 2) * 4;
        rgba[i..i + 4].copy_from_slice(&[9, 8, 7, 6]);
        let buffer = PixelBuffer::new(3, 2, rgba).unwrap();
        assert_eq!(buffer.pixel(2, 1), [9, 8, 7, 6]);
        assert_eq!(buffer.pixels().count(), 6);
        assert_eq!(buffer.row(1).len(), 12);
    }

    #[test]
    fn test_decode_png_roundtrip_dimensions() {
        let img = RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 255]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("png encode");

        let buffer = PixelBuffer::decode(&bytes).expect("decode");
        assert_eq!((buffer.width(), buffer.height()), (3, 2));
        assert_eq!(buffer.pixel(0, 0), [10, 20, 30, 255]);
    }

    #[test]
    fn test_decode_rejects_unknown_format() {
        let err = PixelBuffer::decode(b"not an image").unwrap_err();
        assert!(matches!(err, StencilError::UnsupportedFormat));
    }

    #[test]
    fn test_decode_rejects_oversized_input() {
        let bytes = vec![0u8; MAX_ENCODED_BYTES + 1];
        let err = PixelBuffer::decode(&bytes).unwrap_err();
        assert!(matches!(err, StencilError::TooLarge { .. }));
    }
}
