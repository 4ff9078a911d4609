use palette::Srgb;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StencilError};

/// An opaque 8-bit RGB color. Colors are compared by Euclidean distance in
/// RGB space.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Euclidean distance to another color.
    pub fn distance(self, other: Color) -> f64 {
        self.distance_to(other.channels())
    }

    /// Euclidean distance to a fractional point in RGB space, e.g. a
    /// k-means centroid that has not been rounded yet.
    pub fn distance_to(self, point: [f64; 3]) -> f64 {
        squared_distance(self.channels(), point).sqrt()
    }

    /// Channel sum used to order colors from light to dark.
    pub fn brightness(self) -> u32 {
        self.r as u32 + self.g as u32 + self.b as u32
    }

    pub fn channels(self) -> [f64; 3] {
        [self.r as f64, self.g as f64, self.b as f64]
    }

    /// Round a fractional RGB point to the nearest color, clamping each
    /// channel into `0..=255`.
    pub fn from_channels(channels: [f64; 3]) -> Self {
        let round = |v: f64| v.round().clamp(0.0, 255.0) as u8;
        Self::new(round(channels[0]), round(channels[1]), round(channels[2]))
    }

    /// Uppercase `#RRGGBB` form.
    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Parse `#rrggbb` or `#rgb` (leading `#` optional).
    pub fn from_hex(hex: &str) -> Result<Self> {
        let parsed: Srgb<u8> = hex
            .trim()
            .parse()
            .map_err(|e| StencilError::InvalidColor(format!("{hex:?}: {e}")))?;
        Ok(parsed.into())
    }

    /// CSS `rgb(r,g,b)` notation, as written into exported SVG fills.
    pub fn to_css(self) -> String {
        format!("rgb({},{},{})", self.r, self.g, self.b)
    }
}

impl From<Srgb<u8>> for Color {
    fn from(value: Srgb<u8>) -> Self {
        Self::new(value.red, value.green, value.blue)
    }
}

impl From<Color> for Srgb<u8> {
    fn from(value: Color) -> Self {
        Srgb::new(value.r, value.g, value.b)
    }
}

impl From<[u8; 3]> for Color {
    fn from(rgb: [u8; 3]) -> Self {
        Self::new(rgb[0], rgb[1], rgb[2])
    }
}

pub(crate) fn squared_distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    let dr = a[0] - b[0];
    let dg = a[1] - b[1];
    let db = a[2] - b[2];
    dr * dr + dg * dg + db * db
}
