use serde::{Deserialize, Serialize};
use std::fmt;

use crate::buffer::PixelBuffer;
use crate::color::Color;
use crate::error::{Result, StencilError};
use crate::tracer::trace_color;

/// One absolute path command in image pixel coordinates.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum PathCommand {
    MoveTo { x: u32, y: u32 },
    LineTo { x: u32, y: u32 },
}

impl PathCommand {
    pub fn point(self) -> (u32, u32) {
        match self {
            PathCommand::MoveTo { x, y } | PathCommand::LineTo { x, y } => (x, y),
        }
    }
}

impl fmt::Display for PathCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathCommand::MoveTo { x, y } => write!(f, "M{},{}", x, y),
            PathCommand::LineTo { x, y } => write!(f, "L{},{}", x, y),
        }
    }
}

/// Compositing tag for renderers. The pipeline never interprets it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
}

impl BlendMode {
    /// CSS `mix-blend-mode` keyword.
    pub fn as_css(self) -> &'static str {
        match self {
            BlendMode::Normal => "normal",
            BlendMode::Multiply => "multiply",
            BlendMode::Screen => "screen",
            BlendMode::Overlay => "overlay",
            BlendMode::Darken => "darken",
            BlendMode::Lighten => "lighten",
            BlendMode::ColorDodge => "color-dodge",
            BlendMode::ColorBurn => "color-burn",
            BlendMode::HardLight => "hard-light",
            BlendMode::SoftLight => "soft-light",
            BlendMode::Difference => "difference",
            BlendMode::Exclusion => "exclusion",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub color: Color,
    pub path: Vec<PathCommand>,
    pub visible: bool,
    pub name: String,
    pub blend_mode: BlendMode,
}

impl Layer {
    /// A visible, normally blended layer.
    pub fn new(name: impl Into<String>, color: Color, path: Vec<PathCommand>) -> Self {
        Self {
            color,
            path,
            visible: true,
            name: name.into(),
            blend_mode: BlendMode::Normal,
        }
    }
}

/// Ordered stencil layers over a canvas. Index 0 paints first.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StencilDocument {
    pub width: u32,
    pub height: u32,
    pub layers: Vec<Layer>,
}

/// Default display name of the layer at `index`.
pub fn default_layer_name(index: usize) -> String {
    format!("Layer {}", index + 1)
}

/// Pair colors with their traced paths, naming layers `Layer 1..N`.
/// Extra entries in the longer of the two lists are ignored.
pub fn assemble_layers(
    width: u32,
    height: u32,
    colors: &[Color],
    paths: Vec<Vec<PathCommand>>,
) -> StencilDocument {
    let layers = colors
        .iter()
        .zip(paths)
        .enumerate()
        .map(|(index, (color, path))| Layer::new(default_layer_name(index), *color, path))
        .collect();
    StencilDocument {
        width,
        height,
        layers,
    }
}

impl StencilDocument {
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layer(&self, index: usize) -> Result<&Layer> {
        let len = self.layers.len();
        self.layers
            .get(index)
            .ok_or(StencilError::IndexOutOfRange { index, len })
    }

    fn layer_mut(&mut self, index: usize) -> Result<&mut Layer> {
        let len = self.layers.len();
        self.layers
            .get_mut(index)
            .ok_or(StencilError::IndexOutOfRange { index, len })
    }

    /// Move the layer at `from` to `to`, shifting the layers in between.
    /// `reorder(b, a)` undoes `reorder(a, b)`.
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<()> {
        let len = self.layers.len();
        if from >= len {
            return Err(StencilError::IndexOutOfRange { index: from, len });
        }
        if to >= len {
            return Err(StencilError::IndexOutOfRange { index: to, len });
        }
        let moved = self.layers.remove(from);
        self.layers.insert(to, moved);
        Ok(())
    }

    pub fn rename(&mut self, index: usize, name: impl Into<String>) -> Result<()> {
        self.layer_mut(index)?.name = name.into();
        Ok(())
    }

    pub fn set_visible(&mut self, index: usize, visible: bool) -> Result<()> {
        self.layer_mut(index)?.visible = visible;
        Ok(())
    }

    pub fn set_blend_mode(&mut self, index: usize, mode: BlendMode) -> Result<()> {
        self.layer_mut(index)?.blend_mode = mode;
        Ok(())
    }

    /// Replace a layer's color and retrace its path against `buffer`.
    pub fn recolor(
        &mut self,
        index: usize,
        color: Color,
        buffer: &PixelBuffer,
        alpha_cutoff: u8,
        threshold: f64,
    ) -> Result<()> {
        let layer = self.layer_mut(index)?;
        layer.path = trace_color(color, buffer, alpha_cutoff, threshold);
        layer.color = color;
        Ok(())
    }

    /// [`recolor`](Self::recolor) from a `#rrggbb` string.
    pub fn recolor_hex(
        &mut self,
        index: usize,
        hex: &str,
        buffer: &PixelBuffer,
        alpha_cutoff: u8,
        threshold: f64,
    ) -> Result<()> {
        let color = Color::from_hex(hex)?;
        self.recolor(index, color, buffer, alpha_cutoff, threshold)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> StencilDocument {
        let colors = [
            Color::new(255, 0, 0),
            Color::new(0, 255, 0),
            Color::new(0, 0, 255),
        ];
        let paths = vec![
            vec![PathCommand::MoveTo { x: 0, y: 0 }, PathCommand::LineTo { x: 1, y: 0 }],
            vec![PathCommand::MoveTo { x: 0, y: 1 }, PathCommand::LineTo { x: 0, y: 1 }],
            Vec::new(),
        ];
        assemble_layers(2, 2, &colors, paths)
    }

    #[test]
    fn test_assemble_assigns_defaults() {
        let doc = sample_document();
        assert_eq!(doc.len(), 3);
        let names: Vec<&str> = doc.layers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["Layer 1", "Layer 2", "Layer 3"]);
        assert!(doc.layers.iter().all(|l| l.visible));
        assert!(doc.layers.iter().all(|l| l.blend_mode == BlendMode::Normal));
    }

    #[test]
    fn test_reorder_moves_and_shifts() {
        let mut doc = sample_document();
        doc.rename(0, "Sky").unwrap();
        doc.reorder(0, 2).unwrap();
        let names: Vec<&str> = doc.layers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["Layer 2", "Layer 3", "Sky"]);
        assert_eq!(doc.layers[2].color, Color::new(255, 0, 0));
        assert_eq!(doc.layers[2].path.len(), 2);
    }

    #[test]
    fn test_reorder_back_restores_sequence() {
        let original = sample_document();
        for (from, to) in [(0, 2), (2, 0), (1, 2), (1, 1)] {
            let mut doc = original.clone();
            doc.reorder(from, to).unwrap();
            doc.reorder(to, from).unwrap();
            assert_eq!(doc, original);
        }
    }

    #[test]
    fn test_out_of_range_indices_fail() {
        let mut doc = sample_document();
        assert!(matches!(
            doc.reorder(3, 0),
            Err(StencilError::IndexOutOfRange { index: 3, len: 3 })
        ));
        assert!(matches!(
            doc.reorder(0, 5),
            Err(StencilError::IndexOutOfRange { index: 5, len: 3 })
        ));
        assert!(doc.rename(9, "x").is_err());
        assert!(doc.set_visible(3, false).is_err());
        assert!(doc.set_blend_mode(3, BlendMode::Multiply).is_err());
        assert_eq!(doc, sample_document());
    }

    #[test]
    fn test_flag_updates() {
        let mut doc = sample_document();
        doc.set_visible(1, false).unwrap();
        doc.set_blend_mode(1, BlendMode::ColorBurn).unwrap();
        assert!(!doc.layers[1].visible);
        assert_eq!(doc.layers[1].blend_mode, BlendMode::ColorBurn);
    }

    #[test]
    fn test_recolor_retraces_path() {
        let rgba = [[0u8, 0, 255, 255], [255, 0, 0, 255], [0, 0, 255, 255], [0, 0, 255, 255]]
            .concat();
        let buffer = PixelBuffer::new(2, 2, rgba).unwrap();
        let mut doc = sample_document();
        doc.recolor_hex(2, "#0000FF", &buffer, 128, 10.0).unwrap();
        assert_eq!(doc.layers[2].color, Color::new(0, 0, 255));
        assert_eq!(
            doc.layers[2].path,
            vec![
                PathCommand::MoveTo { x: 0, y: 0 },
                PathCommand::LineTo { x: 0, y: 0 },
                PathCommand::MoveTo { x: 0, y: 1 },
                PathCommand::LineTo { x: 1, y: 1 },
            ]
        );
        assert!(doc.recolor(3, Color::BLACK, &buffer, 128, 10.0).is_err());
    }

    #[test]
    fn test_json_shape() {
        let doc = sample_document();
        let json = doc.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["layers"][0]["path"][0]["op"], "moveTo");
        assert_eq!(value["layers"][0]["path"][1]["op"], "lineTo");
        assert_eq!(value["layers"][0]["blendMode"], "normal");
        assert_eq!(value["layers"][0]["color"]["r"], 255);
        assert_eq!(StencilDocument::from_json(&json).unwrap(), doc);
    }
}
