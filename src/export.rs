use regex::Regex;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Result;
use crate::layers::{BlendMode, Layer, PathCommand, StencilDocument};

pub const COMBINED_FILE_NAME: &str = "stencil-layers-combined.svg";

const SVG_NS: &str = "http://www.w3.org/2000/svg";

static UNSAFE_FILE_CHARS: OnceLock<Regex> = OnceLock::new();

/// A single exported SVG file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvgFile {
    pub file_name: String,
    pub contents: String,
}

/// SVG `d` attribute for a traced path, e.g. `M0,0 L1,0 M0,1 L1,1`.
pub fn path_data(commands: &[PathCommand]) -> String {
    let mut out = String::with_capacity(commands.len() * 8);
    for (i, command) in commands.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{}", command);
    }
    out
}

/// Every layer in one SVG, each wrapped in `<g id="layer-N">` in paint order.
pub fn combined_svg(document: &StencilDocument) -> String {
    let mut out = svg_open(document.width, document.height);
    for (index, layer) in document.layers.iter().enumerate() {
        let _ = write!(
            out,
            "  <g id=\"layer-{}\" data-name=\"{}\"{}>\n    {}\n  </g>\n",
            index + 1,
            escape_xml(&layer.name),
            layer_attributes(layer),
            path_element(layer)
        );
    }
    out.push_str("</svg>\n");
    out
}

/// One standalone SVG per layer, named after the layer. A name already taken
/// (case-insensitively, including the combined file) gets `-N` appended,
/// starting at the layer number and counting up until it is free.
pub fn layer_svgs(document: &StencilDocument) -> Vec<SvgFile> {
    let mut used: HashSet<String> = HashSet::new();
    if let Some(combined_stem) = COMBINED_FILE_NAME.strip_suffix(".svg") {
        used.insert(combined_stem.to_ascii_lowercase());
    }
    document
        .layers
        .iter()
        .enumerate()
        .map(|(index, layer)| {
            let mut contents = svg_open(document.width, document.height);
            let _ = write!(
                contents,
                "  <g{}>\n    {}\n  </g>\n</svg>\n",
                layer_attributes(layer),
                path_element(layer)
            );
            let base = layer_file_stem(&layer.name, index);
            let mut stem = base.clone();
            let mut suffix = index + 1;
            while !used.insert(stem.to_ascii_lowercase()) {
                stem = format!("{}-{}", base, suffix);
                suffix += 1;
            }
            SvgFile {
                file_name: format!("{}.svg", stem),
                contents,
            }
        })
        .collect()
}

/// Write the combined SVG and every per-layer SVG into `dir`, creating it
/// if needed. Returns the written paths, combined file first.
pub fn write_svgs(dir: &Path, document: &StencilDocument) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(document.len() + 1);

    let combined = dir.join(COMBINED_FILE_NAME);
    write_file_atomic(&combined, combined_svg(document).as_bytes())?;
    written.push(combined);

    for file in layer_svgs(document) {
        let path = dir.join(&file.file_name);
        write_file_atomic(&path, file.contents.as_bytes())?;
        written.push(path);
    }

    log::info!(
        "Exported {} SVG files to {}",
        written.len(),
        dir.display()
    );
    Ok(written)
}

/// Write through a temp file in the same directory, then rename over `path`.
fn write_file_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let temp_name = format!(
        ".{}.{}.tmp",
        path.file_name()
            .and_then(|v| v.to_str())
            .unwrap_or("stencil-write"),
        stamp
    );
    let temp_path = path.with_file_name(temp_name);
    fs::write(&temp_path, contents)?;

    if let Err(rename_err) = fs::rename(&temp_path, path) {
        if !path.exists() {
            let _ = fs::remove_file(&temp_path);
            return Err(rename_err.into());
        }
        fs::remove_file(path)?;
        fs::rename(&temp_path, path)?;
    }
    Ok(())
}

/// Filesystem-safe stem for a layer name. Runs of characters outside
/// `[A-Za-z0-9_-]` collapse to one `-`; an empty result falls back to
/// `layer-N`.
pub fn layer_file_stem(name: &str, index: usize) -> String {
    let re = UNSAFE_FILE_CHARS
        .get_or_init(|| Regex::new(r"[^A-Za-z0-9_-]+").expect("file name pattern is valid"));
    let stem = re.replace_all(name.trim(), "-");
    let stem = stem.trim_matches('-');
    if stem.is_empty() {
        format!("layer-{}", index + 1)
    } else {
        stem.to_string()
    }
}

fn svg_open(width: u32, height: u32) -> String {
    format!(
        "<svg xmlns=\"{}\" width=\"{}\" height=\"{}\" viewBox=\"0 0 {} {}\">\n",
        SVG_NS, width, height, width, height
    )
}

fn layer_attributes(layer: &Layer) -> String {
    let mut attrs = String::new();
    if !layer.visible {
        attrs.push_str(" display=\"none\"");
    }
    if layer.blend_mode != BlendMode::Normal {
        let _ = write!(attrs, " style=\"mix-blend-mode:{}\"", layer.blend_mode.as_css());
    }
    attrs
}

fn path_element(layer: &Layer) -> String {
    format!(
        "<path fill=\"{}\" d=\"{}\"/>",
        layer.color.to_css(),
        path_data(&layer.path)
    )
}

fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::layers::assemble_layers;
    use PathCommand::{LineTo, MoveTo};

    fn document() -> StencilDocument {
        assemble_layers(
            2,
            2,
            &[Color::new(255, 0, 0), Color::new(0, 0, 255)],
            vec![
                vec![
                    MoveTo { x: 0, y: 0 },
                    LineTo { x: 1, y: 0 },
                    MoveTo { x: 0, y: 1 },
                    LineTo { x: 1, y: 1 },
                ],
                Vec::new(),
            ],
        )
    }

    #[test]
    fn test_path_data_format() {
        let doc = document();
        assert_eq!(path_data(&doc.layers[0].path), "M0,0 L1,0 M0,1 L1,1");
        assert_eq!(path_data(&[]), "");
    }

    #[test]
    fn test_combined_svg_groups_layers_in_order() {
        let mut doc = document();
        doc.set_visible(1, false).unwrap();
        doc.set_blend_mode(0, BlendMode::Multiply).unwrap();
        let svg = combined_svg(&doc);

        assert!(svg.starts_with("<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"2\" height=\"2\" viewBox=\"0 0 2 2\">"));
        let first = svg.find("id=\"layer-1\"").expect("layer 1 group");
        let second = svg.find("id=\"layer-2\"").expect("layer 2 group");
        assert!(first < second);
        assert!(svg.contains("style=\"mix-blend-mode:multiply\""));
        assert!(svg.contains("<path fill=\"rgb(255,0,0)\" d=\"M0,0 L1,0 M0,1 L1,1\"/>"));
        assert!(svg.contains("data-name=\"Layer 2\" display=\"none\""));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn test_layer_names_are_escaped() {
        let mut doc = document();
        doc.rename(0, "<Sky & \"Sea\">").unwrap();
        let svg = combined_svg(&doc);
        assert!(svg.contains("data-name=\"&lt;Sky &amp; &quot;Sea&quot;&gt;\""));
    }

    #[test]
    fn test_layer_files_use_safe_names() {
        let mut doc = document();
        doc.rename(0, "Sky / Clouds?").unwrap();
        doc.rename(1, "  ***  ").unwrap();
        let files = layer_svgs(&doc);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].file_name, "Sky-Clouds.svg");
        assert_eq!(files[1].file_name, "layer-2.svg");
        assert!(files[1].contents.contains("fill=\"rgb(0,0,255)\""));
    }

    #[test]
    fn test_repeated_layer_names_stay_distinct() {
        let mut doc = document();
        doc.rename(0, "Ink").unwrap();
        doc.rename(1, "ink").unwrap();
        let names: Vec<String> = layer_svgs(&doc).into_iter().map(|f| f.file_name).collect();
        assert_eq!(names, ["Ink.svg", "ink-2.svg"]);
    }

    #[test]
    fn test_suffixed_names_never_collide_with_real_names() {
        let mut doc = assemble_layers(
            2,
            2,
            &[Color::new(1, 1, 1), Color::new(2, 2, 2), Color::new(3, 3, 3)],
            vec![Vec::new(), Vec::new(), Vec::new()],
        );
        doc.rename(0, "A").unwrap();
        doc.rename(1, "A-3").unwrap();
        doc.rename(2, "A").unwrap();
        let names: Vec<String> = layer_svgs(&doc).into_iter().map(|f| f.file_name).collect();
        assert_eq!(names, ["A.svg", "A-3.svg", "A-4.svg"]);
    }

    #[test]
    fn test_layer_cannot_take_combined_file_name() {
        let mut doc = document();
        doc.rename(0, "stencil-layers-combined").unwrap();
        let files = layer_svgs(&doc);
        assert_eq!(files[0].file_name, "stencil-layers-combined-1.svg");
        assert!(files.iter().all(|f| f.file_name != COMBINED_FILE_NAME));

        let dir = std::env::temp_dir().join(format!("stencil-combined-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let paths = write_svgs(&dir, &doc).expect("export");
        let distinct: HashSet<&PathBuf> = paths.iter().collect();
        assert_eq!(distinct.len(), paths.len());
        let combined = fs::read_to_string(dir.join(COMBINED_FILE_NAME)).unwrap();
        assert!(combined.contains("id=\"layer-2\""));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_write_svgs_creates_files() {
        let dir = std::env::temp_dir().join(format!("stencil-export-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);

        let doc = document();
        let paths = write_svgs(&dir, &doc).expect("export");
        assert_eq!(paths.len(), 3);
        assert!(paths[0].ends_with(COMBINED_FILE_NAME));
        assert_eq!(fs::read_to_string(&paths[0]).unwrap(), combined_svg(&doc));
        assert!(paths[1].ends_with("Layer-1.svg"));

        // second export overwrites in place
        write_svgs(&dir, &doc).expect("re-export");
        let leftovers = fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_default_names_map_to_dashed_stems() {
        assert_eq!(layer_file_stem("Layer 3", 2), "Layer-3");
        assert_eq!(layer_file_stem("", 0), "layer-1");
    }
}
