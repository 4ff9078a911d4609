pub mod buffer;
pub mod color;
pub mod edges;
pub mod error;
pub mod export;
pub mod grouping;
pub mod layers;
pub mod pipeline;
pub mod quantizer;
pub mod sampler;
pub mod tracer;

pub use buffer::PixelBuffer;
pub use color::Color;
pub use error::{Result, StencilError};
pub use export::{combined_svg, layer_svgs, path_data, write_svgs, SvgFile};
pub use layers::{BlendMode, Layer, PathCommand, StencilDocument};
pub use pipeline::{
    process, CancelToken, PerfStats, PipelineOutput, ProgressSink, Stage, StencilConfig,
    StencilPreset, StencilSession,
};
pub use quantizer::QuantizeStrategy;

use std::fs;
use std::path::Path;

/// Convert encoded image bytes into stencil layers.
///
/// Performs, in order:
/// - PNG/JPEG validation and decoding to RGBA
/// - Color sampling and quantization (frequency or k-means)
/// - Grouping of similar colors and per-color run tracing
///
/// # Arguments
/// * `image_bytes` - Encoded PNG or JPEG, at most 5 MiB
/// * `config` - Quantization and tracing parameters
///
/// # Returns
/// PipelineOutput containing the layer document, optional edge map, timings
/// and cache key
pub fn process_stencil(image_bytes: &[u8], config: &StencilConfig) -> Result<PipelineOutput> {
    log::info!(
        "Processing stencil: {} bytes, {:?}, {} colors max",
        image_bytes.len(),
        config.strategy,
        config.max_colors
    );

    let buffer = PixelBuffer::decode(image_bytes)?;
    let output = process(&buffer, config, None, None)?;

    log::info!(
        "Stencil processed: {}x{}, {} layers, {}ms",
        output.document.width,
        output.document.height,
        output.document.len(),
        output.perf.total_ms
    );

    Ok(output)
}

/// Convert an image on disk into stencil layers.
///
/// Alternative to [`process_stencil`] when the image is already a file.
pub fn process_stencil_from_file(
    file_path: impl AsRef<Path>,
    config: &StencilConfig,
) -> Result<PipelineOutput> {
    let file_path = file_path.as_ref();
    log::info!("Processing stencil from file: {}", file_path.display());
    let bytes = fs::read(file_path)?;
    process_stencil(&bytes, config)
}
