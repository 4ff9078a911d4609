use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::buffer::PixelBuffer;
use crate::color::Color;
use crate::edges::{detect_edges, EdgeMap};
use crate::error::{Result, StencilError};
use crate::grouping::grouped_colors;
use crate::layers::{assemble_layers, BlendMode, StencilDocument};
use crate::quantizer::{quantize, QuantizeStrategy};
use crate::sampler::sample_pixels;
use crate::tracer::trace_color;

const PIPELINE_CACHE_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StencilConfig {
    /// Upper bound on the number of layers.
    pub max_colors: usize,
    /// RGB distance used for grouping, k-means deduplication and tracing.
    pub color_threshold: f64,
    pub alpha_cutoff: u8,
    pub strategy: QuantizeStrategy,
    pub kmeans_iterations: usize,
    /// Fixed seed for reproducible k-means runs.
    pub kmeans_seed: Option<u64>,
    /// Channel bin size applied before sampling.
    pub quantize_bin: Option<u8>,
    /// Also compute the edge strength map.
    pub edge_assist: bool,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StencilPreset {
    Classic,
    FineGrained,
    Photographic,
}

impl StencilConfig {
    /// Classic: exact-color frequency ranking with coarse grouping.
    pub fn classic() -> Self {
        Self {
            max_colors: 50,
            color_threshold: 50.0,
            alpha_cutoff: 128,
            strategy: QuantizeStrategy::Frequency,
            kmeans_iterations: 10,
            kmeans_seed: None,
            quantize_bin: None,
            edge_assist: false,
        }
    }

    /// FineGrained: frequency ranking over 5-level bins, tight threshold,
    /// semi-transparent pixels skipped.
    pub fn fine_grained() -> Self {
        Self {
            color_threshold: 15.0,
            alpha_cutoff: 220,
            quantize_bin: Some(5),
            ..Self::classic()
        }
    }

    /// Photographic: k-means clustering with edge assist.
    pub fn photographic() -> Self {
        Self {
            max_colors: 32,
            color_threshold: 15.0,
            alpha_cutoff: 220,
            strategy: QuantizeStrategy::Kmeans,
            edge_assist: true,
            ..Self::classic()
        }
    }

    pub fn from_preset(preset: StencilPreset) -> Self {
        match preset {
            StencilPreset::Classic => Self::classic(),
            StencilPreset::FineGrained => Self::fine_grained(),
            StencilPreset::Photographic => Self::photographic(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.color_threshold.is_finite() || self.color_threshold < 0.0 {
            return Err(StencilError::InvalidConfig(format!(
                "colorThreshold must be a non-negative number, got {}",
                self.color_threshold
            )));
        }
        if self.quantize_bin == Some(0) {
            return Err(StencilError::InvalidConfig(
                "quantizeBin must be at least 1".to_string(),
            ));
        }
        if self.strategy == QuantizeStrategy::Kmeans && self.kmeans_iterations == 0 {
            return Err(StencilError::InvalidConfig(
                "kmeansIterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for StencilConfig {
    fn default() -> Self {
        Self::classic()
    }
}

/// Progress reported at each suspension point of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Sampled { samples: usize },
    Refined { pass: usize, passes: usize },
    Quantized { colors: usize },
    Grouped { groups: usize },
    EdgesDetected { edge_pixels: usize },
    LayerTraced { index: usize, layers: usize },
}

/// Receives [`Stage`] updates while a run is in progress.
pub trait ProgressSink {
    fn report(&mut self, stage: &Stage);
}

impl<F: FnMut(&Stage)> ProgressSink for F {
    fn report(&mut self, stage: &Stage) {
        self(stage)
    }
}

/// Shared cancellation flag. Clones observe the same flag, so a host can
/// keep one and cancel the run that holds the other.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Suspension point handle threaded through the pipeline stages.
pub struct Checkpoint<'s, 'c> {
    sink: Option<&'s mut dyn ProgressSink>,
    cancel: Option<&'c CancelToken>,
}

impl<'s, 'c> Checkpoint<'s, 'c> {
    pub fn new(sink: Option<&'s mut dyn ProgressSink>, cancel: Option<&'c CancelToken>) -> Self {
        Self { sink, cancel }
    }

    /// No reporting, never cancelled.
    pub fn detached() -> Self {
        Self {
            sink: None,
            cancel: None,
        }
    }

    /// Report `stage`, then stop the run if cancellation was requested.
    pub fn suspend(&mut self, stage: Stage) -> Result<()> {
        if let Some(sink) = self.sink.as_deref_mut() {
            sink.report(&stage);
        }
        if self.cancel.is_some_and(CancelToken::is_cancelled) {
            log::info!("Stencil run cancelled after {:?}", stage);
            return Err(StencilError::Cancelled);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfStats {
    pub sample_ms: u64,
    pub quantize_ms: u64,
    pub edge_ms: u64,
    pub trace_ms: u64,
    pub total_ms: u64,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub document: StencilDocument,
    /// Present when `edge_assist` was enabled.
    pub edge_map: Option<EdgeMap>,
    pub perf: PerfStats,
    /// SHA-256 over the buffer and config, usable by hosts to cache runs.
    pub cache_key: String,
}

/// Run the full extraction over one buffer.
///
/// An image with no opaque pixels produces a document without layers, not
/// an error. On any error, including cancellation, no document is returned.
pub fn process(
    buffer: &PixelBuffer,
    config: &StencilConfig,
    sink: Option<&mut dyn ProgressSink>,
    cancel: Option<&CancelToken>,
) -> Result<PipelineOutput> {
    let total_start = Instant::now();
    config.validate()?;
    let cache_key = build_cache_key(buffer, config);
    let mut checkpoint = Checkpoint::new(sink, cancel);

    log::info!(
        "Extracting stencil layers: {}x{}, strategy={:?}, max_colors={}, threshold={}",
        buffer.width(),
        buffer.height(),
        config.strategy,
        config.max_colors,
        config.color_threshold
    );

    let sample_start = Instant::now();
    let samples = sample_pixels(buffer, config.alpha_cutoff, config.quantize_bin);
    let sample_ms = sample_start.elapsed().as_millis() as u64;
    log::debug!("Sampled {} pixels", samples.len());
    checkpoint.suspend(Stage::Sampled {
        samples: samples.len(),
    })?;

    let quantize_start = Instant::now();
    let quantized = quantize(&samples, config, &mut checkpoint)?;
    checkpoint.suspend(Stage::Quantized {
        colors: quantized.len(),
    })?;
    let colors = grouped_colors(&quantized, config.color_threshold);
    let quantize_ms = quantize_start.elapsed().as_millis() as u64;
    log::debug!(
        "Quantized to {} colors, grouped into {}",
        quantized.len(),
        colors.len()
    );
    checkpoint.suspend(Stage::Grouped {
        groups: colors.len(),
    })?;

    let edge_start = Instant::now();
    let edge_map = if config.edge_assist {
        let map = detect_edges(buffer);
        checkpoint.suspend(Stage::EdgesDetected {
            edge_pixels: map.edge_pixel_count(),
        })?;
        Some(map)
    } else {
        None
    };
    let edge_ms = edge_start.elapsed().as_millis() as u64;

    if colors.is_empty() {
        log::warn!(
            "No pixels passed alpha cutoff {}; producing an empty document",
            config.alpha_cutoff
        );
    }

    let trace_start = Instant::now();
    let mut paths = Vec::with_capacity(colors.len());
    for (index, color) in colors.iter().enumerate() {
        paths.push(trace_color(
            *color,
            buffer,
            config.alpha_cutoff,
            config.color_threshold,
        ));
        checkpoint.suspend(Stage::LayerTraced {
            index,
            layers: colors.len(),
        })?;
    }
    let trace_ms = trace_start.elapsed().as_millis() as u64;

    let document = assemble_layers(buffer.width(), buffer.height(), &colors, paths);
    let perf = PerfStats {
        sample_ms,
        quantize_ms,
        edge_ms,
        trace_ms,
        total_ms: total_start.elapsed().as_millis() as u64,
    };

    log::info!(
        "Stencil extracted: {} layers, {}ms (sample {}ms, quantize {}ms, trace {}ms)",
        document.len(),
        perf.total_ms,
        perf.sample_ms,
        perf.quantize_ms,
        perf.trace_ms
    );

    Ok(PipelineOutput {
        document,
        edge_map,
        perf,
        cache_key,
    })
}

fn build_cache_key(buffer: &PixelBuffer, config: &StencilConfig) -> String {
    let mut hasher = Sha256::new();
    hasher.update([PIPELINE_CACHE_VERSION]);
    hasher.update(buffer.width().to_le_bytes());
    hasher.update(buffer.height().to_le_bytes());
    hasher.update(buffer.as_bytes());
    hasher.update((config.max_colors as u64).to_le_bytes());
    hasher.update(config.color_threshold.to_le_bytes());
    hasher.update([config.alpha_cutoff]);
    hasher.update([match config.strategy {
        QuantizeStrategy::Frequency => 0,
        QuantizeStrategy::Kmeans => 1,
    }]);
    hasher.update((config.kmeans_iterations as u64).to_le_bytes());
    match config.kmeans_seed {
        Some(seed) => {
            hasher.update([1]);
            hasher.update(seed.to_le_bytes());
        }
        None => hasher.update([0]),
    }
    hasher.update([config.quantize_bin.unwrap_or(0), config.edge_assist as u8]);
    format!("{:x}", hasher.finalize())
}

/// Holds the buffer and document of the latest run so layer edits can be
/// applied between runs.
///
/// The session keeps the token of the latest run. Starting another run, or
/// `reset`, cancels it, so work a host still drives with a clone of that
/// token (a worker thread, a queued export) sees the run as superseded.
/// Cancelling a run in flight goes through the caller's own clone.
#[derive(Debug, Default)]
pub struct StencilSession {
    config: StencilConfig,
    buffer: Option<PixelBuffer>,
    output: Option<PipelineOutput>,
    last_token: Option<CancelToken>,
}

impl StencilSession {
    pub fn new(config: StencilConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &StencilConfig {
        &self.config
    }

    /// Takes effect on the next run and on later recolors.
    pub fn set_config(&mut self, config: StencilConfig) {
        self.config = config;
    }

    /// Process `buffer` with a fresh cancel token.
    pub fn process(
        &mut self,
        buffer: PixelBuffer,
        sink: Option<&mut dyn ProgressSink>,
    ) -> Result<&StencilDocument> {
        self.process_with_token(buffer, sink, CancelToken::new())
    }

    /// Process `buffer`, replacing the current document on success. The
    /// caller keeps a clone of `token` to cancel from outside.
    ///
    /// When the buffer and config hash to the key of the held output, the
    /// held document is returned as is, edits included. Unseeded k-means
    /// runs always recompute.
    pub fn process_with_token(
        &mut self,
        buffer: PixelBuffer,
        sink: Option<&mut dyn ProgressSink>,
        token: CancelToken,
    ) -> Result<&StencilDocument> {
        if let Some(previous) = self.last_token.replace(token.clone()) {
            previous.cancel();
        }

        let reusable = !(self.config.strategy == QuantizeStrategy::Kmeans
            && self.config.kmeans_seed.is_none());
        if reusable && self.output.is_some() {
            let key = build_cache_key(&buffer, &self.config);
            if let Some(output) = self.output.take() {
                if output.cache_key == key {
                    log::debug!("Reusing stencil output for cache key {}", key);
                    return Ok(&self.output.insert(output).document);
                }
            }
        }

        self.output = None;
        self.buffer = None;

        let output = process(&buffer, &self.config, sink, Some(&token))?;
        self.buffer = Some(buffer);
        Ok(&self.output.insert(output).document)
    }

    /// Token of the latest run, cancelled once that run is superseded.
    pub fn last_token(&self) -> Option<&CancelToken> {
        self.last_token.as_ref()
    }

    pub fn reset(&mut self) {
        if let Some(token) = self.last_token.take() {
            token.cancel();
        }
        self.buffer = None;
        self.output = None;
    }

    pub fn output(&self) -> Option<&PipelineOutput> {
        self.output.as_ref()
    }

    pub fn document(&self) -> Option<&StencilDocument> {
        self.output.as_ref().map(|o| &o.document)
    }

    fn document_mut(&mut self, index: usize) -> Result<&mut StencilDocument> {
        self.output
            .as_mut()
            .map(|o| &mut o.document)
            .ok_or(StencilError::IndexOutOfRange { index, len: 0 })
    }

    pub fn reorder(&mut self, from: usize, to: usize) -> Result<()> {
        self.document_mut(from)?.reorder(from, to)
    }

    pub fn rename(&mut self, index: usize, name: impl Into<String>) -> Result<()> {
        self.document_mut(index)?.rename(index, name)
    }

    pub fn set_visible(&mut self, index: usize, visible: bool) -> Result<()> {
        self.document_mut(index)?.set_visible(index, visible)
    }

    pub fn set_blend_mode(&mut self, index: usize, mode: BlendMode) -> Result<()> {
        self.document_mut(index)?.set_blend_mode(index, mode)
    }

    pub fn recolor(&mut self, index: usize, color: Color) -> Result<()> {
        match (self.output.as_mut(), self.buffer.as_ref()) {
            (Some(output), Some(buffer)) => output.document.recolor(
                index,
                color,
                buffer,
                self.config.alpha_cutoff,
                self.config.color_threshold,
            ),
            _ => Err(StencilError::IndexOutOfRange { index, len: 0 }),
        }
    }

    pub fn recolor_hex(&mut self, index: usize, hex: &str) -> Result<()> {
        let color = Color::from_hex(hex)?;
        self.recolor(index, color)
    }
}
