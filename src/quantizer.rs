//! Reduce sampled pixels to a short list of representative colors.
//!
//! Two strategies are available: exact-color frequency ranking, and k-means
//! clustering in RGB space with random initialization.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::color::{squared_distance, Color};
use crate::error::Result;
use crate::pipeline::{Checkpoint, Stage, StencilConfig};

pub const MIN_CLUSTERS: usize = 8;
pub const MAX_CLUSTERS: usize = 32;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QuantizeStrategy {
    /// Most frequent exact colors first.
    #[default]
    Frequency,
    /// Randomly seeded k-means over the sampled colors.
    Kmeans,
}

/// Run the configured strategy and cap the result at `max_colors`.
pub fn quantize(
    samples: &[Color],
    config: &StencilConfig,
    checkpoint: &mut Checkpoint<'_, '_>,
) -> Result<Vec<Color>> {
    let mut colors = match config.strategy {
        QuantizeStrategy::Frequency => frequency_quantize(samples, config.max_colors),
        QuantizeStrategy::Kmeans => {
            let mut rng = match config.kmeans_seed {
                Some(seed) => SeededRng::new(seed),
                None => SeededRng::from_entropy(),
            };
            kmeans_quantize(
                samples,
                config.kmeans_iterations,
                config.color_threshold,
                &mut rng,
                checkpoint,
            )?
        }
    };
    colors.truncate(config.max_colors);
    Ok(colors)
}

/// Rank exact colors by occurrence count, most frequent first.
///
/// Ties keep first-occurrence order, so the output only depends on the
/// input sequence.
pub fn frequency_quantize(samples: &[Color], max_colors: usize) -> Vec<Color> {
    let mut slots: HashMap<Color, usize> = HashMap::new();
    let mut counts: Vec<(Color, usize)> = Vec::new();

    for &color in samples {
        match slots.get(&color) {
            Some(&slot) => counts[slot].1 += 1,
            None => {
                slots.insert(color, counts.len());
                counts.push((color, 1));
            }
        }
    }

    // sort_by is stable: equal counts stay in first-seen order
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
        .into_iter()
        .take(max_colors)
        .map(|(color, _)| color)
        .collect()
}

/// Number of clusters for `n` sampled pixels: `floor(sqrt(n / 100))`
/// clamped to `[8, 32]`, or 0 when there is nothing to cluster.
pub fn cluster_count(n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    let k = (n as f64 / 100.0).sqrt().floor() as usize;
    k.clamp(MIN_CLUSTERS, MAX_CLUSTERS)
}

/// K-means clustering center accumulating its members between passes.
#[derive(Clone)]
struct KMeansCenter {
    rgb: [f64; 3],
    sum: [f64; 3],
    count: u64,
}

impl KMeansCenter {
    fn new(rgb: [f64; 3]) -> Self {
        Self {
            rgb,
            sum: [0.0; 3],
            count: 0,
        }
    }

    fn add_sample(&mut self, color: Color) {
        self.sum[0] += color.r as f64;
        self.sum[1] += color.g as f64;
        self.sum[2] += color.b as f64;
        self.count += 1;
    }

    /// Move to the mean of the accumulated members. A center that attracted
    /// nothing collapses to black instead of keeping a stale position.
    fn update_centroid(&mut self) {
        self.rgb = if self.count > 0 {
            let n = self.count as f64;
            [self.sum[0] / n, self.sum[1] / n, self.sum[2] / n]
        } else {
            [0.0; 3]
        };
        self.sum = [0.0; 3];
        self.count = 0;
    }
}

/// K-means color quantization with a fixed number of refinement passes.
///
/// Centers start at `k` samples drawn uniformly with replacement. After the
/// last pass, centers closer than `threshold` to an already kept center are
/// dropped (in center order), and the survivors are returned from brightest
/// to darkest.
pub fn kmeans_quantize(
    samples: &[Color],
    iterations: usize,
    threshold: f64,
    rng: &mut SeededRng,
    checkpoint: &mut Checkpoint<'_, '_>,
) -> Result<Vec<Color>> {
    let k = cluster_count(samples.len());
    if k == 0 {
        return Ok(Vec::new());
    }

    let mut centers: Vec<KMeansCenter> = (0..k)
        .map(|_| KMeansCenter::new(samples[rng.below(samples.len())].channels()))
        .collect();

    for pass in 0..iterations {
        let labels: Vec<usize> = samples
            .par_iter()
            .map(|color| nearest_center(*color, &centers))
            .collect();

        for (color, &label) in samples.iter().zip(labels.iter()) {
            centers[label].add_sample(*color);
        }
        for center in &mut centers {
            center.update_centroid();
        }

        checkpoint.suspend(Stage::Refined {
            pass: pass + 1,
            passes: iterations,
        })?;
    }

    let mut kept: Vec<[f64; 3]> = Vec::with_capacity(k);
    for center in &centers {
        let distinct = kept
            .iter()
            .all(|other| squared_distance(*other, center.rgb).sqrt() > threshold);
        if distinct {
            kept.push(center.rgb);
        }
    }

    let colors = brightest_first(kept);
    log::debug!("k-means kept {} of {} centers", colors.len(), k);
    Ok(colors)
}

/// Sort centroids by unrounded channel sum, brightest first, then round.
/// Equal sums keep their relative order.
fn brightest_first(mut centroids: Vec<[f64; 3]>) -> Vec<Color> {
    let sum = |c: &[f64; 3]| c[0] + c[1] + c[2];
    centroids.sort_by(|a, b| sum(b).total_cmp(&sum(a)));
    centroids.into_iter().map(Color::from_channels).collect()
}

/// Index of the closest center; ties go to the lowest index.
fn nearest_center(color: Color, centers: &[KMeansCenter]) -> usize {
    let point = color.channels();
    let mut best_idx = 0;
    let mut best_dist = f64::MAX;
    for (i, center) in centers.iter().enumerate() {
        let dist = squared_distance(point, center.rgb);
        if dist < best_dist {
            best_dist = dist;
            best_idx = i;
        }
    }
    best_idx
}

/// Small splitmix64 generator so clustering can be replayed from a seed.
#[derive(Debug, Clone)]
pub struct SeededRng {
    state: u64,
}

impl SeededRng {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Seed from the process hasher keys and the clock. Runs seeded this way
    /// are not reproducible.
    pub fn from_entropy() -> Self {
        let mut hasher = RandomState::new().build_hasher();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        hasher.write_u128(nanos);
        Self::new(hasher.finish())
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform-ish index in `0..bound`. `bound` must be non-zero.
    pub fn below(&mut self, bound: usize) -> usize {
        (self.next_u64() % bound as u64) as usize
    }
}
