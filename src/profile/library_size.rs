//! Library size and detected-gene profiling per sample.

use super::histogram::Histogram;
use super::median;
use crate::data::ExpressionMatrix;
use serde::{Deserialize, Serialize};

/// Profile of per-sample library size and gene detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibrarySizeProfile {
    /// Number of samples.
    pub n_samples: usize,
    /// Total expression per sample.
    pub library_sizes: Vec<f64>,
    /// Genes above the detection threshold per sample.
    pub genes_detected: Vec<usize>,
    /// Threshold used for detection.
    pub detection_threshold: f64,
    /// Mean library size.
    pub mean: f64,
    /// Median library size.
    pub median: f64,
    /// Standard deviation of library sizes.
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// Coefficient of variation (std_dev / mean).
    pub cv: f64,
    /// Median detected genes per sample.
    pub median_genes_detected: f64,
    /// Number of samples below mean - 2*std_dev.
    pub n_low_depth: usize,
    /// Number of samples above mean + 2*std_dev.
    pub n_high_depth: usize,
    /// Distribution of detected genes per sample.
    pub genes_detected_histogram: Histogram,
}

impl LibrarySizeProfile {
    /// Check if library sizes are highly variable (CV > 0.5).
    pub fn is_highly_variable(&self) -> bool {
        self.cv > 0.5
    }

    /// Indices of samples detecting fewer than `min_genes` genes.
    pub fn samples_below(&self, min_genes: usize) -> Vec<usize> {
        self.genes_detected
            .iter()
            .enumerate()
            .filter(|(_, &g)| g < min_genes)
            .map(|(i, _)| i)
            .collect()
    }
}

impl std::fmt::Display for LibrarySizeProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Library Size Profile")?;
        writeln!(f, "  Samples: {}", self.n_samples)?;
        writeln!(f, "  Mean:    {:.1}", self.mean)?;
        writeln!(f, "  Median:  {:.1}", self.median)?;
        writeln!(f, "  Std Dev: {:.1}", self.std_dev)?;
        writeln!(f, "  Min:     {:.1}", self.min)?;
        writeln!(f, "  Max:     {:.1}", self.max)?;
        writeln!(f, "  CV:      {:.2}", self.cv)?;
        writeln!(
            f,
            "  Median genes detected (> {}): {:.0}",
            self.detection_threshold, self.median_genes_detected
        )?;
        writeln!(f, "  Low depth samples:  {}", self.n_low_depth)?;
        writeln!(f, "  High depth samples: {}", self.n_high_depth)?;
        Ok(())
    }
}

/// Profile library sizes and detected genes of an expression matrix.
pub fn profile_library_size(
    matrix: &ExpressionMatrix,
    detection_threshold: f64,
    n_bins: usize,
) -> LibrarySizeProfile {
    let library_sizes = matrix.col_sums();
    let genes_detected = matrix.detected_per_sample(detection_threshold);
    let n_samples = library_sizes.len();

    let (mean, std_dev) = if n_samples > 0 {
        let mean = library_sizes.iter().sum::<f64>() / n_samples as f64;
        let variance = library_sizes
            .iter()
            .map(|&x| (x - mean) * (x - mean))
            .sum::<f64>()
            / n_samples as f64;
        (mean, variance.sqrt())
    } else {
        (0.0, 0.0)
    };

    let min = library_sizes.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = library_sizes.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let cv = if mean > 0.0 { std_dev / mean } else { 0.0 };

    let low_threshold = mean - 2.0 * std_dev;
    let high_threshold = mean + 2.0 * std_dev;
    let n_low_depth = library_sizes.iter().filter(|&&x| x < low_threshold).count();
    let n_high_depth = library_sizes.iter().filter(|&&x| x > high_threshold).count();

    let detected_f: Vec<f64> = genes_detected.iter().map(|&g| g as f64).collect();

    LibrarySizeProfile {
        n_samples,
        median: median(&library_sizes),
        median_genes_detected: median(&detected_f),
        genes_detected_histogram: Histogram::new(&detected_f, n_bins),
        library_sizes,
        genes_detected,
        detection_threshold,
        mean,
        std_dev,
        min: if min.is_finite() { min } else { 0.0 },
        max: if max.is_finite() { max } else { 0.0 },
        cv,
        n_low_depth,
        n_high_depth,
    }
}
