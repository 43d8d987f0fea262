//! Gene detection frequency across samples.

use super::histogram::Histogram;
use super::median;
use crate::data::ExpressionMatrix;
use serde::{Deserialize, Serialize};

/// How widely each gene is detected across samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneDetectionProfile {
    pub n_genes: usize,
    pub n_samples: usize,
    /// Threshold used for detection.
    pub detection_threshold: f64,
    /// Samples in which each gene is above the threshold.
    pub samples_per_gene: Vec<usize>,
    /// `samples_per_gene` as a fraction of all samples.
    pub detection_frequency: Vec<f64>,
    pub mean_frequency: f64,
    pub median_frequency: f64,
    /// Genes detected in every sample.
    pub n_ubiquitous: usize,
    /// Genes detected in exactly one sample.
    pub n_singletons: usize,
    /// Genes detected in no sample.
    pub n_undetected: usize,
    /// Distribution of `samples_per_gene`.
    pub histogram: Histogram,
}

impl GeneDetectionProfile {
    /// Indices of genes detected in at least `min_samples` samples.
    pub fn genes_detected_in(&self, min_samples: usize) -> Vec<usize> {
        self.samples_per_gene
            .iter()
            .enumerate()
            .filter(|(_, &n)| n >= min_samples)
            .map(|(i, _)| i)
            .collect()
    }
}

impl std::fmt::Display for GeneDetectionProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Gene Detection Profile")?;
        writeln!(f, "  Genes:   {}", self.n_genes)?;
        writeln!(f, "  Samples: {}", self.n_samples)?;
        writeln!(f, "  Mean detection:   {:.2}%", self.mean_frequency * 100.0)?;
        writeln!(f, "  Median detection: {:.2}%", self.median_frequency * 100.0)?;
        writeln!(f, "  Ubiquitous (100%): {}", self.n_ubiquitous)?;
        writeln!(f, "  Singletons (1 sample): {}", self.n_singletons)?;
        writeln!(f, "  Undetected: {}", self.n_undetected)?;
        Ok(())
    }
}

/// Profile how many samples detect each gene.
pub fn profile_gene_detection(
    matrix: &ExpressionMatrix,
    detection_threshold: f64,
    n_bins: usize,
) -> GeneDetectionProfile {
    let n_genes = matrix.n_genes();
    let n_samples = matrix.n_samples();
    let samples_per_gene = matrix.detected_per_gene(detection_threshold);

    let detection_frequency: Vec<f64> = samples_per_gene
        .iter()
        .map(|&n| {
            if n_samples > 0 {
                n as f64 / n_samples as f64
            } else {
                0.0
            }
        })
        .collect();
    let mean_frequency = if n_genes > 0 {
        detection_frequency.iter().sum::<f64>() / n_genes as f64
    } else {
        0.0
    };

    let counts_f: Vec<f64> = samples_per_gene.iter().map(|&n| n as f64).collect();

    GeneDetectionProfile {
        n_genes,
        n_samples,
        detection_threshold,
        n_ubiquitous: samples_per_gene
            .iter()
            .filter(|&&n| n_samples > 0 && n == n_samples)
            .count(),
        n_singletons: samples_per_gene.iter().filter(|&&n| n == 1).count(),
        n_undetected: samples_per_gene.iter().filter(|&&n| n == 0).count(),
        median_frequency: median(&detection_frequency),
        histogram: Histogram::new(&counts_f, n_bins),
        samples_per_gene,
        detection_frequency,
        mean_frequency,
    }
}
