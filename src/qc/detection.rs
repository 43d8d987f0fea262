//! Detection-threshold quality control for expression matrices.

use crate::data::{ExpressionMatrix, SampleMetadata, Variable};
use crate::error::Result;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Thresholds for sample and gene QC.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QcConfig {
    /// A gene counts as detected in a sample when its value is strictly above this.
    pub min_tpm: f64,
    /// Minimum detected genes required to keep a sample.
    pub min_genes_per_sample: usize,
    /// Minimum samples (after sample QC) a gene must be detected in.
    pub min_samples_per_gene: usize,
}

impl Default for QcConfig {
    fn default() -> Self {
        Self {
            min_tpm: 1.0,
            min_genes_per_sample: 500,
            min_samples_per_gene: 3,
        }
    }
}

/// Per-sample QC metrics for the samples that passed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QcSampleMetrics {
    pub sample_id: String,
    /// Genes above the detection threshold, counted before gene filtering.
    pub n_genes_detected: usize,
    /// Sum of the sample's values over the retained genes.
    pub total_expression: f64,
}

/// QC metrics table, one row per retained sample in matrix order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QcMetrics {
    pub samples: Vec<QcSampleMetrics>,
}

impl QcMetrics {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample IDs in order.
    pub fn sample_ids(&self) -> Vec<String> {
        self.samples.iter().map(|s| s.sample_id.clone()).collect()
    }

    /// The metrics as metadata columns `n_genes_detected` and `total_tpm`.
    pub fn to_metadata(&self) -> SampleMetadata {
        let mut meta = SampleMetadata::new();
        for s in &self.samples {
            meta.push_row(
                &s.sample_id,
                vec![
                    ("n_genes_detected", Variable::Numeric(s.n_genes_detected as f64)),
                    ("total_tpm", Variable::Numeric(s.total_expression)),
                ],
            );
        }
        meta
    }

    /// Write the metrics to a TSV file.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "sample_id\tn_genes_detected\ttotal_tpm")?;
        for s in &self.samples {
            writeln!(
                writer,
                "{}\t{}\t{}",
                s.sample_id, s.n_genes_detected, s.total_expression
            )?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Outcome of QC filtering.
#[derive(Debug, Clone)]
pub struct QcResult {
    /// Filtered matrix (empty when nothing passed).
    pub matrix: ExpressionMatrix,
    /// Metrics for the retained samples.
    pub metrics: QcMetrics,
    /// Samples before filtering.
    pub samples_before: usize,
    /// Genes before filtering.
    pub genes_before: usize,
}

impl QcResult {
    fn empty(samples_before: usize, genes_before: usize) -> Self {
        Self {
            matrix: ExpressionMatrix::empty(),
            metrics: QcMetrics::default(),
            samples_before,
            genes_before,
        }
    }

    /// Whether nothing survived QC.
    pub fn is_empty(&self) -> bool {
        self.matrix.is_empty()
    }
}

impl std::fmt::Display for QcResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "QC Result")?;
        writeln!(
            f,
            "  Samples: {} -> {}",
            self.samples_before,
            self.matrix.n_samples()
        )?;
        writeln!(f, "  Genes:   {} -> {}", self.genes_before, self.matrix.n_genes())?;
        Ok(())
    }
}

/// Filter samples, then genes, by detection thresholds.
///
/// Samples are kept when at least `min_genes_per_sample` genes exceed
/// `min_tpm`. Genes are then kept when they exceed `min_tpm` in at least
/// `min_samples_per_gene` of the retained samples. An empty input, or no
/// sample passing, yields an empty result with a warning.
pub fn filter_expression(matrix: &ExpressionMatrix, config: &QcConfig) -> Result<QcResult> {
    let samples_before = matrix.n_samples();
    let genes_before = matrix.n_genes();

    if matrix.is_empty() {
        warn!("Input expression matrix is empty");
        return Ok(QcResult::empty(samples_before, genes_before));
    }

    info!("QC filtering: initial shape ({}, {})", genes_before, samples_before);

    let genes_detected = matrix.detected_per_sample(config.min_tpm);
    let keep_samples: Vec<usize> = genes_detected
        .iter()
        .enumerate()
        .filter(|(_, &n)| n >= config.min_genes_per_sample)
        .map(|(i, _)| i)
        .collect();

    info!(
        "Samples kept: {} (threshold: {} genes > {} TPM)",
        keep_samples.len(),
        config.min_genes_per_sample,
        config.min_tpm
    );

    if keep_samples.is_empty() {
        warn!("No samples passed QC filtering");
        return Ok(QcResult::empty(samples_before, genes_before));
    }

    let by_sample = matrix.subset_samples(&keep_samples)?;

    let samples_per_gene = by_sample.detected_per_gene(config.min_tpm);
    let keep_genes: Vec<usize> = samples_per_gene
        .iter()
        .enumerate()
        .filter(|(_, &n)| n >= config.min_samples_per_gene)
        .map(|(i, _)| i)
        .collect();
    let filtered = by_sample.subset_genes(&keep_genes)?;

    info!(
        "Genes kept: {} (threshold: detected in {} samples)",
        filtered.n_genes(),
        config.min_samples_per_gene
    );

    let totals = filtered.col_sums();
    let samples = keep_samples
        .iter()
        .zip(filtered.sample_ids())
        .zip(totals)
        .map(|((&orig, sid), total)| QcSampleMetrics {
            sample_id: sid.clone(),
            n_genes_detected: genes_detected[orig],
            total_expression: total,
        })
        .collect();

    Ok(QcResult {
        matrix: filtered,
        metrics: QcMetrics { samples },
        samples_before,
        genes_before,
    })
}
