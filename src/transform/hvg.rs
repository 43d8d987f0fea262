//! Highly variable gene selection by dispersion.

use crate::data::LabeledMatrix;
use crate::error::Result;
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Offset added to the mean so that unexpressed genes do not divide by zero.
const MEAN_OFFSET: f64 = 1e-9;

/// Dispersion statistics for one gene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneDispersion {
    pub gene_id: String,
    pub mean: f64,
    /// Sample variance (n - 1 denominator).
    pub variance: f64,
    /// `variance / (mean + 1e-9)`; 0 when undefined.
    pub dispersion: f64,
    pub is_hvg: bool,
}

/// Result of HVG selection.
#[derive(Debug, Clone)]
pub struct HvgResult {
    /// Selected genes, ordered by descending dispersion.
    pub matrix: LabeledMatrix,
    /// Statistics for every input gene, in input order.
    pub metrics: Vec<GeneDispersion>,
}

impl HvgResult {
    /// Number of selected genes.
    pub fn n_selected(&self) -> usize {
        self.matrix.n_genes()
    }

    /// Write the per-gene statistics to a TSV file.
    pub fn metrics_to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "gene_id\tmean\tvariance\tdispersion\tis_hvg")?;
        for m in &self.metrics {
            writeln!(
                writer,
                "{}\t{}\t{}\t{}\t{}",
                m.gene_id, m.mean, m.variance, m.dispersion, m.is_hvg
            )?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl std::fmt::Display for HvgResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "HVG selection: {} of {} genes",
            self.n_selected(),
            self.metrics.len()
        )?;
        if let Some(top) = self.metrics.iter().filter(|m| m.is_hvg).max_by(|a, b| {
            a.dispersion
                .partial_cmp(&b.dispersion)
                .unwrap_or(std::cmp::Ordering::Equal)
        }) {
            writeln!(f, "  Top gene: {} (dispersion {:.3})", top.gene_id, top.dispersion)?;
        }
        Ok(())
    }
}

fn gene_dispersion(gene_id: &str, values: &[f64]) -> GeneDispersion {
    let mean = values.iter().mean();
    let variance = values.iter().variance();
    let dispersion = variance / (mean + MEAN_OFFSET);
    GeneDispersion {
        gene_id: gene_id.to_string(),
        mean,
        variance,
        dispersion: if dispersion.is_nan() { 0.0 } else { dispersion },
        is_hvg: false,
    }
}

/// Select the `n_top_genes` genes with the largest dispersion.
///
/// Ties keep the gene that comes first in the input. Asking for more genes
/// than exist selects all of them.
pub fn select_highly_variable_genes(matrix: &LabeledMatrix, n_top_genes: usize) -> Result<HvgResult> {
    if matrix.is_empty() {
        warn!("Input matrix for HVG selection is empty");
        return Ok(HvgResult {
            matrix: LabeledMatrix::empty(&matrix.transformation),
            metrics: Vec::new(),
        });
    }

    let mut metrics: Vec<GeneDispersion> = (0..matrix.n_genes())
        .into_par_iter()
        .map(|i| gene_dispersion(&matrix.gene_ids[i], &matrix.row(i)))
        .collect();

    let mut order: Vec<usize> = (0..metrics.len()).collect();
    // Stable sort keeps input order among equal dispersions
    order.sort_by(|&a, &b| {
        metrics[b]
            .dispersion
            .partial_cmp(&metrics[a].dispersion)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let n_select = n_top_genes.min(metrics.len());
    order.truncate(n_select);
    for &i in &order {
        metrics[i].is_hvg = true;
    }

    info!("Selected {} highly variable genes", n_select);

    Ok(HvgResult {
        matrix: matrix.subset_genes(&order)?,
        metrics,
    })
}
