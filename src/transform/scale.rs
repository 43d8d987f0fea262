//! Gene-wise standardization.

use crate::data::LabeledMatrix;
use crate::error::Result;
use log::{info, warn};
use nalgebra::DMatrix;
use rayon::prelude::*;

/// Z-score every gene across samples.
///
/// Uses the population standard deviation. Genes with zero deviation are
/// only centred.
pub fn scale(matrix: &LabeledMatrix) -> Result<LabeledMatrix> {
    if matrix.is_empty() {
        warn!("Input matrix for scaling is empty");
        return Ok(LabeledMatrix::empty("scaled"));
    }

    let (n_genes, n_samples) = matrix.data.shape();
    info!("Scaling {} genes across {} samples", n_genes, n_samples);

    let rows: Vec<Vec<f64>> = (0..n_genes)
        .into_par_iter()
        .map(|i| {
            let row = matrix.row(i);
            let n = row.len() as f64;
            let mean = row.iter().sum::<f64>() / n;
            let var = row.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
            let std = var.sqrt();
            let divisor = if std > 0.0 { std } else { 1.0 };
            row.iter().map(|x| (x - mean) / divisor).collect()
        })
        .collect();

    let data = DMatrix::from_fn(n_genes, n_samples, |i, j| rows[i][j]);
    matrix.with_data(data, "scaled")
}
