//! Principal component analysis of samples.
//!
//! Samples are observations and genes are features. The decomposition is a
//! thin SVD of the gene-centred `samples × genes` matrix, so the scores are
//! `U·Σ` and the loadings are the rows of `Vᵀ`.

use crate::data::LabeledMatrix;
use crate::error::{Result, ScError};
use log::{info, warn};
use nalgebra::DMatrix;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Result of PCA.
#[derive(Debug, Clone, Serialize)]
pub struct PcaResult {
    /// Sample scores (`samples × components`).
    #[serde(skip)]
    pub scores: DMatrix<f64>,
    /// Loadings (`components × genes`).
    #[serde(skip)]
    pub components: DMatrix<f64>,
    pub sample_ids: Vec<String>,
    pub gene_ids: Vec<String>,
    /// `PC1`, `PC2`, ...
    pub component_names: Vec<String>,
    /// Variance of each component's scores (n - 1 denominator).
    pub explained_variance: Vec<f64>,
    /// Share of the total variance explained by each component.
    pub explained_variance_ratio: Vec<f64>,
}

impl PcaResult {
    /// An empty result.
    pub fn empty() -> Self {
        Self {
            scores: DMatrix::zeros(0, 0),
            components: DMatrix::zeros(0, 0),
            sample_ids: Vec::new(),
            gene_ids: Vec::new(),
            component_names: Vec::new(),
            explained_variance: Vec::new(),
            explained_variance_ratio: Vec::new(),
        }
    }

    pub fn n_samples(&self) -> usize {
        self.scores.nrows()
    }

    pub fn n_components(&self) -> usize {
        self.scores.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.n_samples() == 0 || self.n_components() == 0
    }

    /// Score rows as point vectors, one per sample.
    pub fn points(&self) -> Vec<Vec<f64>> {
        (0..self.n_samples())
            .map(|i| self.scores.row(i).iter().cloned().collect())
            .collect()
    }

    /// Keep the given samples (by index), in the given order.
    pub fn select_samples(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.n_samples()) {
            return Err(ScError::InvalidParameter(format!(
                "Sample index {} out of bounds",
                bad
            )));
        }
        Ok(Self {
            scores: self.scores.select_rows(indices),
            sample_ids: indices.iter().map(|&i| self.sample_ids[i].clone()).collect(),
            ..self.clone()
        })
    }

    /// Write sample scores to a TSV file.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        write!(writer, "sample_id")?;
        for name in &self.component_names {
            write!(writer, "\t{}", name)?;
        }
        writeln!(writer)?;
        for (i, sample_id) in self.sample_ids.iter().enumerate() {
            write!(writer, "{}", sample_id)?;
            for j in 0..self.n_components() {
                write!(writer, "\t{}", self.scores[(i, j)])?;
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write the scree table (variance per component) to a TSV file.
    pub fn variance_to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "component\texplained_variance\texplained_variance_ratio")?;
        for ((name, var), ratio) in self
            .component_names
            .iter()
            .zip(&self.explained_variance)
            .zip(&self.explained_variance_ratio)
        {
            writeln!(writer, "{}\t{}\t{}", name, var, ratio)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl std::fmt::Display for PcaResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let total: f64 = self.explained_variance_ratio.iter().sum();
        writeln!(
            f,
            "PCA: {} components on {} samples, {:.1}% variance explained",
            self.n_components(),
            self.n_samples(),
            total * 100.0
        )
    }
}

/// Project samples onto their top principal components.
///
/// The number of components is capped at `min(n_samples, n_genes)`. Each
/// component's sign is fixed so that the largest-magnitude entry of the
/// corresponding left singular vector is positive.
pub fn run_pca(matrix: &LabeledMatrix, n_components: usize) -> Result<PcaResult> {
    if matrix.is_empty() {
        warn!("Input matrix for PCA is empty");
        return Ok(PcaResult::empty());
    }
    if n_components == 0 {
        return Err(ScError::InvalidParameter(
            "n_components must be > 0".to_string(),
        ));
    }

    let n_genes = matrix.n_genes();
    let n_samples = matrix.n_samples();
    if n_samples < 2 {
        warn!("PCA needs at least 2 samples, got {}", n_samples);
        return Ok(PcaResult::empty());
    }

    let actual = n_components.min(n_samples).min(n_genes);
    if actual < n_components {
        warn!(
            "Requested {} components, computing {} (samples: {}, genes: {})",
            n_components, actual, n_samples, n_genes
        );
    }
    info!("Running PCA with {} components", actual);

    // samples × genes, centred per gene
    let mut x = matrix.data.transpose();
    for mut col in x.column_iter_mut() {
        let mean = col.mean();
        col.add_scalar_mut(-mean);
    }
    let total_ss: f64 = x.iter().map(|v| v * v).sum();

    let svd = x.svd(true, true);
    let u = svd
        .u
        .ok_or_else(|| ScError::Numerical("SVD did not produce U".to_string()))?;
    let v_t = svd
        .v_t
        .ok_or_else(|| ScError::Numerical("SVD did not produce Vᵀ".to_string()))?;
    let sigma = svd.singular_values;

    let mut order: Vec<usize> = (0..sigma.len()).collect();
    order.sort_by(|&a, &b| {
        sigma[b]
            .partial_cmp(&sigma[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order.truncate(actual);

    let mut scores = DMatrix::zeros(n_samples, actual);
    let mut components = DMatrix::zeros(actual, n_genes);
    let mut explained_variance = Vec::with_capacity(actual);
    let mut explained_variance_ratio = Vec::with_capacity(actual);

    for (k, &idx) in order.iter().enumerate() {
        let u_col = u.column(idx);
        let pivot = u_col
            .iter()
            .cloned()
            .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });
        let sign = if pivot < 0.0 { -1.0 } else { 1.0 };
        let s = sigma[idx];

        for i in 0..n_samples {
            scores[(i, k)] = sign * u_col[i] * s;
        }
        for j in 0..n_genes {
            components[(k, j)] = sign * v_t[(idx, j)];
        }
        explained_variance.push(s * s / (n_samples - 1) as f64);
        explained_variance_ratio.push(if total_ss > 0.0 { s * s / total_ss } else { 0.0 });
    }

    Ok(PcaResult {
        scores,
        components,
        sample_ids: matrix.sample_ids.clone(),
        gene_ids: matrix.gene_ids.clone(),
        component_names: (1..=actual).map(|i| format!("PC{}", i)).collect(),
        explained_variance,
        explained_variance_ratio,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn create_test_matrix() -> LabeledMatrix {
        // 3 genes × 5 samples; gene 1 is 2 × gene 0, gene 2 is small noise
        let data = DMatrix::from_row_slice(
            3,
            5,
            &[
                1.0, 2.0, 3.0, 4.0, 5.0, //
                2.0, 4.0, 6.0, 8.0, 10.0, //
                0.1, -0.1, 0.0, 0.1, -0.1,
            ],
        );
        LabeledMatrix::new(
            data,
            vec!["g1".into(), "g2".into(), "g3".into()],
            (1..=5).map(|i| format!("s{}", i)).collect(),
            "scaled",
        )
        .unwrap()
    }

    #[test]
    fn test_pca_shapes_and_names() {
        let result = run_pca(&create_test_matrix(), 50).unwrap();
        assert_eq!(result.n_samples(), 5);
        assert_eq!(result.n_components(), 3);
        assert_eq!(result.component_names, vec!["PC1", "PC2", "PC3"]);
        assert_eq!(result.components.shape(), (3, 3));
    }

    #[test]
    fn test_explained_variance() {
        let result = run_pca(&create_test_matrix(), 2).unwrap();
        assert!(result.explained_variance[0] > result.explained_variance[1]);
        assert!(result.explained_variance_ratio[0] > 0.99);
        let total: f64 = result.explained_variance_ratio.iter().sum();
        assert!(total <= 1.0 + 1e-12);

        // Score variance equals explained variance
        let pc1: Vec<f64> = result.scores.column(0).iter().cloned().collect();
        let mean = pc1.iter().sum::<f64>() / 5.0;
        let var = pc1.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / 4.0;
        assert_relative_eq!(var, result.explained_variance[0], epsilon = 1e-9);
    }

    #[test]
    fn test_sign_convention() {
        let result = run_pca(&create_test_matrix(), 1).unwrap();
        let pc1: Vec<f64> = result.scores.column(0).iter().cloned().collect();
        let pivot = pc1
            .iter()
            .cloned()
            .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });
        assert!(pivot > 0.0);
    }

    #[test]
    fn test_too_few_samples() {
        let data = DMatrix::from_row_slice(2, 1, &[1.0, 2.0]);
        let mat =
            LabeledMatrix::new(data, vec!["a".into(), "b".into()], vec!["s".into()], "scaled").unwrap();
        assert!(run_pca(&mat, 2).unwrap().is_empty());
        assert!(run_pca(&LabeledMatrix::empty("scaled"), 2).unwrap().is_empty());
    }

    #[test]
    fn test_select_samples() {
        let result = run_pca(&create_test_matrix(), 2).unwrap();
        let subset = result.select_samples(&[4, 0]).unwrap();
        assert_eq!(subset.sample_ids, vec!["s5", "s1"]);
        assert_relative_eq!(subset.scores[(1, 0)], result.scores[(0, 0)]);
        assert!(result.select_samples(&[9]).is_err());
    }
}
