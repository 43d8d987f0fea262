//! Distribution of per-gene mean expression.

use super::histogram::Histogram;
use super::median;
use crate::data::LabeledMatrix;
use serde::{Deserialize, Serialize};

/// Per-gene mean expression of a (usually log-transformed) matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpressionProfile {
    pub n_genes: usize,
    pub n_samples: usize,
    /// Transformation of the profiled matrix.
    pub transformation: String,
    /// Mean across samples, per gene.
    pub gene_means: Vec<f64>,
    pub mean_of_means: f64,
    pub median_of_means: f64,
    pub histogram: Histogram,
}

impl std::fmt::Display for ExpressionProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Expression Profile ({})", self.transformation)?;
        writeln!(f, "  Genes:   {}", self.n_genes)?;
        writeln!(f, "  Samples: {}", self.n_samples)?;
        writeln!(f, "  Mean gene mean:   {:.3}", self.mean_of_means)?;
        writeln!(f, "  Median gene mean: {:.3}", self.median_of_means)?;
        Ok(())
    }
}

/// Profile the distribution of gene means with a 50-bin histogram.
pub fn profile_expression(matrix: &LabeledMatrix) -> ExpressionProfile {
    let n_samples = matrix.n_samples();
    let gene_means: Vec<f64> = if n_samples > 0 {
        matrix
            .data
            .row_iter()
            .map(|r| r.sum() / n_samples as f64)
            .collect()
    } else {
        Vec::new()
    };
    let mean_of_means = if gene_means.is_empty() {
        0.0
    } else {
        gene_means.iter().sum::<f64>() / gene_means.len() as f64
    };

    ExpressionProfile {
        n_genes: gene_means.len(),
        n_samples,
        transformation: matrix.transformation.clone(),
        median_of_means: median(&gene_means),
        histogram: Histogram::new(&gene_means, 50),
        gene_means,
        mean_of_means,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    #[test]
    fn test_profile_expression() {
        let data = DMatrix::from_row_slice(3, 2, &[1.0, 3.0, 0.0, 0.0, 4.0, 6.0]);
        let mat = LabeledMatrix::new(
            data,
            vec!["a".into(), "b".into(), "c".into()],
            vec!["s1".into(), "s2".into()],
            "log1p",
        )
        .unwrap();
        let profile = profile_expression(&mat);
        assert_eq!(profile.gene_means, vec![2.0, 0.0, 5.0]);
        assert!((profile.median_of_means - 2.0).abs() < 1e-12);
        assert_eq!(profile.histogram.n_bins(), 50);
        assert_eq!(profile.transformation, "log1p");
    }

    #[test]
    fn test_empty() {
        let profile = profile_expression(&LabeledMatrix::empty("log1p"));
        assert_eq!(profile.n_genes, 0);
        assert_eq!(profile.histogram.n_bins(), 0);
    }
}
