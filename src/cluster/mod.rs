//! Clustering of PCA scores.
//!
//! - **K-means**: Lloyd iterations with random or k-means++ seeding
//! - **Hierarchical**: single-linkage agglomeration on Euclidean distance
//! - **Spectral**: k-nearest-neighbour graph embedding followed by k-means
//!
//! Every method returns one label per point, numbered from 0 in order of first
//! appearance.

pub mod hierarchical;
pub mod kmeans;
pub mod spectral;

pub use hierarchical::agglomerative_single;
pub use kmeans::{kmeans, KMeansConfig, KMeansInit, KMeansResult};
pub use spectral::{spectral, SpectralConfig};

use crate::error::{Result, ScError};
use std::collections::HashMap;

/// Check that `points` is non-empty, rectangular and has at least `k` rows.
/// Returns the dimensionality.
pub(crate) fn validate_points(points: &[Vec<f64>], k: usize) -> Result<usize> {
    let n = points.len();
    if n == 0 {
        return Err(ScError::EmptyData("No points to cluster".to_string()));
    }
    if k == 0 {
        return Err(ScError::InvalidParameter(
            "n_clusters must be > 0".to_string(),
        ));
    }
    if k > n {
        return Err(ScError::InvalidParameter(format!(
            "n_clusters ({}) > n_samples ({})",
            k, n
        )));
    }
    let dim = points[0].len();
    if dim == 0 {
        return Err(ScError::EmptyData("Zero-dimensional points".to_string()));
    }
    for (i, p) in points.iter().enumerate() {
        if p.len() != dim {
            return Err(ScError::Clustering(format!(
                "Point {} has dimension {}, expected {}",
                i,
                p.len(),
                dim
            )));
        }
    }
    Ok(dim)
}

/// Squared Euclidean distance.
pub(crate) fn sq_euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Renumber labels 0, 1, 2, ... in order of first appearance.
pub fn relabel_by_appearance(labels: &[usize]) -> Vec<usize> {
    let mut mapping: HashMap<usize, usize> = HashMap::new();
    labels
        .iter()
        .map(|&l| {
            let next = mapping.len();
            *mapping.entry(l).or_insert(next)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relabel_by_appearance() {
        assert_eq!(relabel_by_appearance(&[5, 5, 2, 9, 2]), vec![0, 0, 1, 2, 1]);
        assert!(relabel_by_appearance(&[]).is_empty());
    }

    #[test]
    fn test_validate_points() {
        let points = vec![vec![0.0, 1.0], vec![1.0, 2.0]];
        assert_eq!(validate_points(&points, 2).unwrap(), 2);
        assert!(validate_points(&points, 3).is_err());
        assert!(validate_points(&points, 0).is_err());
        assert!(validate_points(&[], 1).is_err());
        assert!(validate_points(&[vec![0.0], vec![1.0, 2.0]], 1).is_err());
    }
}
