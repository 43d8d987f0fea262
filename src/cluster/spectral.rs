//! Spectral clustering on a k-nearest-neighbour graph.

use super::kmeans::{kmeans, KMeansConfig, KMeansInit};
use super::{sq_euclidean, validate_points};
use crate::error::{Result, ScError};
use log::debug;
use nalgebra::{DMatrix, SymmetricEigen};
use serde::{Deserialize, Serialize};

/// Configuration for spectral clustering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectralConfig {
    pub n_clusters: usize,
    /// Neighbours per point in the connectivity graph, the point itself included.
    pub n_neighbors: usize,
    /// Restarts of the k-means step that assigns labels.
    pub n_init: usize,
    pub seed: u64,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            n_clusters: 2,
            n_neighbors: 10,
            n_init: 10,
            seed: 42,
        }
    }
}

impl SpectralConfig {
    pub fn with_clusters(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            ..Self::default()
        }
    }
}

/// Symmetrized kNN connectivity: `0.5 * (C + Cᵀ)`.
fn connectivity(points: &[Vec<f64>], n_neighbors: usize) -> DMatrix<f64> {
    let n = points.len();
    let mut conn = DMatrix::zeros(n, n);
    for i in 0..n {
        let mut by_distance: Vec<(f64, usize)> = points
            .iter()
            .enumerate()
            .map(|(j, p)| (sq_euclidean(&points[i], p), j))
            .collect();
        by_distance.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        for &(_, j) in by_distance.iter().take(n_neighbors) {
            conn[(i, j)] = 1.0;
        }
    }
    (&conn + conn.transpose()) * 0.5
}

/// Spectral embedding: eigenvectors of the normalized Laplacian with the
/// smallest eigenvalues, rescaled by `D^{-1/2}` and sign-normalized.
fn embedding(affinity: &DMatrix<f64>, n_components: usize) -> Vec<Vec<f64>> {
    let n = affinity.nrows();

    // Self-loops do not contribute to the Laplacian
    let mut adj = affinity.clone();
    adj.fill_diagonal(0.0);
    let degree: Vec<f64> = adj.row_iter().map(|r| r.sum()).collect();
    let dd: Vec<f64> = degree
        .iter()
        .map(|&d| if d > 0.0 { d.sqrt() } else { 1.0 })
        .collect();

    let laplacian = DMatrix::from_fn(n, n, |i, j| {
        let norm = -adj[(i, j)] / (dd[i] * dd[j]);
        if i == j {
            if degree[i] > 0.0 {
                1.0
            } else {
                0.0
            }
        } else {
            norm
        }
    });

    let eigen = SymmetricEigen::new(laplacian);
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[a]
            .partial_cmp(&eigen.eigenvalues[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    debug!(
        "Spectral embedding: smallest eigenvalues {:?}",
        order
            .iter()
            .take(n_components)
            .map(|&i| eigen.eigenvalues[i])
            .collect::<Vec<f64>>()
    );

    let mut columns: Vec<Vec<f64>> = order
        .iter()
        .take(n_components)
        .map(|&c| (0..n).map(|i| eigen.eigenvectors[(i, c)] / dd[i]).collect())
        .collect();
    for col in columns.iter_mut() {
        let pivot = col
            .iter()
            .cloned()
            .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });
        if pivot < 0.0 {
            col.iter_mut().for_each(|v| *v = -*v);
        }
    }

    (0..n)
        .map(|i| columns.iter().map(|col| col[i]).collect())
        .collect()
}

/// Partition `points` with spectral clustering.
pub fn spectral(points: &[Vec<f64>], config: &SpectralConfig) -> Result<Vec<usize>> {
    validate_points(points, config.n_clusters)?;
    let n = points.len();
    if config.n_neighbors == 0 || config.n_neighbors > n {
        return Err(ScError::Clustering(format!(
            "Expected 0 < n_neighbors <= n_samples, got n_neighbors = {} and n_samples = {}",
            config.n_neighbors, n
        )));
    }

    let affinity = connectivity(points, config.n_neighbors);
    let embedded = embedding(&affinity, config.n_clusters);

    let km = kmeans(
        &embedded,
        &KMeansConfig {
            n_clusters: config.n_clusters,
            n_init: config.n_init,
            init: KMeansInit::PlusPlus,
            seed: config.seed,
            ..KMeansConfig::default()
        },
    )?;
    Ok(km.labels)
}
