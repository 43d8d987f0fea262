//! Scoring clustering methods against sample annotations.

use super::leaderboard::{Leaderboard, LeaderboardRow, TargetScore};
use crate::cluster::{agglomerative_single, kmeans, spectral, KMeansConfig, SpectralConfig};
use crate::data::{intersect_ids, SampleMetadata};
use crate::error::Result;
use crate::metrics::{adjusted_mutual_info_score, adjusted_rand_score, round3};
use crate::transform::PcaResult;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

/// Clustering methods compared by the benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClusterMethod {
    /// K-means, 10 random restarts of at most 10 iterations.
    KMeans,
    /// Single-linkage agglomerative clustering.
    HClust,
    /// Spectral clustering on a 10-nearest-neighbour graph.
    Spectral,
}

impl ClusterMethod {
    pub fn name(&self) -> &'static str {
        match self {
            ClusterMethod::KMeans => "KMeans",
            ClusterMethod::HClust => "HClust",
            ClusterMethod::Spectral => "Spectral",
        }
    }

    /// Methods in benchmark order.
    pub fn all() -> Vec<Self> {
        vec![
            ClusterMethod::KMeans,
            ClusterMethod::HClust,
            ClusterMethod::Spectral,
        ]
    }

    /// Cluster `points` into `k` groups.
    pub fn fit(&self, points: &[Vec<f64>], k: usize) -> Result<Vec<usize>> {
        match self {
            ClusterMethod::KMeans => Ok(kmeans(points, &KMeansConfig::benchmark(k))?.labels),
            ClusterMethod::HClust => agglomerative_single(points, k),
            ClusterMethod::Spectral => spectral(points, &SpectralConfig::with_clusters(k)),
        }
    }
}

/// Cluster the PCA scores with every method at every `k` and score each
/// clustering against the `targets` metadata columns.
///
/// Only samples present in both inputs are used. Targets missing from the
/// metadata are ignored; when none remain the leaderboard is empty. A method
/// that fails for some `k` is logged and left out.
pub fn run_clustering_benchmark(
    pca: &PcaResult,
    metadata: &SampleMetadata,
    k_values: &[usize],
    targets: &[String],
) -> Result<Leaderboard> {
    let common = intersect_ids(&pca.sample_ids, metadata.sample_ids());
    if common.len() < pca.n_samples() {
        warn!(
            "Only {} of {} PCA samples have metadata; dropping {}",
            common.len(),
            pca.n_samples(),
            pca.n_samples() - common.len()
        );
    }

    let valid_targets: Vec<String> = targets
        .iter()
        .filter(|t| {
            let present = metadata.has_column(t);
            if !present {
                warn!("Target column '{}' not found in metadata", t);
            }
            present
        })
        .cloned()
        .collect();
    if valid_targets.is_empty() {
        error!("None of the target columns {:?} are in the metadata", targets);
        return Ok(Leaderboard::new(Vec::new()));
    }
    if common.is_empty() {
        error!("No samples shared between PCA scores and metadata");
        return Ok(Leaderboard::new(valid_targets));
    }

    let indices: Vec<usize> = common
        .iter()
        .filter_map(|id| pca.sample_ids.iter().position(|s| s == id))
        .collect();
    let points = pca.select_samples(&indices)?.points();
    let aligned = metadata.subset_samples(&common)?;
    let truths: Vec<(String, Vec<String>)> = valid_targets
        .iter()
        .map(|t| Ok((t.clone(), aligned.labels(t)?)))
        .collect::<Result<_>>()?;

    info!(
        "Benchmarking {} methods over k = {:?} on {} samples",
        ClusterMethod::all().len(),
        k_values,
        points.len()
    );

    let mut board = Leaderboard::new(valid_targets);
    for &k in k_values {
        for method in ClusterMethod::all() {
            let labels = match method.fit(&points, k) {
                Ok(labels) => labels,
                Err(e) => {
                    warn!("{} failed for k={}: {}", method.name(), k, e);
                    continue;
                }
            };

            let mut scores = Vec::with_capacity(truths.len());
            for (target, truth) in &truths {
                scores.push(TargetScore {
                    target: target.clone(),
                    ami: round3(adjusted_mutual_info_score(truth, &labels)?),
                    ari: round3(adjusted_rand_score(truth, &labels)?),
                });
            }
            board.push(LeaderboardRow {
                method: method.name().to_string(),
                k,
                scores,
            });
        }
    }

    board.sort();
    Ok(board)
}
