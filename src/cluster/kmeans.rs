//! K-means clustering with Lloyd iterations and seeded restarts.

use super::{relabel_by_appearance, sq_euclidean, validate_points};
use crate::error::{Result, ScError};
use log::debug;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Centroid seeding strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KMeansInit {
    /// `k` distinct points drawn uniformly.
    Random,
    /// k-means++ (distance-squared weighted draws).
    PlusPlus,
}

/// Configuration for k-means.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeansConfig {
    pub n_clusters: usize,
    /// Independent restarts; the run with the lowest inertia wins.
    pub n_init: usize,
    pub init: KMeansInit,
    pub max_iter: usize,
    /// Convergence tolerance relative to the mean per-feature variance.
    pub tolerance: f64,
    pub seed: u64,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            n_clusters: 2,
            n_init: 10,
            init: KMeansInit::PlusPlus,
            max_iter: 300,
            tolerance: 1e-4,
            seed: 42,
        }
    }
}

impl KMeansConfig {
    /// Settings used by the clustering benchmark.
    pub fn benchmark(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            n_init: 10,
            init: KMeansInit::Random,
            max_iter: 10,
            ..Self::default()
        }
    }
}

/// Result of k-means.
#[derive(Debug, Clone)]
pub struct KMeansResult {
    /// Cluster label per point.
    pub labels: Vec<usize>,
    /// Centroids, one per cluster, in label order.
    pub centroids: Vec<Vec<f64>>,
    /// Sum of squared distances to the assigned centroid.
    pub inertia: f64,
    /// Iterations used by the winning restart.
    pub n_iter: usize,
}

/// Cluster `points` into `config.n_clusters` groups.
pub fn kmeans(points: &[Vec<f64>], config: &KMeansConfig) -> Result<KMeansResult> {
    let dim = validate_points(points, config.n_clusters)?;
    let tol = config.tolerance * mean_variance(points, dim);
    let n_init = config.n_init.max(1);

    let best = (0..n_init)
        .into_par_iter()
        .map(|run| {
            let mut rng = ChaCha20Rng::seed_from_u64(config.seed.wrapping_add(run as u64));
            (run, lloyd(points, dim, config, tol, &mut rng))
        })
        .min_by(|(ra, a), (rb, b)| {
            a.inertia
                .partial_cmp(&b.inertia)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(ra.cmp(rb))
        })
        .map(|(_, r)| r);

    let raw =
        best.ok_or_else(|| ScError::Clustering("k-means produced no result".to_string()))?;
    debug!(
        "k-means k={} finished: inertia {:.4} after {} iterations",
        config.n_clusters, raw.inertia, raw.n_iter
    );

    // Centroids follow the renumbered labels; clusters left empty go last
    let mut order: Vec<usize> = Vec::with_capacity(config.n_clusters);
    for l in raw.labels.iter().copied().chain(0..config.n_clusters) {
        if !order.contains(&l) {
            order.push(l);
        }
    }
    let centroids = order.iter().map(|&c| raw.centroids[c].clone()).collect();
    let labels = relabel_by_appearance(&raw.labels);

    Ok(KMeansResult {
        labels,
        centroids,
        inertia: raw.inertia,
        n_iter: raw.n_iter,
    })
}

fn mean_variance(points: &[Vec<f64>], dim: usize) -> f64 {
    let n = points.len() as f64;
    let total: f64 = (0..dim)
        .map(|d| {
            let mean = points.iter().map(|p| p[d]).sum::<f64>() / n;
            points.iter().map(|p| (p[d] - mean).powi(2)).sum::<f64>() / n
        })
        .sum();
    total / dim as f64
}

fn init_centroids(
    points: &[Vec<f64>],
    k: usize,
    init: KMeansInit,
    rng: &mut ChaCha20Rng,
) -> Vec<Vec<f64>> {
    let n = points.len();
    match init {
        KMeansInit::Random => sample(rng, n, k)
            .into_iter()
            .map(|i| points[i].clone())
            .collect(),
        KMeansInit::PlusPlus => {
            let mut chosen = vec![rng.gen_range(0..n)];
            let mut dists: Vec<f64> = points
                .iter()
                .map(|p| sq_euclidean(p, &points[chosen[0]]))
                .collect();
            while chosen.len() < k {
                let total: f64 = dists.iter().sum();
                let next = if total > 0.0 {
                    let threshold = rng.gen::<f64>() * total;
                    let mut cumulative = 0.0;
                    let mut pick = n - 1;
                    for (i, &d) in dists.iter().enumerate() {
                        cumulative += d;
                        if d > 0.0 && cumulative >= threshold {
                            pick = i;
                            break;
                        }
                    }
                    pick
                } else {
                    // All remaining points coincide with a centroid
                    (0..n).find(|i| !chosen.contains(i)).unwrap_or(0)
                };
                chosen.push(next);
                for (i, p) in points.iter().enumerate() {
                    let d = sq_euclidean(p, &points[next]);
                    if d < dists[i] {
                        dists[i] = d;
                    }
                }
            }
            chosen.into_iter().map(|i| points[i].clone()).collect()
        }
    }
}

fn assign(points: &[Vec<f64>], centroids: &[Vec<f64>]) -> (Vec<usize>, Vec<f64>) {
    points
        .iter()
        .map(|p| {
            centroids
                .iter()
                .enumerate()
                .map(|(c, cent)| (c, sq_euclidean(p, cent)))
                .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
        })
        .unzip()
}

fn lloyd(
    points: &[Vec<f64>],
    dim: usize,
    config: &KMeansConfig,
    tol: f64,
    rng: &mut ChaCha20Rng,
) -> KMeansResult {
    let k = config.n_clusters;
    let mut centroids = init_centroids(points, k, config.init, rng);
    let (mut labels, mut dists) = assign(points, &centroids);
    let mut n_iter = 0;

    for _ in 0..config.max_iter {
        n_iter += 1;

        let mut sums = vec![vec![0.0; dim]; k];
        let mut counts = vec![0usize; k];
        for (p, &l) in points.iter().zip(&labels) {
            counts[l] += 1;
            for (s, v) in sums[l].iter_mut().zip(p) {
                *s += v;
            }
        }

        let mut new_centroids = Vec::with_capacity(k);
        for c in 0..k {
            if counts[c] > 0 {
                let cnt = counts[c] as f64;
                new_centroids.push(sums[c].iter().map(|s| s / cnt).collect::<Vec<f64>>());
            } else {
                // Empty cluster takes the point farthest from its centroid
                let far = dists
                    .iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |best, (i, &d)| {
                        if d > best.1 {
                            (i, d)
                        } else {
                            best
                        }
                    })
                    .0;
                dists[far] = 0.0;
                new_centroids.push(points[far].clone());
            }
        }

        let shift: f64 = centroids
            .iter()
            .zip(&new_centroids)
            .map(|(a, b)| sq_euclidean(a, b))
            .sum();
        centroids = new_centroids;
        let (new_labels, new_dists) = assign(points, &centroids);
        let stable = new_labels == labels;
        labels = new_labels;
        dists = new_dists;

        if stable || shift <= tol {
            break;
        }
    }

    KMeansResult {
        inertia: dists.iter().sum(),
        labels,
        centroids,
        n_iter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blobs() -> Vec<Vec<f64>> {
        vec![
            vec![0.0, 0.0],
            vec![0.1, 0.2],
            vec![0.2, 0.1],
            vec![10.0, 10.0],
            vec![10.1, 9.9],
            vec![9.8, 10.2],
        ]
    }

    #[test]
    fn test_separates_blobs() {
        for init in [KMeansInit::Random, KMeansInit::PlusPlus] {
            let config = KMeansConfig {
                n_clusters: 2,
                init,
                ..KMeansConfig::default()
            };
            let result = kmeans(&two_blobs(), &config).unwrap();
            assert_eq!(result.labels, vec![0, 0, 0, 1, 1, 1]);
            assert!(result.inertia < 1.0);
            assert!(result.centroids[1][0] > 9.0);
        }
    }

    #[test]
    fn test_deterministic_for_seed() {
        let config = KMeansConfig::benchmark(3);
        let a = kmeans(&two_blobs(), &config).unwrap();
        let b = kmeans(&two_blobs(), &config).unwrap();
        assert_eq!(a.labels, b.labels);
        assert_eq!(a.inertia, b.inertia);
    }

    #[test]
    fn test_k_equals_n() {
        let config = KMeansConfig::benchmark(6);
        let result = kmeans(&two_blobs(), &config).unwrap();
        assert_eq!(result.labels, vec![0, 1, 2, 3, 4, 5]);
        assert!(result.inertia.abs() < 1e-12);
    }

    #[test]
    fn test_invalid_k() {
        assert!(kmeans(&two_blobs(), &KMeansConfig::benchmark(0)).is_err());
        assert!(kmeans(&two_blobs(), &KMeansConfig::benchmark(7)).is_err());
    }
}
