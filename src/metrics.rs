//! Agreement between a clustering and reference labels.
//!
//! Both scores are corrected for chance: random partitions score around 0 and
//! identical partitions (up to renaming) score 1.

use crate::error::{Result, ScError};
use statrs::function::gamma::ln_gamma;
use std::collections::HashMap;
use std::hash::Hash;

/// Map labels to dense integer codes in order of first appearance.
pub fn encode_labels<T: Hash + Eq>(labels: &[T]) -> Vec<usize> {
    let mut codes: HashMap<&T, usize> = HashMap::new();
    labels
        .iter()
        .map(|l| {
            let next = codes.len();
            *codes.entry(l).or_insert(next)
        })
        .collect()
}

/// Classes × clusters contingency table with its marginals.
struct Contingency {
    table: Vec<Vec<usize>>,
    class_sizes: Vec<usize>,
    cluster_sizes: Vec<usize>,
    n: usize,
}

impl Contingency {
    fn new<T: Hash + Eq, U: Hash + Eq>(truth: &[T], pred: &[U]) -> Result<Self> {
        if truth.len() != pred.len() {
            return Err(ScError::DimensionMismatch {
                expected: truth.len(),
                actual: pred.len(),
            });
        }
        let a = encode_labels(truth);
        let b = encode_labels(pred);
        let n_a = a.iter().max().map_or(0, |m| m + 1);
        let n_b = b.iter().max().map_or(0, |m| m + 1);

        let mut table = vec![vec![0usize; n_b]; n_a];
        for (&i, &j) in a.iter().zip(&b) {
            table[i][j] += 1;
        }
        let class_sizes = table.iter().map(|row| row.iter().sum()).collect();
        let cluster_sizes = (0..n_b).map(|j| table.iter().map(|row| row[j]).sum()).collect();

        Ok(Self {
            table,
            class_sizes,
            cluster_sizes,
            n: truth.len(),
        })
    }

    fn n_classes(&self) -> usize {
        self.class_sizes.len()
    }

    fn n_clusters(&self) -> usize {
        self.cluster_sizes.len()
    }

    fn cells(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        self.table.iter().enumerate().flat_map(|(i, row)| {
            row.iter()
                .enumerate()
                .filter(|(_, &v)| v > 0)
                .map(move |(j, &v)| (i, j, v))
        })
    }
}

/// Adjusted Rand index between reference labels and predicted labels.
pub fn adjusted_rand_score<T: Hash + Eq, U: Hash + Eq>(truth: &[T], pred: &[U]) -> Result<f64> {
    let c = Contingency::new(truth, pred)?;
    let n = c.n as f64;

    // Pair confusion counts
    let sum_squares: f64 = c.cells().map(|(_, _, v)| (v * v) as f64).sum();
    let class_sq: f64 = c.class_sizes.iter().map(|&v| (v * v) as f64).sum();
    let cluster_sq: f64 = c.cluster_sizes.iter().map(|&v| (v * v) as f64).sum();

    let tp = sum_squares - n;
    let fp = cluster_sq - sum_squares;
    let fn_ = class_sq - sum_squares;
    let tn = n * n - fp - fn_ - sum_squares;

    if fn_ == 0.0 && fp == 0.0 {
        return Ok(1.0);
    }
    Ok(2.0 * (tp * tn - fn_ * fp) / ((tp + fn_) * (fn_ + tn) + (tp + fp) * (fp + tn)))
}

fn entropy(sizes: &[usize], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    sizes
        .iter()
        .filter(|&&s| s > 0)
        .map(|&s| {
            let p = s as f64 / n;
            -p * p.ln()
        })
        .sum()
}

fn mutual_info(c: &Contingency) -> f64 {
    let n = c.n as f64;
    let mi: f64 = c
        .cells()
        .map(|(i, j, v)| {
            let v = v as f64;
            v / n
                * (v.ln() - (c.class_sizes[i] as f64).ln() - (c.cluster_sizes[j] as f64).ln()
                    + n.ln())
        })
        .sum();
    mi.max(0.0)
}

/// Mutual information expected between two random partitions with the same
/// marginals (hypergeometric model).
fn expected_mutual_info(c: &Contingency) -> f64 {
    let n = c.n;
    let nf = n as f64;
    let ln_fact = |x: usize| ln_gamma(x as f64 + 1.0);
    let ln_n_fact = ln_fact(n);

    let mut emi = 0.0;
    for &a in &c.class_sizes {
        for &b in &c.cluster_sizes {
            let start = 1.max((a + b).saturating_sub(n));
            let end = a.min(b);
            let fixed = ln_fact(a) + ln_fact(b) + ln_fact(n - a) + ln_fact(n - b) - ln_n_fact;
            for nij in start..=end {
                let nij_f = nij as f64;
                let term1 = nij_f / nf;
                let term2 = (nf * nij_f).ln() - (a as f64).ln() - (b as f64).ln();
                let gln = fixed
                    - ln_fact(nij)
                    - ln_fact(a - nij)
                    - ln_fact(b - nij)
                    - ln_fact(n + nij - a - b);
                emi += term1 * term2 * gln.exp();
            }
        }
    }
    emi
}

/// Adjusted mutual information with arithmetic-mean normalization.
pub fn adjusted_mutual_info_score<T: Hash + Eq, U: Hash + Eq>(
    truth: &[T],
    pred: &[U],
) -> Result<f64> {
    let c = Contingency::new(truth, pred)?;
    let (n_classes, n_clusters) = (c.n_classes(), c.n_clusters());
    if n_classes == n_clusters && n_classes <= 1 {
        return Ok(1.0);
    }

    let mi = mutual_info(&c);
    let emi = expected_mutual_info(&c);
    let h_true = entropy(&c.class_sizes, c.n);
    let h_pred = entropy(&c.cluster_sizes, c.n);
    let normalizer = (h_true + h_pred) / 2.0;

    let mut denominator = normalizer - emi;
    if denominator < 0.0 {
        denominator = denominator.min(-f64::EPSILON);
    } else {
        denominator = denominator.max(f64::EPSILON);
    }
    Ok((mi - emi) / denominator)
}

/// Round to three decimals, as reported in leaderboards.
pub fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_encode_labels() {
        assert_eq!(encode_labels(&["b", "a", "b", "c"]), vec![0, 1, 0, 2]);
    }

    #[test]
    fn test_perfect_agreement_up_to_renaming() {
        let truth = ["x", "x", "y", "y", "z", "z"];
        let pred = [2, 2, 0, 0, 1, 1];
        assert_relative_eq!(adjusted_rand_score(&truth, &pred).unwrap(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(
            adjusted_mutual_info_score(&truth, &pred).unwrap(),
            1.0,
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_known_values() {
        // Reference values from the standard definitions
        let truth = [0, 0, 1, 1];
        let pred = [0, 0, 1, 2];
        assert_relative_eq!(
            adjusted_rand_score(&truth, &pred).unwrap(),
            0.5714285714285714,
            epsilon = 1e-9
        );

        let truth = [0, 0, 0, 1, 1, 1];
        let pred = [0, 0, 1, 1, 2, 2];
        assert_relative_eq!(
            adjusted_rand_score(&truth, &pred).unwrap(),
            0.24242424242424243,
            epsilon = 1e-9
        );
        assert_relative_eq!(
            adjusted_mutual_info_score(&truth, &pred).unwrap(),
            0.2987924581708901,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_independent_partition_scores_low() {
        let truth = [0, 0, 1, 1];
        let pred = [0, 1, 0, 1];
        assert!(adjusted_rand_score(&truth, &pred).unwrap() < 0.0);
        assert!(adjusted_mutual_info_score(&truth, &pred).unwrap() <= 0.0);
    }

    #[test]
    fn test_degenerate_partitions() {
        let single = ["a", "a", "a"];
        assert_relative_eq!(adjusted_rand_score(&single, &[1, 1, 1]).unwrap(), 1.0);
        assert_relative_eq!(adjusted_mutual_info_score(&single, &[1, 1, 1]).unwrap(), 1.0);
        let empty: [&str; 0] = [];
        assert_relative_eq!(adjusted_mutual_info_score(&empty, &empty).unwrap(), 1.0);
        assert_relative_eq!(adjusted_rand_score(&[0, 1, 2], &[5, 6, 7]).unwrap(), 1.0);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(adjusted_rand_score(&[0, 1], &[0]).is_err());
        assert!(adjusted_mutual_info_score(&[0, 1], &[0]).is_err());
    }

    #[test]
    fn test_round3() {
        assert_relative_eq!(round3(0.123456), 0.123);
        assert_relative_eq!(round3(0.98765), 0.988);
    }
}
