//! Fixed-width histograms for plot-ready profiles.

use serde::{Deserialize, Serialize};

/// Equal-width bins over the range of the data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// `n_bins + 1` bin edges, ascending.
    pub edges: Vec<f64>,
    /// Values per bin. The last bin includes its right edge.
    pub counts: Vec<usize>,
}

impl Histogram {
    /// Bin the finite values into `n_bins` bins spanning their min and max.
    ///
    /// When all values are equal the range is widened by 0.5 on each side.
    /// No finite values (or zero bins) gives an empty histogram.
    pub fn new(values: &[f64], n_bins: usize) -> Self {
        let finite: Vec<f64> = values.iter().cloned().filter(|v| v.is_finite()).collect();
        if finite.is_empty() || n_bins == 0 {
            return Self {
                edges: Vec::new(),
                counts: Vec::new(),
            };
        }

        let mut lo = finite.iter().cloned().fold(f64::INFINITY, f64::min);
        let mut hi = finite.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if lo == hi {
            lo -= 0.5;
            hi += 0.5;
        }
        let width = (hi - lo) / n_bins as f64;
        let edges: Vec<f64> = (0..=n_bins).map(|i| lo + width * i as f64).collect();

        let mut counts = vec![0usize; n_bins];
        for v in finite {
            let bin = (((v - lo) / width) as usize).min(n_bins - 1);
            counts[bin] += 1;
        }
        Self { edges, counts }
    }

    pub fn n_bins(&self) -> usize {
        self.counts.len()
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Bin centres, for plotting.
    pub fn centers(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect()
    }
}
