//! Plot-ready summaries of expression data.
//!
//! Each profile carries the raw per-sample or per-gene values together with
//! histograms, so a plotting front end can draw QC and distribution figures
//! without touching the matrix again.

mod detection;
mod expression;
mod histogram;
mod library_size;

pub use detection::{profile_gene_detection, GeneDetectionProfile};
pub use expression::{profile_expression, ExpressionProfile};
pub use histogram::Histogram;
pub use library_size::{profile_library_size, LibrarySizeProfile};

use crate::data::ExpressionMatrix;
use serde::{Deserialize, Serialize};

/// Bins used for QC histograms.
pub const QC_HISTOGRAM_BINS: usize = 30;

/// QC overview of a raw expression matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QcProfile {
    pub library: LibrarySizeProfile,
    pub detection: GeneDetectionProfile,
}

impl std::fmt::Display for QcProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.library)?;
        writeln!(f)?;
        write!(f, "{}", self.detection)
    }
}

/// Profile library sizes, detected genes per sample and gene detection
/// frequency, with 30-bin histograms.
pub fn profile_qc(matrix: &ExpressionMatrix, detection_threshold: f64) -> QcProfile {
    QcProfile {
        library: profile_library_size(matrix, detection_threshold, QC_HISTOGRAM_BINS),
        detection: profile_gene_detection(matrix, detection_threshold, QC_HISTOGRAM_BINS),
    }
}

pub(crate) fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
        assert_eq!(median(&[]), 0.0);
    }
}
