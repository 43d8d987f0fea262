//! Log transformation of expression values.

use crate::data::LabeledMatrix;
use crate::error::Result;
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Log transformation variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogMethod {
    /// Natural log of `1 + x`.
    #[default]
    Log1p,
    /// Base-2 log of `x + 1`.
    Log2,
}

impl LogMethod {
    /// Resolve a method by name. Anything other than `log2` means `log1p`.
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("log2") {
            LogMethod::Log2
        } else {
            LogMethod::Log1p
        }
    }

    /// Name recorded on the transformed matrix.
    pub fn name(&self) -> &'static str {
        match self {
            LogMethod::Log1p => "log1p",
            LogMethod::Log2 => "log2",
        }
    }

    fn apply(&self, x: f64) -> f64 {
        match self {
            LogMethod::Log1p => x.ln_1p(),
            LogMethod::Log2 => (x + 1.0).log2(),
        }
    }
}

/// Log-transform every value of the matrix.
///
/// An empty matrix passes through with a warning.
pub fn log_transform(matrix: &LabeledMatrix, method: LogMethod) -> Result<LabeledMatrix> {
    if matrix.is_empty() {
        warn!("Input matrix for log transformation is empty");
        return Ok(LabeledMatrix::empty(method.name()));
    }

    info!("Applying {} transformation", method.name());
    let data = matrix.data.map(|x| method.apply(x));
    matrix.with_data(data, method.name())
}
