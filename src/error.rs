//! Error types for the scrna-bench library.

use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum ScError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid value '{value}' at row {row}, column {col}")]
    InvalidValue {
        value: String,
        row: usize,
        col: usize,
    },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Sample ID mismatch: {0}")]
    SampleMismatch(String),

    #[error("Missing column '{0}'")]
    MissingColumn(String),

    #[error("Empty data: {0}")]
    EmptyData(String),

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Clustering error: {0}")]
    Clustering(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, ScError>;
