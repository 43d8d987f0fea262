//! Quality-control filtering for expression matrices.

pub mod detection;

pub use detection::{filter_expression, QcConfig, QcMetrics, QcResult, QcSampleMetrics};
