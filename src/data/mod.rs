//! Data structures for single-cell expression analysis.

pub mod io;
mod expression_matrix;
mod labeled_matrix;
mod metadata;
mod sra;

pub use expression_matrix::{DuplicatePolicy, ExpressionMatrix, LongRecord, SampleColumn};
pub use labeled_matrix::LabeledMatrix;
pub use metadata::{intersect_ids, SampleMetadata, Variable};
pub use sra::{SraRecord, SraRunTable};
