//! Transformations applied after QC: log scaling, HVG selection,
//! standardization and PCA.
//!
//! Every step takes and returns a dense [`LabeledMatrix`](crate::data::LabeledMatrix)
//! except PCA, which yields sample scores.

pub mod hvg;
pub mod logarithm;
pub mod pca;
pub mod scale;

pub use logarithm::{log_transform, LogMethod};
pub use hvg::{select_highly_variable_genes, GeneDispersion, HvgResult};
pub use pca::{run_pca, PcaResult};
pub use scale::scale;
