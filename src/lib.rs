//! Single-cell RNA-seq Clustering Benchmark Library
//!
//! This library loads public scRNA-seq datasets into a common shape, runs a
//! standard preprocessing chain on them and ranks clustering methods by how
//! well they recover known sample annotations.
//!
//! # Overview
//!
//! The library is organized into composable modules:
//!
//! - **data**: Core data structures (ExpressionMatrix, LabeledMatrix, SampleMetadata, SRA run tables)
//! - **datasets**: Loaders for individual GEO series
//! - **qc**: Detection-based sample and gene filtering
//! - **transform**: Log scaling, HVG selection, standardization, PCA
//! - **cluster**: K-means, single-linkage and spectral clustering
//! - **metrics**: ARI and AMI
//! - **benchmark**: Clustering benchmark and leaderboard
//! - **profile**: Plot-ready QC and expression summaries
//! - **pipeline**: Pipeline composition and execution
//!
//! # Example
//!
//! ```no_run
//! use scrna_bench::prelude::*;
//! use std::path::Path;
//!
//! // Load data
//! let data = Dataset::Gse45719
//!     .load(Path::new("data/GSE45719"), Path::new("data/SraRunTable.csv"))
//!     .unwrap();
//!
//! // Run analysis pipeline
//! let output = Pipeline::new()
//!     .filter_qc(QcConfig::default())
//!     .log_transform(LogMethod::Log1p)
//!     .select_hvg(2000)
//!     .scale()
//!     .pca(50)
//!     .cluster_benchmark(&[2, 4, 6, 8], ["Combined_Label", "Stage"])
//!     .run(&data.expression, &data.metadata)
//!     .unwrap();
//! ```

pub mod benchmark;
pub mod cluster;
pub mod data;
pub mod datasets;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod profile;
pub mod qc;
pub mod transform;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::benchmark::{
        run_clustering_benchmark, ClusterMethod, Leaderboard, LeaderboardRow, TargetScore,
    };
    pub use crate::cluster::{
        agglomerative_single, kmeans, spectral, KMeansConfig, KMeansInit, KMeansResult,
        SpectralConfig,
    };
    pub use crate::data::{
        intersect_ids, DuplicatePolicy, ExpressionMatrix, LabeledMatrix, LongRecord, SampleColumn,
        SampleMetadata, SraRecord, SraRunTable, Variable,
    };
    pub use crate::datasets::{Dataset, LoadedDataset};
    pub use crate::error::{Result, ScError};
    pub use crate::metrics::{adjusted_mutual_info_score, adjusted_rand_score};
    pub use crate::pipeline::{
        run_standard, standard_pipeline, Pipeline, PipelineConfig, PipelineOutput, PipelineStep,
    };
    pub use crate::profile::{
        profile_expression, profile_gene_detection, profile_library_size, profile_qc,
        ExpressionProfile, GeneDetectionProfile, Histogram, LibrarySizeProfile, QcProfile,
    };
    pub use crate::qc::{filter_expression, QcConfig, QcMetrics, QcResult, QcSampleMetrics};
    pub use crate::transform::{
        log_transform, run_pca, scale, select_highly_variable_genes, GeneDispersion, HvgResult,
        LogMethod, PcaResult,
    };
}
