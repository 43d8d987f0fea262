//! Pipeline composition and execution for scRNA-seq preprocessing and
//! clustering benchmarks.

mod runner;

pub use runner::{
    run_standard, standard_pipeline, Pipeline, PipelineConfig, PipelineOutput, PipelineStep,
    DEFAULT_K_VALUES, DEFAULT_N_COMPONENTS, DEFAULT_N_TOP_GENES,
};
