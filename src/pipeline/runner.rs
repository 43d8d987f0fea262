//! Pipeline runner for composing and executing preprocessing and benchmark steps.

use crate::benchmark::{run_clustering_benchmark, Leaderboard};
use crate::data::{ExpressionMatrix, LabeledMatrix, SampleMetadata};
use crate::error::{Result, ScError};
use crate::qc::{filter_expression, QcConfig, QcResult};
use crate::transform::{
    log_transform, run_pca, scale, select_highly_variable_genes, HvgResult, LogMethod, PcaResult,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Genes kept by HVG selection unless configured otherwise.
pub const DEFAULT_N_TOP_GENES: usize = 2000;
/// Principal components computed unless configured otherwise.
pub const DEFAULT_N_COMPONENTS: usize = 50;
/// Cluster counts tried by the benchmark unless configured otherwise.
pub const DEFAULT_K_VALUES: [usize; 7] = [2, 3, 4, 5, 6, 7, 8];

fn default_min_tpm() -> f64 {
    QcConfig::default().min_tpm
}

fn default_min_genes_per_sample() -> usize {
    QcConfig::default().min_genes_per_sample
}

fn default_min_samples_per_gene() -> usize {
    QcConfig::default().min_samples_per_gene
}

fn default_n_top_genes() -> usize {
    DEFAULT_N_TOP_GENES
}

fn default_n_components() -> usize {
    DEFAULT_N_COMPONENTS
}

fn default_k_values() -> Vec<usize> {
    DEFAULT_K_VALUES.to_vec()
}

fn default_targets() -> Vec<String> {
    vec!["Combined_Label".to_string()]
}

/// A step in the analysis pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineStep {
    // === Quality control ===
    /// Drop low-complexity samples, then rarely detected genes.
    FilterQc {
        #[serde(default = "default_min_tpm")]
        min_tpm: f64,
        #[serde(default = "default_min_genes_per_sample")]
        min_genes_per_sample: usize,
        #[serde(default = "default_min_samples_per_gene")]
        min_samples_per_gene: usize,
    },

    // === Transformation ===
    /// Log-transform the expression values.
    LogTransform {
        #[serde(default)]
        method: LogMethod,
    },
    /// Keep the most dispersed genes.
    SelectHvg {
        #[serde(default = "default_n_top_genes")]
        n_top_genes: usize,
    },
    /// Z-score every gene across samples.
    Scale,
    /// Project samples onto principal components.
    Pca {
        #[serde(default = "default_n_components")]
        n_components: usize,
    },

    // === Benchmark ===
    /// Cluster the PCA scores and score against metadata columns.
    ClusterBenchmark {
        #[serde(default = "default_k_values")]
        k_values: Vec<usize>,
        #[serde(default = "default_targets")]
        targets: Vec<String>,
    },
}

impl PipelineStep {
    /// Short step name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            PipelineStep::FilterQc { .. } => "FilterQc",
            PipelineStep::LogTransform { .. } => "LogTransform",
            PipelineStep::SelectHvg { .. } => "SelectHvg",
            PipelineStep::Scale => "Scale",
            PipelineStep::Pca { .. } => "Pca",
            PipelineStep::ClusterBenchmark { .. } => "ClusterBenchmark",
        }
    }
}

/// Pipeline configuration for serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Name of the pipeline.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Steps to execute, written as `- StepName: {params}` or `- Scale`.
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub steps: Vec<PipelineStep>,
}

impl PipelineConfig {
    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(ScError::from)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(ScError::from)
    }

    /// Load from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_yaml(&fs::read_to_string(path)?)
    }

    /// Write to a YAML file.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_yaml()?)?;
        Ok(())
    }
}

/// Builder for constructing and running analysis pipelines.
#[derive(Debug, Clone)]
pub struct Pipeline {
    steps: Vec<PipelineStep>,
    name: String,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// Create a new empty pipeline.
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            name: "unnamed".to_string(),
        }
    }

    /// Create from a config.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            steps: config.steps.clone(),
            name: config.name.clone(),
        }
    }

    /// Set the pipeline name.
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Steps in execution order.
    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    /// Add detection-based QC filtering.
    pub fn filter_qc(mut self, config: QcConfig) -> Self {
        self.steps.push(PipelineStep::FilterQc {
            min_tpm: config.min_tpm,
            min_genes_per_sample: config.min_genes_per_sample,
            min_samples_per_gene: config.min_samples_per_gene,
        });
        self
    }

    /// Add a log transformation.
    pub fn log_transform(mut self, method: LogMethod) -> Self {
        self.steps.push(PipelineStep::LogTransform { method });
        self
    }

    /// Add highly variable gene selection.
    pub fn select_hvg(mut self, n_top_genes: usize) -> Self {
        self.steps.push(PipelineStep::SelectHvg { n_top_genes });
        self
    }

    /// Add per-gene z-scoring.
    pub fn scale(mut self) -> Self {
        self.steps.push(PipelineStep::Scale);
        self
    }

    /// Add PCA.
    pub fn pca(mut self, n_components: usize) -> Self {
        self.steps.push(PipelineStep::Pca { n_components });
        self
    }

    /// Add the clustering benchmark.
    pub fn cluster_benchmark<S: Into<String>>(
        mut self,
        k_values: &[usize],
        targets: impl IntoIterator<Item = S>,
    ) -> Self {
        self.steps.push(PipelineStep::ClusterBenchmark {
            k_values: k_values.to_vec(),
            targets: targets.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Convert to config for serialization.
    pub fn to_config(&self, description: Option<&str>) -> PipelineConfig {
        PipelineConfig {
            name: self.name.clone(),
            description: description.map(String::from),
            steps: self.steps.clone(),
        }
    }

    /// Run the pipeline on an expression matrix and its sample metadata.
    ///
    /// When a step leaves nothing to work with (no sample passes QC, PCA
    /// needs more samples) the run stops early and returns what it has.
    pub fn run(&self, expression: &ExpressionMatrix, metadata: &SampleMetadata) -> Result<PipelineOutput> {
        info!(
            "Running pipeline '{}' ({} steps) on {} genes × {} samples",
            self.name,
            self.steps.len(),
            expression.n_genes(),
            expression.n_samples()
        );
        let mut state = PipelineState::new(expression.clone());

        for (i, step) in self.steps.iter().enumerate() {
            state = state.apply(step, metadata).map_err(|e| {
                ScError::Pipeline(format!("Step {} ({:?}) failed: {}", i + 1, step, e))
            })?;
            state.completed_steps = i + 1;
            if let Some(reason) = state.empty_reason() {
                warn!(
                    "Pipeline '{}' stopped after step {} ({}): {}",
                    self.name,
                    i + 1,
                    step.name(),
                    reason
                );
                break;
            }
        }

        Ok(state.finalize(&self.name))
    }
}

/// Internal state during pipeline execution.
struct PipelineState {
    expression: ExpressionMatrix,
    /// Current dense matrix once any transformation ran.
    matrix: Option<LabeledMatrix>,
    qc: Option<QcResult>,
    hvg: Option<HvgResult>,
    pca: Option<PcaResult>,
    leaderboard: Option<Leaderboard>,
    completed_steps: usize,
}

impl PipelineState {
    fn new(expression: ExpressionMatrix) -> Self {
        Self {
            expression,
            matrix: None,
            qc: None,
            hvg: None,
            pca: None,
            leaderboard: None,
            completed_steps: 0,
        }
    }

    /// The matrix the next transformation works on.
    fn current(&self) -> LabeledMatrix {
        match &self.matrix {
            Some(m) => m.clone(),
            None => self.expression.to_labeled(),
        }
    }

    fn apply(mut self, step: &PipelineStep, metadata: &SampleMetadata) -> Result<Self> {
        match step {
            PipelineStep::FilterQc {
                min_tpm,
                min_genes_per_sample,
                min_samples_per_gene,
            } => {
                if self.matrix.is_some() {
                    return Err(ScError::Pipeline(
                        "QC filtering must run before any transformation".to_string(),
                    ));
                }
                let config = QcConfig {
                    min_tpm: *min_tpm,
                    min_genes_per_sample: *min_genes_per_sample,
                    min_samples_per_gene: *min_samples_per_gene,
                };
                let result = filter_expression(&self.expression, &config)?;
                self.expression = result.matrix.clone();
                self.qc = Some(result);
            }
            PipelineStep::LogTransform { method } => {
                self.matrix = Some(log_transform(&self.current(), *method)?);
            }
            PipelineStep::SelectHvg { n_top_genes } => {
                let result = select_highly_variable_genes(&self.current(), *n_top_genes)?;
                self.matrix = Some(result.matrix.clone());
                self.hvg = Some(result);
            }
            PipelineStep::Scale => {
                self.matrix = Some(scale(&self.current())?);
            }
            PipelineStep::Pca { n_components } => {
                self.pca = Some(run_pca(&self.current(), *n_components)?);
            }
            PipelineStep::ClusterBenchmark { k_values, targets } => {
                let pca = self.pca.as_ref().ok_or_else(|| {
                    ScError::Pipeline("Must run PCA before the clustering benchmark".to_string())
                })?;
                self.leaderboard = Some(run_clustering_benchmark(pca, metadata, k_values, targets)?);
            }
        }
        Ok(self)
    }

    /// Why the run cannot continue, if the latest result is empty.
    fn empty_reason(&self) -> Option<&'static str> {
        if self.qc.as_ref().map_or(false, QcResult::is_empty) {
            Some("no samples or genes passed QC")
        } else if self.matrix.as_ref().map_or(false, LabeledMatrix::is_empty) {
            Some("expression matrix is empty")
        } else if self.pca.as_ref().map_or(false, PcaResult::is_empty) {
            Some("PCA produced no scores")
        } else {
            None
        }
    }

    fn finalize(self, name: &str) -> PipelineOutput {
        PipelineOutput {
            name: name.to_string(),
            completed_steps: self.completed_steps,
            matrix: self.matrix,
            qc: self.qc,
            hvg: self.hvg,
            pca: self.pca,
            leaderboard: self.leaderboard,
        }
    }
}

/// Everything a pipeline run produced. Steps that did not run leave `None`.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub name: String,
    /// Steps that ran to completion.
    pub completed_steps: usize,
    /// Final dense matrix (after the last transformation).
    pub matrix: Option<LabeledMatrix>,
    pub qc: Option<QcResult>,
    pub hvg: Option<HvgResult>,
    pub pca: Option<PcaResult>,
    pub leaderboard: Option<Leaderboard>,
}

impl PipelineOutput {
    /// Write every available result as TSV into `dir`, creating it if needed.
    ///
    /// Returns the written paths.
    pub fn write_to<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let mut written = Vec::new();

        if let Some(qc) = &self.qc {
            let path = dir.join("qc_metrics.tsv");
            qc.metrics.to_tsv(&path)?;
            written.push(path);
            let path = dir.join("filtered_expression.tsv");
            qc.matrix.to_tsv(&path)?;
            written.push(path);
        }
        if let Some(hvg) = &self.hvg {
            let path = dir.join("hvg_metrics.tsv");
            hvg.metrics_to_tsv(&path)?;
            written.push(path);
        }
        if let Some(matrix) = &self.matrix {
            let path = dir.join("processed_matrix.tsv");
            matrix.to_tsv(&path)?;
            written.push(path);
        }
        if let Some(pca) = &self.pca {
            let path = dir.join("pca_scores.tsv");
            pca.to_tsv(&path)?;
            written.push(path);
            let path = dir.join("pca_variance.tsv");
            pca.variance_to_tsv(&path)?;
            written.push(path);
        }
        if let Some(board) = &self.leaderboard {
            let path = dir.join("leaderboard.tsv");
            board.to_tsv(&path)?;
            written.push(path);
        }

        info!("Wrote {} result files to {}", written.len(), dir.display());
        Ok(written)
    }
}

impl std::fmt::Display for PipelineOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Pipeline '{}' ({} steps completed)", self.name, self.completed_steps)?;
        if let Some(qc) = &self.qc {
            write!(f, "{}", qc)?;
        }
        if let Some(hvg) = &self.hvg {
            write!(f, "{}", hvg)?;
        }
        if let Some(pca) = &self.pca {
            write!(f, "{}", pca)?;
        }
        if let Some(board) = &self.leaderboard {
            write!(f, "{}", board)?;
        }
        Ok(())
    }
}

/// Run the standard sequence with default parameters: QC, log1p, 2000 HVGs,
/// scaling, 50-component PCA and the clustering benchmark.
pub fn run_standard(
    expression: &ExpressionMatrix,
    metadata: &SampleMetadata,
    k_values: &[usize],
    targets: &[String],
) -> Result<PipelineOutput> {
    standard_pipeline(k_values, targets).run(expression, metadata)
}

/// The standard pipeline as a builder, e.g. to export it as YAML.
pub fn standard_pipeline(k_values: &[usize], targets: &[String]) -> Pipeline {
    Pipeline::new()
        .name("standard")
        .filter_qc(QcConfig::default())
        .log_transform(LogMethod::Log1p)
        .select_hvg(DEFAULT_N_TOP_GENES)
        .scale()
        .pca(DEFAULT_N_COMPONENTS)
        .cluster_benchmark(k_values, targets.iter().cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Variable;
    use sprs::TriMat;
    use tempfile::TempDir;

    /// 30 genes × 12 samples in three groups with distinct marker genes.
    fn create_test_data() -> (ExpressionMatrix, SampleMetadata) {
        let n_genes = 30;
        let n_samples = 12;
        let mut tri_mat = TriMat::new((n_genes, n_samples));
        for s in 0..n_samples {
            let group = s / 4;
            for g in 0..n_genes {
                let marker = g / 10 == group;
                let base = 5.0 + ((g * 7 + s * 3) % 5) as f64;
                let value = if marker { base * 40.0 } else { base };
                tri_mat.add_triplet(g, s, value);
            }
        }
        let gene_ids = (0..n_genes).map(|i| format!("gene_{}", i)).collect();
        let sample_ids: Vec<String> = (0..n_samples).map(|i| format!("S{}", i)).collect();
        let matrix = ExpressionMatrix::new(tri_mat.to_csr(), gene_ids, sample_ids.clone()).unwrap();

        let mut metadata = SampleMetadata::new();
        for (i, sid) in sample_ids.iter().enumerate() {
            metadata.push_row(
                sid,
                [("Combined_Label", Variable::text(format!("type_{}", i / 4)))],
            );
        }
        (matrix, metadata)
    }

    fn small_qc() -> QcConfig {
        QcConfig {
            min_tpm: 1.0,
            min_genes_per_sample: 10,
            min_samples_per_gene: 3,
        }
    }

    #[test]
    fn test_pipeline_builder() {
        let pipeline = Pipeline::new()
            .name("test")
            .filter_qc(QcConfig::default())
            .log_transform(LogMethod::Log1p)
            .select_hvg(100)
            .scale()
            .pca(10)
            .cluster_benchmark(&[2, 3], ["Combined_Label"]);

        let config = pipeline.to_config(Some("Test pipeline"));
        assert_eq!(config.steps.len(), 6);
        assert_eq!(config.name, "test");
    }

    #[test]
    fn test_pipeline_run() {
        let (matrix, metadata) = create_test_data();
        let output = Pipeline::new()
            .name("test")
            .filter_qc(small_qc())
            .log_transform(LogMethod::Log1p)
            .select_hvg(20)
            .scale()
            .pca(5)
            .cluster_benchmark(&[3], ["Combined_Label"])
            .run(&matrix, &metadata)
            .unwrap();

        assert_eq!(output.completed_steps, 6);
        assert_eq!(output.hvg.as_ref().unwrap().n_selected(), 20);
        assert_eq!(output.pca.as_ref().unwrap().n_components(), 5);
        let board = output.leaderboard.as_ref().unwrap();
        assert_eq!(board.targets, vec!["Combined_Label".to_string()]);
        assert!(!board.is_empty());
        // Marker genes separate the groups perfectly
        assert!(board.best().unwrap().primary_ami() > 0.9);
    }

    #[test]
    fn test_pipeline_config_yaml() {
        let config = standard_pipeline(&[2, 4], &["Stage".to_string()]).to_config(Some("Standard"));
        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("- FilterQc:"));
        assert!(yaml.contains("- Scale"));
        assert!(!yaml.contains('!'));
        let parsed = PipelineConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_config_defaults() {
        let yaml = "name: minimal\nsteps:\n  - FilterQc: {}\n  - LogTransform: {}\n  - Scale\n  - Pca: {}\n  - ClusterBenchmark: {}\n";
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.description, None);
        assert_eq!(
            config.steps[0],
            PipelineStep::FilterQc {
                min_tpm: 1.0,
                min_genes_per_sample: 500,
                min_samples_per_gene: 3,
            }
        );
        assert_eq!(config.steps[1], PipelineStep::LogTransform { method: LogMethod::Log1p });
        assert_eq!(config.steps[3], PipelineStep::Pca { n_components: 50 });
        assert_eq!(
            config.steps[4],
            PipelineStep::ClusterBenchmark {
                k_values: DEFAULT_K_VALUES.to_vec(),
                targets: vec!["Combined_Label".to_string()],
            }
        );
    }

    #[test]
    fn test_pipeline_error_handling() {
        let (matrix, metadata) = create_test_data();

        // Benchmark without PCA
        let result = Pipeline::new()
            .cluster_benchmark(&[2], ["Combined_Label"])
            .run(&matrix, &metadata);
        match result {
            Err(ScError::Pipeline(msg)) => assert!(msg.starts_with("Step 1")),
            other => panic!("expected pipeline error, got {:?}", other.map(|o| o.completed_steps)),
        }

        // QC after a transformation
        let result = Pipeline::new()
            .log_transform(LogMethod::Log1p)
            .filter_qc(small_qc())
            .run(&matrix, &metadata);
        assert!(result.is_err());
    }

    #[test]
    fn test_stops_when_qc_removes_everything() {
        let (matrix, metadata) = create_test_data();
        let output = Pipeline::new()
            .filter_qc(QcConfig::default())
            .log_transform(LogMethod::Log1p)
            .pca(5)
            .run(&matrix, &metadata)
            .unwrap();

        // 30 genes can never reach 500 detected per sample
        assert_eq!(output.completed_steps, 1);
        assert!(output.qc.unwrap().is_empty());
        assert!(output.pca.is_none());
    }

    #[test]
    fn test_write_to() {
        let (matrix, metadata) = create_test_data();
        let output = Pipeline::new()
            .filter_qc(small_qc())
            .log_transform(LogMethod::Log2)
            .pca(3)
            .cluster_benchmark(&[2, 3], ["Combined_Label"])
            .run(&matrix, &metadata)
            .unwrap();

        let dir = TempDir::new().unwrap();
        let written = output.write_to(dir.path().join("out")).unwrap();
        assert_eq!(written.len(), 6);
        for path in &written {
            assert!(path.exists());
        }
        let board = std::fs::read_to_string(dir.path().join("out/leaderboard.tsv")).unwrap();
        assert!(board.starts_with("Method\tk\tAMI_Combined_Label\tARI_Combined_Label"));
    }
}
