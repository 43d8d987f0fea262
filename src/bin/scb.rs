//! scb - single-cell clustering benchmark CLI
//!
//! Loads public scRNA-seq datasets, runs preprocessing pipelines and ranks
//! clustering methods against known sample annotations.

use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use scrna_bench::data::{ExpressionMatrix, SampleMetadata};
use scrna_bench::datasets::{Dataset, LoadedDataset};
use scrna_bench::error::{Result, ScError};
use scrna_bench::pipeline::{standard_pipeline, Pipeline, PipelineConfig, DEFAULT_K_VALUES};
use scrna_bench::profile::profile_qc;
use std::path::{Path, PathBuf};

/// Output format for reports
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
    Yaml,
}

/// Single-cell clustering benchmark
#[derive(Parser)]
#[command(name = "scb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log debug messages (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where the input data comes from: a named dataset or plain TSV files.
#[derive(clap::Args)]
struct InputArgs {
    /// Dataset accession (e.g. GSE45719); requires --expression and --sra
    #[arg(short, long)]
    dataset: Option<String>,

    /// Expression directory or file of the dataset
    #[arg(short, long)]
    expression: Option<PathBuf>,

    /// SRA run table or series matrix of the dataset
    #[arg(short, long)]
    sra: Option<PathBuf>,

    /// Genes × samples expression TSV (instead of a dataset)
    #[arg(long, conflicts_with = "dataset")]
    matrix: Option<PathBuf>,

    /// Sample metadata TSV (with --matrix)
    #[arg(short, long, requires = "matrix")]
    metadata: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline from a YAML configuration file
    Run {
        /// Path to pipeline configuration YAML; the standard pipeline if omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        input: InputArgs,

        /// Output directory for result tables
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Load a dataset and write it as normalized TSV files
    Load {
        /// Dataset accession (e.g. GSE45719)
        #[arg(short, long)]
        dataset: String,

        /// Expression directory or file
        #[arg(short, long)]
        expression: PathBuf,

        /// SRA run table or series matrix
        #[arg(short, long)]
        sra: PathBuf,

        /// Output directory for expression.tsv and metadata.tsv
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Profile library sizes and gene detection of an expression matrix
    Profile {
        /// Genes × samples expression TSV
        #[arg(long)]
        matrix: PathBuf,

        /// Detection threshold
        #[arg(short, long, default_value = "1.0")]
        threshold: f64,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Write an example pipeline configuration
    Example {
        /// Output path for the YAML file
        #[arg(short, long)]
        output: PathBuf,

        /// Use this dataset's benchmark targets
        #[arg(short, long)]
        dataset: Option<String>,
    },

    /// List supported datasets
    Datasets,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let result = match cli.command {
        Commands::Run {
            config,
            input,
            output,
        } => cmd_run(config.as_deref(), &input, &output),

        Commands::Load {
            dataset,
            expression,
            sra,
            output,
        } => cmd_load(&dataset, &expression, &sra, &output),

        Commands::Profile {
            matrix,
            threshold,
            format,
        } => cmd_profile(&matrix, threshold, format),

        Commands::Example { output, dataset } => cmd_example(&output, dataset.as_deref()),

        Commands::Datasets => {
            cmd_datasets();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn parse_dataset(name: &str) -> Result<Dataset> {
    Dataset::from_str(name).ok_or_else(|| {
        ScError::InvalidParameter(format!(
            "Unknown dataset '{}'; run `scb datasets` for the list",
            name
        ))
    })
}

/// Load the run input. Returns the dataset when one was named.
fn load_input(input: &InputArgs) -> Result<(LoadedDataset, Option<Dataset>)> {
    if let Some(name) = &input.dataset {
        let dataset = parse_dataset(name)?;
        let (Some(expression), Some(sra)) = (&input.expression, &input.sra) else {
            return Err(ScError::InvalidParameter(
                "--dataset requires --expression and --sra".to_string(),
            ));
        };
        info!("Loading {} from {}", dataset, expression.display());
        return Ok((dataset.load(expression, sra)?, Some(dataset)));
    }

    let Some(matrix) = &input.matrix else {
        return Err(ScError::InvalidParameter(
            "Either --dataset or --matrix is required".to_string(),
        ));
    };
    let expression = ExpressionMatrix::from_tsv(matrix)?;
    let metadata = match &input.metadata {
        Some(path) => SampleMetadata::from_tsv(path)?,
        None => SampleMetadata::with_index(expression.sample_ids()),
    };
    Ok((LoadedDataset { expression, metadata }, None))
}

/// Run a pipeline from configuration
fn cmd_run(config_path: Option<&Path>, input: &InputArgs, output_dir: &Path) -> Result<()> {
    let (data, dataset) = load_input(input)?;
    eprint!("{}", data);

    let pipeline = match config_path {
        Some(path) => {
            eprintln!("Loading pipeline configuration from {:?}...", path);
            Pipeline::from_config(&PipelineConfig::from_file(path)?)
        }
        None => {
            let targets = dataset
                .map(|d| d.default_targets())
                .unwrap_or_else(|| vec!["Combined_Label".to_string()]);
            standard_pipeline(&DEFAULT_K_VALUES, &targets)
        }
    };

    let output = pipeline.run(&data.expression, &data.metadata)?;
    println!("{}", output);

    let written = output.write_to(output_dir)?;
    eprintln!("Done! Wrote {} files to {:?}", written.len(), output_dir);
    Ok(())
}

/// Load a dataset into normalized TSV files
fn cmd_load(name: &str, expression: &Path, sra: &Path, output_dir: &Path) -> Result<()> {
    let dataset = parse_dataset(name)?;
    let data = dataset.load(expression, sra)?;
    eprint!("{}", data);

    std::fs::create_dir_all(output_dir)?;
    data.expression.to_tsv(output_dir.join("expression.tsv"))?;
    data.metadata.to_tsv(output_dir.join("metadata.tsv"))?;
    eprintln!("Wrote expression.tsv and metadata.tsv to {:?}", output_dir);
    Ok(())
}

/// Profile an expression matrix
fn cmd_profile(matrix_path: &Path, threshold: f64, format: Format) -> Result<()> {
    eprintln!("Loading expression matrix...");
    let matrix = ExpressionMatrix::from_tsv(matrix_path)?;
    let profile = profile_qc(&matrix, threshold);

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&profile)?),
        Format::Yaml => println!("{}", serde_yaml::to_string(&profile)?),
        Format::Text => {
            println!("Data Profile");
            println!("============");
            println!();
            println!("Dimensions:");
            println!("  Genes:   {}", matrix.n_genes());
            println!("  Samples: {}", matrix.n_samples());
            println!();
            print!("{}", profile);
        }
    }
    Ok(())
}

/// Generate example pipeline configuration
fn cmd_example(output_path: &Path, dataset: Option<&str>) -> Result<()> {
    let targets = match dataset {
        Some(name) => parse_dataset(name)?.default_targets(),
        None => vec!["Combined_Label".to_string()],
    };
    let config = standard_pipeline(&DEFAULT_K_VALUES, &targets).to_config(Some(
        "QC, log1p, highly variable genes, scaling, PCA and clustering benchmark",
    ));
    config.to_file(output_path)?;

    eprintln!("Wrote example pipeline to {:?}", output_path);
    eprintln!();
    eprintln!("Contents:");
    println!("{}", config.to_yaml()?);
    Ok(())
}

fn cmd_datasets() {
    println!("{:<10} {:<7} Description", "Dataset", "Units");
    for dataset in Dataset::all() {
        println!(
            "{:<10} {:<7} {}",
            dataset.name(),
            dataset.units(),
            dataset.description()
        );
        println!("{:<18} targets: {}", "", dataset.default_targets().join(", "));
    }
}
