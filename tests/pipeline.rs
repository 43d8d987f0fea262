//! Integration tests: dataset loading through the clustering benchmark.

use scrna_bench::prelude::*;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const GROUPS: [&str; 3] = ["ES", "PrE", "Epi"];
const CELLS_PER_GROUP: usize = 4;
const N_GENES: usize = 45;

/// One three-column FPKM table per cell; each group has 15 marker genes
/// expressed 50x above background.
fn write_gse42268(dir: &Path) {
    let mut sra = String::from("Run,GEO_Accession (exp),cell_type\n");
    for (g, group) in GROUPS.iter().enumerate() {
        for c in 0..CELLS_PER_GROUP {
            let sid = format!("GSM10{}{}", g, c);
            let mut table = String::from("id\tgene_symbol\tfpkm\n");
            for gene in 0..N_GENES {
                let base = 2.0 + ((gene * 13 + c * 7 + g) % 6) as f64;
                let value = if gene / 15 == g { base * 50.0 } else { base };
                table.push_str(&format!("{}\tGene{}\t{}\n", gene, gene, value));
            }
            std::fs::write(dir.join(format!("{}_{}_{}.txt", sid, group, c)), table).unwrap();
            sra.push_str(&format!("SRR{}{},{},{} cell\n", g, c, sid, group));
        }
    }
    std::fs::write(dir.join("SraRunTable.csv"), sra).unwrap();
}

fn small_pipeline() -> Pipeline {
    Pipeline::new()
        .name("integration")
        .filter_qc(QcConfig {
            min_tpm: 1.0,
            min_genes_per_sample: 20,
            min_samples_per_gene: 3,
        })
        .log_transform(LogMethod::Log1p)
        .select_hvg(30)
        .scale()
        .pca(5)
        .cluster_benchmark(&[2, 3, 4], ["Filename_Group", "cell_type"])
}

#[test]
fn test_dataset_to_leaderboard() {
    let dir = TempDir::new().unwrap();
    write_gse42268(dir.path());

    let data = Dataset::Gse42268
        .load(dir.path(), &dir.path().join("SraRunTable.csv"))
        .unwrap();
    assert_eq!(data.expression.n_samples(), GROUPS.len() * CELLS_PER_GROUP);
    assert_eq!(data.expression.n_genes(), N_GENES);
    assert_eq!(data.metadata.sample_ids(), data.expression.sample_ids());

    let output = small_pipeline()
        .run(&data.expression, &data.metadata)
        .unwrap();
    assert_eq!(output.completed_steps, 6);
    assert_eq!(output.hvg.as_ref().unwrap().n_selected(), 30);

    let board = output.leaderboard.as_ref().unwrap();
    assert_eq!(board.targets, vec!["Filename_Group", "cell_type"]);
    let best = board.best().unwrap();
    assert_eq!(best.k, 3);
    assert!(best.primary_ami() > 0.99);
    // Both targets encode the same partition
    let cell_type = best.score("cell_type").unwrap();
    assert!((cell_type.ami - best.primary_ami()).abs() < 1e-9);

    // Ranked best first
    for pair in board.rows.windows(2) {
        assert!(pair[0].primary_ami() >= pair[1].primary_ami());
    }
}

#[test]
fn test_tsv_round_trip_and_yaml_config() {
    let dir = TempDir::new().unwrap();
    write_gse42268(dir.path());
    let data = Dataset::Gse42268
        .load(dir.path(), &dir.path().join("SraRunTable.csv"))
        .unwrap();

    let out = TempDir::new().unwrap();
    data.expression.to_tsv(out.path().join("expression.tsv")).unwrap();
    data.metadata.to_tsv(out.path().join("metadata.tsv")).unwrap();
    let config_path = out.path().join("pipeline.yaml");
    small_pipeline()
        .to_config(Some("integration test"))
        .to_file(&config_path)
        .unwrap();

    let expression = ExpressionMatrix::from_tsv(out.path().join("expression.tsv")).unwrap();
    let metadata = SampleMetadata::from_tsv(out.path().join("metadata.tsv")).unwrap();
    let config = PipelineConfig::from_file(&config_path).unwrap();
    assert_eq!(config.description.as_deref(), Some("integration test"));

    let output = Pipeline::from_config(&config).run(&expression, &metadata).unwrap();
    let written = output.write_to(out.path().join("results")).unwrap();
    assert!(written.iter().all(|p| p.exists()));

    let board = std::fs::read_to_string(out.path().join("results/leaderboard.tsv")).unwrap();
    let header = board.lines().next().unwrap();
    assert_eq!(
        header,
        "Method\tk\tAMI_Filename_Group\tARI_Filename_Group\tAMI_cell_type\tARI_cell_type"
    );
}

#[test]
fn test_standard_run_stops_on_empty_qc() {
    let dir = TempDir::new().unwrap();
    write_gse42268(dir.path());
    let data = Dataset::Gse42268
        .load(dir.path(), &dir.path().join("SraRunTable.csv"))
        .unwrap();

    // 45 genes never reach the default 500 detected per sample
    let output = run_standard(
        &data.expression,
        &data.metadata,
        &[2, 3],
        &["Filename_Group".to_string()],
    )
    .unwrap();
    assert_eq!(output.completed_steps, 1);
    assert!(output.qc.unwrap().is_empty());
    assert!(output.leaderboard.is_none());
}

#[test]
fn test_qc_profile() {
    let dir = TempDir::new().unwrap();
    write_gse42268(dir.path());
    let data = Dataset::Gse42268
        .load(dir.path(), &dir.path().join("SraRunTable.csv"))
        .unwrap();

    let profile = profile_qc(&data.expression, 1.0);
    let json = serde_json::to_string(&profile).unwrap();
    assert!(json.contains("\"library\""));
    assert!(json.contains("\"detection\""));
}

#[test]
fn test_cli_example_config_runs() {
    let dir = TempDir::new().unwrap();
    write_gse42268(dir.path());
    let data = Dataset::Gse42268
        .load(dir.path(), &dir.path().join("SraRunTable.csv"))
        .unwrap();

    let work = TempDir::new().unwrap();
    let matrix = work.path().join("expression.tsv");
    let metadata = work.path().join("metadata.tsv");
    data.expression.to_tsv(&matrix).unwrap();
    data.metadata.to_tsv(&metadata).unwrap();

    let config = work.path().join("example.yaml");
    let status = Command::new(env!("CARGO_BIN_EXE_scb"))
        .arg("example")
        .arg("--output")
        .arg(&config)
        .arg("--dataset")
        .arg("GSE42268")
        .status()
        .unwrap();
    assert!(status.success());
    let parsed = PipelineConfig::from_file(&config).unwrap();
    assert_eq!(parsed.steps.len(), 6);

    let results = work.path().join("results");
    let status = Command::new(env!("CARGO_BIN_EXE_scb"))
        .arg("run")
        .arg("--config")
        .arg(&config)
        .arg("--matrix")
        .arg(&matrix)
        .arg("--metadata")
        .arg(&metadata)
        .arg("--output")
        .arg(&results)
        .status()
        .unwrap();
    assert!(status.success());
    // Default QC keeps no cell of a 45-gene matrix, so only QC tables are written
    assert!(results.join("qc_metrics.tsv").exists());
    assert!(!results.join("leaderboard.tsv").exists());
}
