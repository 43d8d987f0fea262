//! GSE55291: human single cells alongside bulk libraries, Cufflinks FPKM.

use super::{require_loaded, sra_cell, LoadedDataset};
use crate::data::io::{file_name, list_files, parse_number, read_tab_rows};
use crate::data::{DuplicatePolicy, ExpressionMatrix, LongRecord, SampleMetadata, SraRunTable, Variable};
use crate::error::{Result, ScError};
use log::{info, warn};
use std::path::Path;

const SRA_KEY: &str = "GEO_Accession (exp)";
const TECHNOLOGY: &str = "technology_used";
const SINGLE_CELL: &str = "single-cell RNA-seq";

/// Load `*.fpkm_tracking` files, keeping single-cell libraries only.
///
/// The run table is required: it decides which samples are single cells.
pub fn load(expression_dir: &Path, sra_path: &Path) -> Result<LoadedDataset> {
    let sra = SraRunTable::from_csv(sra_path)
        .map_err(|e| ScError::Parse(format!("Could not load metadata {}: {}", sra_path.display(), e)))?;

    let files = list_files(expression_dir, |name| name.ends_with(".fpkm_tracking"))?;
    info!("Found {} files in {}", files.len(), expression_dir.display());

    let mut per_sample: Vec<(String, Vec<LongRecord>)> = Vec::new();
    for path in &files {
        let Some(name) = file_name(path) else { continue };
        let sample_id = name.split('_').next().unwrap_or(name);
        match read_tracking_file(path, sample_id) {
            Ok(Some(records)) => per_sample.push((sample_id.to_string(), records)),
            Ok(None) => warn!("{} lacks tracking_id/FPKM columns, skipped", name),
            Err(e) => warn!("Failed to load {}: {}", name, e),
        }
    }
    require_loaded(per_sample.len(), "expression files")?;

    let n_loaded = per_sample.len();
    let keep_all = !sra.has_column(TECHNOLOGY);
    if keep_all {
        warn!("'{}' column not found, keeping all samples", TECHNOLOGY);
    }
    let records: Vec<LongRecord> = per_sample
        .into_iter()
        .filter(|(sid, _)| keep_all || is_single_cell(&sra, sid))
        .flat_map(|(_, records)| records)
        .collect();

    let expression = ExpressionMatrix::from_long(records, DuplicatePolicy::Mean)?;
    info!(
        "Kept {} of {} samples as single cells; matrix {} genes × {} samples",
        expression.n_samples(),
        n_loaded,
        expression.n_genes(),
        expression.n_samples()
    );

    let mut metadata = SampleMetadata::new();
    for sid in expression.sample_ids() {
        let record = sra.find(SRA_KEY, sid);
        metadata.push_row(
            sid,
            ["cell_type", TECHNOLOGY].map(|col| {
                let value = record
                    .map(|r| sra_cell(r, col))
                    .unwrap_or(Variable::Missing);
                (col, value)
            }),
        );
    }

    Ok(LoadedDataset { expression, metadata })
}

fn is_single_cell(sra: &SraRunTable, sample_id: &str) -> bool {
    sra.find(SRA_KEY, sample_id)
        .and_then(|r| r.get(TECHNOLOGY))
        .map(|t| t == SINGLE_CELL)
        .unwrap_or(false)
}

fn read_tracking_file(path: &Path, sample_id: &str) -> Result<Option<Vec<LongRecord>>> {
    let rows = read_tab_rows(path)?;
    let Some((header, body)) = rows.split_first() else {
        return Ok(None);
    };
    let gene_idx = header.iter().position(|h| h == "tracking_id");
    let value_idx = header.iter().position(|h| h == "FPKM");
    let (Some(gene_idx), Some(value_idx)) = (gene_idx, value_idx) else {
        return Ok(None);
    };

    let records = body
        .iter()
        .filter_map(|row| {
            let gene = row.get(gene_idx)?.trim();
            let value = parse_number(row.get(value_idx)?)?;
            Some(LongRecord {
                gene: gene.to_string(),
                sample: sample_id.to_string(),
                value,
            })
        })
        .collect();
    Ok(Some(records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::fixtures::write_text;
    use tempfile::TempDir;

    fn setup(sra: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        write_text(
            dir.path(),
            "GSM1334000_sc1.fpkm_tracking",
            "tracking_id\tgene_id\tFPKM\nGAPDH\tg1\t100\nACTB\tg2\t40\nACTB\tg2\t20\n",
        );
        write_text(
            dir.path(),
            "GSM1334001_sc2.fpkm_tracking",
            "tracking_id\tgene_id\tFPKM\nGAPDH\tg1\t80\nKRT8\tg3\t5\n",
        );
        write_text(
            dir.path(),
            "GSM1334002_bulk.fpkm_tracking",
            "tracking_id\tgene_id\tFPKM\nGAPDH\tg1\t90\nALB\tg4\t7\n",
        );
        write_text(dir.path(), "SraRunTable.csv", sra);
        dir
    }

    const SRA: &str = "Run,GEO_Accession (exp),cell_type,technology_used\n\
        SRR1,GSM1334000,HCT116,single-cell RNA-seq\n\
        SRR2,GSM1334001,HCT116,single-cell RNA-seq\n\
        SRR3,GSM1334002,HCT116,bulk RNA-seq\n";

    #[test]
    fn test_load_single_cells() {
        let dir = setup(SRA);
        let data = load(dir.path(), &dir.path().join("SraRunTable.csv")).unwrap();
        let expr = &data.expression;
        assert_eq!(expr.sample_ids(), &["GSM1334000", "GSM1334001"]);
        // Sorted genes; ALB only occurs in the bulk sample
        assert_eq!(expr.gene_ids(), &["ACTB", "GAPDH", "KRT8"]);
        assert_eq!(expr.get(0, 0), 30.0);
        assert_eq!(
            data.metadata.get("GSM1334001", "cell_type"),
            Some(&Variable::text("HCT116"))
        );
        assert_eq!(data.metadata.column_names(), &["cell_type", "technology_used"]);
    }

    #[test]
    fn test_keep_all_without_technology() {
        let dir = setup("Run,GEO_Accession (exp),cell_type\nSRR1,GSM1334000,HCT116\n");
        let data = load(dir.path(), &dir.path().join("SraRunTable.csv")).unwrap();
        assert_eq!(data.expression.n_samples(), 3);
        assert_eq!(
            data.metadata.get("GSM1334002", "cell_type"),
            Some(&Variable::Missing)
        );
    }

    #[test]
    fn test_sra_required() {
        let dir = setup(SRA);
        assert!(load(dir.path(), &dir.path().join("absent.csv")).is_err());
    }
}
