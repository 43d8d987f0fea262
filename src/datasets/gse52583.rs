//! GSE52583: developing mouse lung epithelium, Cufflinks FPKM per cell.

use super::{gsm_pattern, require_loaded, LoadedDataset};
use crate::data::io::{file_name, list_files, parse_number, read_tab_rows};
use crate::data::{DuplicatePolicy, ExpressionMatrix, SampleColumn, SampleMetadata, SraRunTable, Variable};
use crate::error::Result;
use log::{info, warn};
use std::path::Path;

/// 200-cell bulk controls.
const BULK_CONTROLS: [&str; 2] = ["GSM1271882", "GSM1271944"];
/// Empty-well control.
const NO_CELL_CONTROLS: [&str; 1] = ["GSM1271883"];

/// Cufflinks puts FPKM in the tenth column.
const CUFFLINKS_FPKM_INDEX: usize = 9;

/// Load `*.fpkm_tracking.gz` files and label cells from the SRA run table.
///
/// With `filter_single_cells`, the bulk and no-cell controls are dropped.
pub fn load(expression_dir: &Path, sra_path: &Path, filter_single_cells: bool) -> Result<LoadedDataset> {
    let expression = load_expression(expression_dir)?;

    let sra = match SraRunTable::from_csv(sra_path) {
        Ok(sra) => Some(sra),
        Err(e) => {
            warn!("Could not load SRA table {}: {}", sra_path.display(), e);
            None
        }
    };
    let metadata = build_metadata(expression.sample_ids(), sra.as_ref());

    if !filter_single_cells {
        return Ok(LoadedDataset { expression, metadata });
    }

    let keep: Vec<String> = expression
        .sample_ids()
        .iter()
        .filter(|sid| sample_type(sid) == "Single_Cell")
        .cloned()
        .collect();
    info!(
        "Keeping {} single cells (dropped {} controls)",
        keep.len(),
        expression.n_samples() - keep.len()
    );
    let expression = expression.select_samples(&keep)?;
    let metadata = metadata.subset_samples(&keep)?;
    Ok(LoadedDataset { expression, metadata })
}

/// Outer-join all tracking files; repeated genes within a file are averaged.
pub fn load_expression(expression_dir: &Path) -> Result<ExpressionMatrix> {
    let files = list_files(expression_dir, |name| name.ends_with(".fpkm_tracking.gz"))?;
    info!("Found {} FPKM files in {}", files.len(), expression_dir.display());

    let gsm = gsm_pattern()?;
    let mut columns = Vec::new();
    for path in &files {
        let Some(name) = file_name(path) else { continue };
        let Some(m) = gsm.find(name) else { continue };
        match read_tracking_file(path, m.as_str()) {
            Ok(Some(column)) => columns.push(column),
            Ok(None) => warn!("Skipping {}: could not identify gene/FPKM columns", m.as_str()),
            Err(e) => warn!("Failed to load {}: {}", name, e),
        }
    }
    require_loaded(columns.len(), "FPKM files")?;

    ExpressionMatrix::from_columns(columns, DuplicatePolicy::Mean)
}

fn read_tracking_file(path: &Path, sample_id: &str) -> Result<Option<SampleColumn>> {
    let rows = read_tab_rows(path)?;
    let Some((header, body)) = rows.split_first() else {
        return Ok(None);
    };
    let Some((gene_idx, value_idx)) = locate_columns(header, body) else {
        return Ok(None);
    };

    let mut column = SampleColumn::new(sample_id);
    for row in body {
        let gene = row.get(gene_idx).map(|g| g.trim()).unwrap_or("");
        match row.get(value_idx).and_then(|v| parse_number(v)) {
            Some(value) if !gene.is_empty() => column.push(gene, value),
            _ => {}
        }
    }
    Ok(Some(column))
}

/// Gene column: `tracking_id`, else the first column. Value column: `FPKM`,
/// else the tenth column when it looks numeric.
fn locate_columns(header: &[String], body: &[Vec<String>]) -> Option<(usize, usize)> {
    if header.is_empty() {
        return None;
    }
    let gene_idx = header.iter().position(|h| h == "tracking_id").unwrap_or(0);
    let value_idx = match header.iter().position(|h| h == "FPKM") {
        Some(idx) => idx,
        None if header.len() > CUFFLINKS_FPKM_INDEX => {
            let cells: Vec<&str> = body
                .iter()
                .filter_map(|r| r.get(CUFFLINKS_FPKM_INDEX).map(String::as_str))
                .collect();
            let all_numeric = cells.iter().all(|c| parse_number(c).is_some());
            let has_exponent = cells.iter().any(|c| c.contains(['e', 'E']));
            if all_numeric || has_exponent {
                CUFFLINKS_FPKM_INDEX
            } else {
                return None;
            }
        }
        None => return None,
    };
    Some((gene_idx, value_idx))
}

fn sample_type(gsm_id: &str) -> &'static str {
    if BULK_CONTROLS.contains(&gsm_id) {
        "Bulk_200cell"
    } else if NO_CELL_CONTROLS.contains(&gsm_id) {
        "No_Cell_Control"
    } else {
        "Single_Cell"
    }
}

fn genotype_label(genotype: &str) -> &'static str {
    if genotype.contains("Sftpc-Cre") {
        "SftpcGFP"
    } else if genotype.to_lowercase().contains("wild type") {
        "WT"
    } else {
        "Other"
    }
}

/// Sample type, age, genotype and instrument per cell. Without a run table
/// (or a matching run) the SRA fields are `Unknown`.
pub fn build_metadata(sample_ids: &[String], sra: Option<&SraRunTable>) -> SampleMetadata {
    let mut metadata = SampleMetadata::new();
    for gsm_id in sample_ids {
        let record = sra.and_then(|t| t.find("Sample Name", gsm_id));
        let field = |col: &str| {
            record
                .map(|r| r.value_or(col, "Unknown"))
                .unwrap_or_else(|| "Unknown".to_string())
        };
        let age = field("AGE").replace([' ', '.'], "_");
        let genotype = genotype_label(&field("genotype"));
        let instrument = field("Instrument");
        let combined = format!("{}_{}", age, genotype);

        metadata.push_row(
            gsm_id,
            [
                ("Sample_Type", Variable::text(sample_type(gsm_id))),
                ("Age", Variable::text(age)),
                ("Genotype", Variable::text(genotype)),
                ("Instrument", Variable::text(instrument)),
                ("Combined_Label", Variable::text(combined)),
            ],
        );
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::fixtures::{write_gz, write_text};
    use tempfile::TempDir;

    const CUFFLINKS_HEADER: &str = "tracking_id\tclass_code\tnearest_ref_id\tgene_id\tgene_short_name\ttss_id\tlocus\tlength\tcoverage\tFPKM\tFPKM_conf_lo";

    fn setup() -> TempDir {
        let dir = TempDir::new().unwrap();
        write_gz(
            dir.path(),
            "GSM1271862_E14.5_cell1.fpkm_tracking.gz",
            &format!(
                "{}\nSftpc\t-\t-\t-\t-\t-\tchr1\t-\t-\t100.0\t90\nSftpc\t-\t-\t-\t-\t-\tchr1\t-\t-\t50.0\t40\nAqp5\t-\t-\t-\t-\t-\tchr2\t-\t-\tNA\t0\n",
                CUFFLINKS_HEADER
            ),
        );
        // Renamed columns: no tracking_id/FPKM, value found in the tenth column
        write_gz(
            dir.path(),
            "GSM1271882_bulk.fpkm_tracking.gz",
            "gene\tc1\tc2\tc3\tc4\tc5\tc6\tc7\tc8\tvalue\nSftpc\t-\t-\t-\t-\t-\t-\t-\t-\t1.5e2\nAqp5\t-\t-\t-\t-\t-\t-\t-\t-\t3\n",
        );
        write_gz(
            dir.path(),
            "GSM1271863_short.fpkm_tracking.gz",
            "gene\tvalue\nSftpc\t1\n",
        );
        write_text(
            dir.path(),
            "SraRunTable.csv",
            "Run,Sample Name,AGE,genotype,Instrument\n\
             SRR1,GSM1271862,E14.5,Sftpc-Cre/mTmG,Illumina HiSeq 2000\n\
             SRR2,GSM1271882,E14.5,wild type,Illumina HiSeq 2000\n",
        );
        dir
    }

    #[test]
    fn test_load_expression() {
        let dir = setup();
        let matrix = load_expression(dir.path()).unwrap();
        assert_eq!(matrix.sample_ids(), &["GSM1271862", "GSM1271882"]);
        assert_eq!(matrix.gene_ids(), &["Sftpc", "Aqp5"]);
        // Duplicates averaged; NA row dropped
        assert_eq!(matrix.get(0, 0), 75.0);
        assert_eq!(matrix.get(1, 0), 0.0);
        assert_eq!(matrix.get(0, 1), 150.0);
    }

    #[test]
    fn test_load_with_and_without_filter() {
        let dir = setup();
        let sra = dir.path().join("SraRunTable.csv");

        let all = load(dir.path(), &sra, false).unwrap();
        assert_eq!(all.metadata.n_samples(), 2);
        assert_eq!(
            all.metadata.get("GSM1271882", "Sample_Type"),
            Some(&Variable::text("Bulk_200cell"))
        );
        assert_eq!(
            all.metadata.get("GSM1271882", "Combined_Label"),
            Some(&Variable::text("E14_5_WT"))
        );

        let cells = load(dir.path(), &sra, true).unwrap();
        assert_eq!(cells.expression.sample_ids(), &["GSM1271862"]);
        assert_eq!(
            cells.metadata.get("GSM1271862", "Combined_Label"),
            Some(&Variable::text("E14_5_SftpcGFP"))
        );
    }

    #[test]
    fn test_without_sra() {
        let meta = build_metadata(&["GSM1271883".to_string()], None);
        assert_eq!(meta.get("GSM1271883", "Sample_Type"), Some(&Variable::text("No_Cell_Control")));
        assert_eq!(meta.get("GSM1271883", "Combined_Label"), Some(&Variable::text("Unknown_Other")));
        assert_eq!(meta.get("GSM1271883", "Instrument"), Some(&Variable::text("Unknown")));
    }
}
