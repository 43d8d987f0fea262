//! GSE74596: mouse NKT cell subsets, mapped read counts per cell.

use super::{require_loaded, sra_cell, LoadedDataset};
use crate::data::io::{file_name, list_files, parse_number, read_tab_rows};
use crate::data::{intersect_ids, DuplicatePolicy, ExpressionMatrix, SampleColumn, SampleMetadata, SraRunTable, Variable};
use crate::error::Result;
use log::{error, info, warn};
use regex::Regex;
use std::path::Path;

/// SRA columns carried over per cell, when present.
const CARRIED_COLUMNS: [&str; 3] = ["BioSample", "tissue", "strain"];

/// Load count files and align them with per-cell SRA annotations.
///
/// When no file ID matches the run table, the error is logged and both
/// tables are returned unaligned.
pub fn load(data_dir: &Path, sra_path: &Path) -> Result<LoadedDataset> {
    let metadata = match SraRunTable::from_csv(sra_path) {
        Ok(sra) => cell_metadata(&sra)?,
        Err(e) => {
            warn!("Could not load SRA table {}: {}", sra_path.display(), e);
            SampleMetadata::new()
        }
    };
    let expression = load_counts(data_dir)?;

    let common = intersect_ids(expression.sample_ids(), metadata.sample_ids());
    if common.is_empty() {
        error!("No overlap between file GSM IDs and SRA GSM IDs; returning unaligned data");
        return Ok(LoadedDataset { expression, metadata });
    }

    info!("Aligning: keeping {} cells matched in both", common.len());
    let expression = expression.select_samples(&common)?;
    let metadata = metadata.subset_samples(&common)?;
    Ok(LoadedDataset { expression, metadata })
}

/// One row per `Sample Name`: the NKT subset parsed from the first run's
/// `source_name` plus the first non-empty value of each carried column.
pub fn cell_metadata(sra: &SraRunTable) -> Result<SampleMetadata> {
    let subset = Regex::new(r"NKT[0-9]+")?;
    if !sra.has_column("source_name") {
        warn!("'source_name' column missing, NKT subsets unknown");
    }
    let carried: Vec<&str> = CARRIED_COLUMNS
        .iter()
        .copied()
        .filter(|c| sra.has_column(c))
        .collect();

    let mut metadata = SampleMetadata::new();
    for (gsm_id, record) in sra.first_by("Sample Name")? {
        // Subset is extracted per run, so an unparseable first run wins
        let nkt = sra
            .find("Sample Name", &gsm_id)
            .and_then(|run| run.get("source_name"))
            .and_then(|s| subset.find(s))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        let mut cells = vec![("NKT_Subset", Variable::text(nkt))];
        cells.extend(carried.iter().map(|&c| (c, sra_cell(&record, c))));
        metadata.push_row(&gsm_id, cells);
    }
    info!("SRA aggregated to {} unique cells", metadata.n_samples());
    Ok(metadata)
}

/// Outer-join headerless `gene<TAB>count` files. Unparseable counts are 0 and
/// a repeated gene keeps its first count.
pub fn load_counts(data_dir: &Path) -> Result<ExpressionMatrix> {
    let files = list_files(data_dir, |name| {
        name.starts_with("GSM") && name.contains("_MappedReads_Annotations.txt")
    })?;
    info!("Found {} count files in {}", files.len(), data_dir.display());

    let gsm = Regex::new(r"^(GSM[0-9]+)_")?;
    let mut columns = Vec::new();
    for path in &files {
        let Some(name) = file_name(path) else { continue };
        let Some(caps) = gsm.captures(name) else { continue };
        let mut column = SampleColumn::new(&caps[1]);
        match read_tab_rows(path) {
            Ok(rows) => {
                for row in rows {
                    let count = row.get(1).and_then(|c| parse_number(c)).unwrap_or(0.0);
                    column.push(row[0].trim(), count);
                }
                columns.push(column);
            }
            Err(e) => warn!("Failed to load {}: {}", name, e),
        }
    }
    require_loaded(columns.len(), "count files")?;

    ExpressionMatrix::from_columns(columns, DuplicatePolicy::First)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::fixtures::{write_gz, write_text};
    use tempfile::TempDir;

    fn setup() -> TempDir {
        let dir = TempDir::new().unwrap();
        write_text(
            dir.path(),
            "GSM1932100_MappedReads_Annotations.txt",
            "Zbtb16\t120\nTbx21\tNA\nZbtb16\t5\n",
        );
        write_gz(
            dir.path(),
            "GSM1932101_MappedReads_Annotations.txt.gz",
            "Zbtb16\t40\nRorc\t33\n",
        );
        write_text(dir.path(), "other_counts.txt", "Zbtb16\t1\n");
        write_text(
            dir.path(),
            "SraRunTable.csv",
            "Run,Sample Name,source_name,BioSample,strain\n\
             SRR1,GSM1932100,NKT1 cells from thymus,SAMN1,\n\
             SRR2,GSM1932100,NKT1 cells from thymus,SAMN1,C57BL/6\n\
             SRR3,GSM1932101,NKT17 cells,SAMN2,C57BL/6\n\
             SRR4,GSM1932199,thymocytes,SAMN3,C57BL/6\n",
        );
        dir
    }

    #[test]
    fn test_load_counts() {
        let dir = setup();
        let matrix = load_counts(dir.path()).unwrap();
        assert_eq!(matrix.sample_ids(), &["GSM1932100", "GSM1932101"]);
        assert_eq!(matrix.gene_ids(), &["Zbtb16", "Tbx21", "Rorc"]);
        // First occurrence wins; NA counts are 0
        assert_eq!(matrix.get(0, 0), 120.0);
        assert_eq!(matrix.get(1, 0), 0.0);
        assert_eq!(matrix.get(2, 1), 33.0);
    }

    #[test]
    fn test_cell_metadata() {
        let dir = setup();
        let sra = SraRunTable::from_csv(dir.path().join("SraRunTable.csv")).unwrap();
        let meta = cell_metadata(&sra).unwrap();
        assert_eq!(meta.sample_ids(), &["GSM1932100", "GSM1932101", "GSM1932199"]);
        assert_eq!(meta.column_names(), &["NKT_Subset", "BioSample", "strain"]);
        assert_eq!(meta.get("GSM1932101", "NKT_Subset"), Some(&Variable::text("NKT17")));
        assert_eq!(meta.get("GSM1932199", "NKT_Subset"), Some(&Variable::text("Unknown")));
        // First non-empty value across runs
        assert_eq!(meta.get("GSM1932100", "strain"), Some(&Variable::text("C57BL/6")));
    }

    #[test]
    fn test_nkt_subset_from_first_run() {
        let dir = TempDir::new().unwrap();
        write_text(
            dir.path(),
            "runs.csv",
            "Run,Sample Name,source_name\n\
             SRR1,GSM1,\n\
             SRR2,GSM1,NKT2 cells\n\
             SRR3,GSM2,pooled thymus\n\
             SRR4,GSM2,NKT17 cells\n",
        );
        let sra = SraRunTable::from_csv(dir.path().join("runs.csv")).unwrap();
        let meta = cell_metadata(&sra).unwrap();
        assert_eq!(meta.get("GSM1", "NKT_Subset"), Some(&Variable::text("Unknown")));
        assert_eq!(meta.get("GSM2", "NKT_Subset"), Some(&Variable::text("Unknown")));
    }

    #[test]
    fn test_load_aligned() {
        let dir = setup();
        let data = load(dir.path(), &dir.path().join("SraRunTable.csv")).unwrap();
        assert_eq!(data.metadata.sample_ids(), data.expression.sample_ids());
        assert_eq!(data.metadata.n_samples(), 2);
    }

    #[test]
    fn test_no_overlap_returns_unaligned() {
        let dir = setup();
        let sra_path = dir.path().join("other.csv");
        write_text(dir.path(), "other.csv", "Run,Sample Name,source_name\nSRR9,GSM1,NKT2\n");
        let data = load(dir.path(), &sra_path).unwrap();
        assert_eq!(data.expression.n_samples(), 2);
        assert_eq!(data.metadata.sample_ids(), &["GSM1"]);
    }
}
