//! GSE42268: mouse ES cells, one three-column FPKM table per sample.
//!
//! File names look like `GSM1035628_ES_1.txt`: the sample ID precedes the
//! first `_` and the group label follows it.

use super::{require_loaded, sra_cell, LoadedDataset};
use crate::data::io::{file_name, list_files, parse_number, read_tab_rows};
use crate::data::{DuplicatePolicy, ExpressionMatrix, SampleColumn, SampleMetadata, SraRunTable, Variable};
use crate::error::{Result, ScError};
use log::{info, warn};
use std::path::Path;

const SRA_KEY: &str = "GEO_Accession (exp)";

/// Load `*.txt` tables; metadata is the file-name group left-joined with the
/// run table when it exists.
pub fn load(data_dir: &Path, sra_path: &Path) -> Result<LoadedDataset> {
    let files = list_files(data_dir, |name| name.ends_with(".txt"))?;
    info!("Found {} files in {}", files.len(), data_dir.display());
    if files.is_empty() {
        return Err(ScError::EmptyData(format!(
            "No .txt files found in {}",
            data_dir.display()
        )));
    }

    let mut columns = Vec::new();
    let mut groups: Vec<(String, String)> = Vec::new();
    for path in &files {
        let Some(name) = file_name(path) else { continue };
        let (sample_id, group) = parse_file_name(name);
        match read_table(path, &sample_id) {
            Ok(column) => {
                columns.push(column);
                groups.push((sample_id, group));
            }
            Err(e) => warn!("Failed to load {}: {}", name, e),
        }
    }

    require_loaded(columns.len(), "expression files")?;

    let expression = ExpressionMatrix::from_columns(columns, DuplicatePolicy::Sum)?;
    info!(
        "Expression matrix: {} genes × {} samples",
        expression.n_genes(),
        expression.n_samples()
    );

    let mut metadata = SampleMetadata::new();
    for (sample_id, group) in &groups {
        if !metadata.has_sample(sample_id) {
            metadata.push_row(sample_id, [("Filename_Group", Variable::text(group))]);
        }
    }

    if sra_path.exists() {
        let sra = SraRunTable::from_csv(sra_path)?;
        metadata.join_left(&sra_metadata(&sra, metadata.sample_ids())?);
        info!(
            "Metadata merged: {} samples × {} columns",
            metadata.n_samples(),
            metadata.n_columns()
        );
    } else {
        warn!(
            "SRA table {} not found, returning file name groups only",
            sra_path.display()
        );
    }

    Ok(LoadedDataset { expression, metadata })
}

/// `GSM1035628_ES_1.txt` → (`GSM1035628`, `ES`).
fn parse_file_name(name: &str) -> (String, String) {
    let sample_id = name.split('_').next().unwrap_or(name).to_string();
    let rest = name.replace(&format!("{}_", sample_id), "");
    let group_raw = rest.split('.').next().unwrap_or("");
    let group = group_raw.split('_').next().unwrap_or(group_raw);
    (sample_id, group.to_string())
}

/// Header row, then `id`, `gene_symbol`, `fpkm`; repeated genes are summed.
/// Non-numeric values count as 0.
fn read_table(path: &Path, sample_id: &str) -> Result<SampleColumn> {
    let rows = read_tab_rows(path)?;
    let Some((header, body)) = rows.split_first() else {
        return Err(ScError::EmptyData(format!("{} is empty", path.display())));
    };
    if header.len() != 3 {
        return Err(ScError::DimensionMismatch {
            expected: 3,
            actual: header.len(),
        });
    }

    let mut column = SampleColumn::new(sample_id);
    let mut n_coerced = 0;
    for row in body {
        let value = match row.get(2).and_then(|raw| parse_number(raw)) {
            Some(v) => v,
            None => {
                n_coerced += 1;
                0.0
            }
        };
        column.push(row.get(1).map(|g| g.trim()).unwrap_or(""), value);
    }
    if n_coerced > 0 {
        warn!(
            "{}: {} non-numeric FPKM values set to 0",
            path.display(),
            n_coerced
        );
    }
    Ok(column)
}

/// Run-table columns (minus the join key) for each sample, from its first run.
fn sra_metadata(sra: &SraRunTable, sample_ids: &[String]) -> Result<SampleMetadata> {
    if !sra.has_column(SRA_KEY) {
        return Err(ScError::MissingColumn(SRA_KEY.to_string()));
    }
    let mut metadata = SampleMetadata::new();
    for sid in sample_ids {
        let Some(record) = sra.find(SRA_KEY, sid) else { continue };
        metadata.push_row(
            sid,
            sra.columns()
                .iter()
                .filter(|c| c.as_str() != SRA_KEY)
                .map(|c| (c.clone(), sra_cell(record, c))),
        );
    }
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::fixtures::write_text;
    use tempfile::TempDir;

    fn setup() -> TempDir {
        let dir = TempDir::new().unwrap();
        write_text(
            dir.path(),
            "GSM1035628_ES_1.txt",
            "id\tgene_symbol\tfpkm\n1\tNanog\t30\n2\tPou5f1\t12\n3\tPou5f1\t3\n",
        );
        write_text(
            dir.path(),
            "GSM1035629_PrE_2.txt",
            "id\tgene_symbol\tfpkm\n1\tGata6\t8\n2\tNanog\t0.5\n",
        );
        write_text(dir.path(), "GSM1035630_bad.txt", "id\tgene\n1\tNanog\n");
        write_text(
            dir.path(),
            "SraRunTable.csv",
            "Run,GEO_Accession (exp),cell_type,Instrument\n\
             SRR1,GSM1035628,ES cell,HiSeq\n\
             SRR2,GSM1035628,ES cell,MiSeq\n\
             SRR3,GSM1035629,,HiSeq\n",
        );
        dir
    }

    #[test]
    fn test_parse_file_name() {
        assert_eq!(
            parse_file_name("GSM1035628_ES_1.txt"),
            ("GSM1035628".to_string(), "ES".to_string())
        );
        assert_eq!(
            parse_file_name("GSM1_2cell.txt"),
            ("GSM1".to_string(), "2cell".to_string())
        );
    }

    #[test]
    fn test_load() {
        let dir = setup();
        let data = load(dir.path(), &dir.path().join("SraRunTable.csv")).unwrap();
        let expr = &data.expression;
        assert_eq!(expr.sample_ids(), &["GSM1035628", "GSM1035629"]);
        assert_eq!(expr.gene_ids(), &["Nanog", "Pou5f1", "Gata6"]);
        assert_eq!(expr.get(1, 0), 15.0);

        let meta = &data.metadata;
        assert_eq!(
            meta.column_names(),
            &["Filename_Group", "Run", "cell_type", "Instrument"]
        );
        assert_eq!(meta.get("GSM1035628", "Run"), Some(&Variable::text("SRR1")));
        assert_eq!(meta.get("GSM1035629", "Filename_Group"), Some(&Variable::text("PrE")));
        assert_eq!(meta.get("GSM1035629", "cell_type"), Some(&Variable::Missing));
    }

    #[test]
    fn test_missing_sra() {
        let dir = setup();
        let data = load(dir.path(), &dir.path().join("absent.csv")).unwrap();
        assert_eq!(data.metadata.column_names(), &["Filename_Group"]);
    }

    #[test]
    fn test_non_numeric_fpkm_is_zero() {
        let dir = TempDir::new().unwrap();
        write_text(
            dir.path(),
            "GSM1_ES_1.txt",
            "id\tgene_symbol\tfpkm\n1\tNanog\t4.5\n2\tSox2\tn/a\n3\tKlf4\t\n",
        );
        let data = load(dir.path(), &dir.path().join("absent.csv")).unwrap();
        let expr = &data.expression;
        assert_eq!(expr.gene_ids(), &["Nanog", "Sox2", "Klf4"]);
        assert_eq!(expr.get(0, 0), 4.5);
        assert_eq!(expr.get(1, 0), 0.0);
        assert_eq!(expr.get(2, 0), 0.0);
    }

    #[test]
    fn test_all_files_malformed() {
        let dir = TempDir::new().unwrap();
        write_text(dir.path(), "GSM1_ES_1.txt", "gene\tfpkm\nNanog\t3\n");
        assert!(matches!(
            load(dir.path(), &dir.path().join("absent.csv")),
            Err(ScError::EmptyData(_))
        ));
    }

    #[test]
    fn test_no_files() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            load(dir.path(), &dir.path().join("absent.csv")),
            Err(ScError::EmptyData(_))
        ));
    }
}
