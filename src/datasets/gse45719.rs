//! GSE45719: preimplantation embryo cells, one RPKM file per cell.

use super::{gsm_pattern, require_loaded, LoadedDataset};
use crate::data::io::{file_name, list_files, open_text, parse_number};
use crate::data::{DuplicatePolicy, ExpressionMatrix, SampleColumn, SampleMetadata, SraRunTable, Variable};
use crate::error::{Result, ScError};
use log::{debug, info, warn};
use std::io::BufRead;
use std::path::Path;

const GENE_COLUMN: &str = "Gene_symbol";
const VALUE_COLUMN: &str = "RPKM";

/// Load `*expression.txt.gz` files and label cells from the SRA run table.
pub fn load(expression_dir: &Path, sra_path: &Path) -> Result<LoadedDataset> {
    let expression = load_expression(expression_dir)?;

    let sra = match SraRunTable::from_csv(sra_path) {
        Ok(sra) => sra,
        Err(e) => {
            warn!("Could not load SRA table {}: {}", sra_path.display(), e);
            let metadata = SampleMetadata::with_index(expression.sample_ids());
            return Ok(LoadedDataset { expression, metadata });
        }
    };

    let metadata = build_metadata(expression.sample_ids(), &sra);
    info!(
        "GSE45719: {} genes × {} cells, {} metadata columns",
        expression.n_genes(),
        expression.n_samples(),
        metadata.n_columns()
    );
    Ok(LoadedDataset { expression, metadata })
}

/// Outer-join all per-cell files; isoform rows of one gene are summed.
pub fn load_expression(expression_dir: &Path) -> Result<ExpressionMatrix> {
    let files = list_files(expression_dir, |name| name.ends_with("expression.txt.gz"))?;
    info!("Found {} expression files in {}", files.len(), expression_dir.display());

    let gsm = gsm_pattern()?;
    let mut columns = Vec::new();
    for path in &files {
        let Some(name) = file_name(path) else { continue };
        let Some(m) = gsm.find(name) else { continue };
        match read_cell_file(path, m.as_str()) {
            Ok(Some(column)) => columns.push(column),
            Ok(None) => debug!("{} lacks {}/{} columns, skipped", name, GENE_COLUMN, VALUE_COLUMN),
            Err(e) => warn!("Failed to load {}: {}", name, e),
        }
    }
    require_loaded(columns.len(), "expression files")?;

    ExpressionMatrix::from_columns(columns, DuplicatePolicy::Sum)
}

/// Read one cell's file. The header may be prefixed with `#`.
fn read_cell_file(path: &Path, sample_id: &str) -> Result<Option<SampleColumn>> {
    let mut lines = open_text(path)?.lines();
    let header = match lines.next() {
        Some(line) => line?,
        None => return Ok(None),
    };
    let header = header.trim();
    let header: Vec<&str> = header.strip_prefix('#').unwrap_or(header).split('\t').collect();
    let gene_idx = header.iter().position(|h| h.trim() == GENE_COLUMN);
    let value_idx = header.iter().position(|h| h.trim() == VALUE_COLUMN);
    let (Some(gene_idx), Some(value_idx)) = (gene_idx, value_idx) else {
        return Ok(None);
    };

    let mut column = SampleColumn::new(sample_id);
    for (row, line) in lines.enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        let gene = fields.get(gene_idx).map(|g| g.trim()).unwrap_or("");
        let raw = fields.get(value_idx).copied().unwrap_or("");
        let value = parse_number(raw).ok_or_else(|| ScError::InvalidValue {
            value: raw.to_string(),
            row: row + 2,
            col: value_idx + 1,
        })?;
        column.push(gene, value);
    }
    Ok(Some(column))
}

/// Stage, cross and combined labels per cell. Cells without a run get only
/// `Combined_Label = Unknown`.
pub fn build_metadata(sample_ids: &[String], sra: &SraRunTable) -> SampleMetadata {
    let mut metadata = SampleMetadata::new();
    for gsm_id in sample_ids {
        let Some(record) = sra.find("Sample Name", gsm_id) else {
            metadata.push_row(
                gsm_id,
                [
                    ("Stage", Variable::Missing),
                    ("Cross", Variable::Missing),
                    ("Combined_Label", Variable::text("Unknown")),
                ],
            );
            continue;
        };

        let dev_stage = record.value_or("Developmental_Stage", "Unknown");
        let source = record.value_or("source_name", "Unknown");
        let strain = record.value_or("strain", "Unknown");

        let stage = stage_label(&source, &dev_stage);
        let cross = cross_label(&strain);
        let combined = format!("{}_{}", stage, cross);
        metadata.push_row(
            gsm_id,
            [
                ("Stage", Variable::text(stage)),
                ("Cross", Variable::text(cross)),
                ("Combined_Label", Variable::text(combined)),
            ],
        );
    }
    metadata
}

/// Short source names are stage names; long ones fall back to the
/// developmental stage column.
fn stage_label(source: &str, dev_stage: &str) -> String {
    let raw = if source != "Unknown" && source.chars().count() < 20 {
        source
    } else {
        dev_stage
    };
    raw.replace(' ', "_").replace(['(', ')'], "")
}

fn cross_label(strain: &str) -> &'static str {
    match (strain.contains("CAST"), strain.contains("C57BL")) {
        (true, true) => "Hybrid_Cross",
        (false, true) => "B6_Pure",
        (true, false) => "CAST_Pure",
        (false, false) => "Other",
    }
}
