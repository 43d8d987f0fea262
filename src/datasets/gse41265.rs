//! GSE41265: LPS-stimulated bone-marrow dendritic cells (TPM).
//!
//! Expression tables are read as raw text first, because the series files
//! contain stray header rows and non-numeric cells; [`clean_table`] turns a
//! raw table into a numeric matrix.

use super::LoadedDataset;
use crate::data::io::{file_name, is_gzipped, list_files, parse_number, read_tab_rows};
use crate::data::{ExpressionMatrix, SampleMetadata, SraRecord, SraRunTable, Variable};
use crate::error::{Result, ScError};
use crate::qc::QcMetrics;
use log::{error, info, warn};
use sprs::TriMat;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

/// Index header used by the GSE41265 tables.
pub const INDEX_NAME: &str = "GENE";

/// A genes × samples table of unparsed cells.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    /// Header of the gene column.
    pub index_name: String,
    pub sample_ids: Vec<String>,
    /// (gene, one cell per sample); `None` where a sample has no value.
    pub rows: Vec<(String, Vec<Option<String>>)>,
}

impl RawTable {
    /// Read a tab-separated table: the header names the gene column and the
    /// samples, each following row holds a gene and its values.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let rows = read_tab_rows(path)?;
        let mut iter = rows.into_iter();
        let header = iter
            .next()
            .ok_or_else(|| ScError::EmptyData("Table has no header".to_string()))?;
        let mut header = header.into_iter();
        let index_name = header.next().unwrap_or_default().trim().to_string();
        let sample_ids: Vec<String> = header.map(|s| s.trim().to_string()).collect();

        let rows = iter
            .map(|row| {
                let mut cells = row.into_iter();
                let gene = cells.next().unwrap_or_default().trim().to_string();
                let mut values: Vec<Option<String>> = cells.map(Some).collect();
                values.resize(sample_ids.len(), None);
                (gene, values)
            })
            .collect();

        Ok(Self {
            index_name,
            sample_ids,
            rows,
        })
    }

    pub fn n_genes(&self) -> usize {
        self.rows.len()
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }
}

/// Turn a raw table into a numeric matrix.
///
/// Rows named like the index header are stray header lines and are dropped.
/// Non-numeric cells become missing, duplicate genes are summed (genes are
/// then sorted) and missing values are 0.
pub fn clean_table(table: &RawTable) -> Result<ExpressionMatrix> {
    let artifact = table.rows.iter().any(|(g, _)| g == &table.index_name);
    if artifact {
        info!("Dropping artifact row matching index name '{}'", table.index_name);
    }

    let mut n_coerced = 0usize;
    let mut parsed: Vec<(&str, Vec<Option<f64>>)> = Vec::with_capacity(table.rows.len());
    for (gene, cells) in &table.rows {
        if gene == &table.index_name {
            continue;
        }
        let values = cells
            .iter()
            .map(|cell| match cell.as_deref() {
                None => None,
                Some(raw) => {
                    let v = parse_number(raw);
                    if v.is_none() && !raw.trim().is_empty() {
                        n_coerced += 1;
                    }
                    v
                }
            })
            .collect();
        parsed.push((gene.as_str(), values));
    }
    if n_coerced > 0 {
        warn!("Coerced {} non-numeric values to missing", n_coerced);
    }

    let mut seen = HashSet::new();
    let n_duplicates = parsed.iter().filter(|(g, _)| !seen.insert(*g)).count();
    let rows: Vec<(String, Vec<f64>)> = if n_duplicates > 0 {
        info!("Summing {} duplicate gene entries", n_duplicates);
        let mut summed: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for (gene, values) in &parsed {
            let acc = summed
                .entry(*gene)
                .or_insert_with(|| vec![0.0; table.n_samples()]);
            for (a, v) in acc.iter_mut().zip(values) {
                *a += v.unwrap_or(0.0);
            }
        }
        summed
            .into_iter()
            .map(|(g, v)| (g.to_string(), v))
            .collect()
    } else {
        parsed
            .into_iter()
            .map(|(g, v)| (g.to_string(), v.into_iter().map(|x| x.unwrap_or(0.0)).collect()))
            .collect()
    };

    let mut tri_mat = TriMat::new((rows.len(), table.n_samples()));
    for (r, (_, values)) in rows.iter().enumerate() {
        for (c, &v) in values.iter().enumerate() {
            if v != 0.0 {
                tri_mat.add_triplet(r, c, v);
            }
        }
    }
    let gene_ids = rows.into_iter().map(|(g, _)| g).collect();
    ExpressionMatrix::new(tri_mat.to_csr(), gene_ids, table.sample_ids.clone())
}

/// Outer-join raw tables on gene, then clean the result.
///
/// Genes keep first-seen order; a gene repeated within a table is matched
/// occurrence by occurrence. A sample ID seen in an earlier table is skipped.
pub fn merge_tables(tables: &[RawTable]) -> Result<ExpressionMatrix> {
    if tables.is_empty() {
        return Err(ScError::EmptyData("No tables to merge".to_string()));
    }
    info!("Merging {} tables", tables.len());

    let mut merged = RawTable {
        index_name: INDEX_NAME.to_string(),
        sample_ids: Vec::new(),
        rows: Vec::new(),
    };
    let mut row_index: HashMap<(String, usize), usize> = HashMap::new();

    for table in tables {
        let keep: Vec<usize> = (0..table.n_samples())
            .filter(|&i| {
                let sid = &table.sample_ids[i];
                if merged.sample_ids.contains(sid) {
                    warn!("Duplicate sample '{}' skipped", sid);
                    false
                } else {
                    true
                }
            })
            .collect();
        let offset = merged.sample_ids.len();
        merged
            .sample_ids
            .extend(keep.iter().map(|&i| table.sample_ids[i].clone()));
        let width = merged.sample_ids.len();
        for (_, cells) in merged.rows.iter_mut() {
            cells.resize(width, None);
        }

        let mut occurrences: HashMap<&str, usize> = HashMap::new();
        for (gene, cells) in &table.rows {
            let occurrence = occurrences.entry(gene.as_str()).or_insert(0);
            let key = (gene.clone(), *occurrence);
            *occurrence += 1;
            let r = *row_index.entry(key).or_insert_with(|| {
                merged.rows.push((gene.clone(), vec![None; width]));
                merged.rows.len() - 1
            });
            for (j, &i) in keep.iter().enumerate() {
                merged.rows[r].1[offset + j] = cells.get(i).cloned().flatten();
            }
        }
    }

    let matrix = clean_table(&merged)?;
    info!(
        "Merged matrix: {} genes × {} samples",
        matrix.n_genes(),
        matrix.n_samples()
    );
    Ok(matrix)
}

/// Condition labels derived from one sample's SRA attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub combined_label: String,
    pub cell_count_detail: String,
    pub protocol_detail: &'static str,
    pub stimulation_detail: &'static str,
}

impl Condition {
    /// Parse `cell_count`, `protocol`, `source_name` and `treatment`.
    ///
    /// Absent columns read as `Unknown` (cell count) or empty; empty cells
    /// read as `nan`.
    pub fn from_record(record: &SraRecord) -> Self {
        let cell_count = record.value_or("cell_count", "Unknown").trim().to_string();
        let protocol = record.value_or("protocol", "").trim().to_string();
        let source = record.value_or("source_name", "").trim().to_string();
        let treatment = record.value_or("treatment", "").trim().to_string();

        let cells = if cell_count.contains("1 cell") {
            "SC"
        } else if cell_count.contains("10,000 cells") {
            "Bulk_10k"
        } else {
            "Unknown_Cells"
        };

        let protocol_detail = if protocol.contains("molecular barcodes (MB)") {
            "MB_Protocol"
        } else if protocol.is_empty() || protocol == "nan" {
            "Std_Protocol"
        } else {
            "Other_Protocol"
        };

        let unspecified_source = source.is_empty() || source == "nan";
        let stimulation_detail = if source.contains("BMDC (4h LPS stim)") {
            "LPS_4h"
        } else if treatment == "LPS-stimulation" && unspecified_source {
            match (cells, protocol_detail) {
                ("SC", "Std_Protocol") | ("Bulk_10k", _) | ("SC", "MB_Protocol") => "LPS_4h",
                _ => "LPS_UnknownDetail",
            }
        } else {
            "Unstimulated"
        };

        Self {
            combined_label: format!("{}_{}_{}", cells, protocol_detail, stimulation_detail),
            cell_count_detail: cell_count,
            protocol_detail,
            stimulation_detail,
        }
    }

    fn cells(&self) -> [(&'static str, Variable); 4] {
        [
            ("Combined_Label", Variable::text(&self.combined_label)),
            ("Cell_Count_Detail", Variable::text(&self.cell_count_detail)),
            ("Protocol_Detail", Variable::text(self.protocol_detail)),
            ("Stimulation_Detail", Variable::text(self.stimulation_detail)),
        ]
    }
}

/// Condition metadata per `Sample Name`, aligned to the analysed samples.
///
/// Samples come from `pca_ids` when non-empty, else from the QC metrics; a
/// sample without SRA runs gets `Combined_Label = Unknown_Condition`. QC
/// metrics, when given, are joined as extra columns. With neither, every SRA
/// sample is returned.
pub fn prepare_sample_metadata(
    sra: &SraRunTable,
    qc: Option<&QcMetrics>,
    pca_ids: Option<&[String]>,
) -> Result<SampleMetadata> {
    if sra.is_empty() {
        error!("SRA run table is empty");
        return Ok(SampleMetadata::new());
    }

    let mut conditions = SampleMetadata::new();
    for (gsm_id, record) in sra.first_by("Sample Name")? {
        conditions.push_row(&gsm_id, Condition::from_record(&record).cells());
    }

    let target: Vec<String> = match (pca_ids, qc) {
        (Some(ids), _) if !ids.is_empty() => {
            info!("Aligning metadata to {} PCA samples", ids.len());
            ids.to_vec()
        }
        (_, Some(qc)) if !qc.is_empty() => {
            info!("Aligning metadata to {} QC samples", qc.len());
            qc.sample_ids()
        }
        _ => {
            warn!("No QC or PCA samples given, returning all SRA samples");
            return Ok(conditions);
        }
    };

    let mut metadata = conditions.reindex(&target);
    metadata.fill_missing("Combined_Label", Variable::text("Unknown_Condition"));
    if let Some(qc) = qc {
        metadata.join_left(&qc.to_metadata());
    }
    info!(
        "Metadata prepared: {} samples × {} columns",
        metadata.n_samples(),
        metadata.n_columns()
    );
    Ok(metadata)
}

fn is_table_file(name: &str) -> bool {
    let stem = name.strip_suffix(".gz").unwrap_or(name);
    stem.ends_with(".txt") || stem.ends_with(".tsv")
}

/// Load one table file, or every `.txt`/`.tsv` table in a directory, and
/// label the merged samples from the SRA run table.
pub fn load(expression_path: &Path, sra_path: &Path) -> Result<LoadedDataset> {
    let files = if expression_path.is_file() {
        vec![expression_path.to_path_buf()]
    } else {
        list_files(expression_path, is_table_file)?
    };
    info!("Found {} expression tables", files.len());

    let mut tables = Vec::new();
    for path in &files {
        let name = file_name(path).unwrap_or_default();
        match RawTable::from_tsv(path) {
            Ok(table) if table.n_samples() > 0 => {
                info!(
                    "{}: {} rows × {} samples{}",
                    name,
                    table.n_genes(),
                    table.n_samples(),
                    if is_gzipped(path) { " (gzip)" } else { "" }
                );
                tables.push(table);
            }
            Ok(_) => warn!("{} has no sample columns, skipped", name),
            Err(e) => warn!("Failed to load {}: {}", name, e),
        }
    }
    let expression = merge_tables(&tables)?;

    let sra = SraRunTable::from_csv(sra_path)?;
    let metadata = prepare_sample_metadata(&sra, None, Some(expression.sample_ids()))?;
    Ok(LoadedDataset { expression, metadata })
}
