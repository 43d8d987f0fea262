//! GSE65528: Salmonella-exposed macrophages on two 96-well plates (TPM).
//!
//! Expression comes as one genes × wells table per plate; cells are named
//! `{plate}_{well}`. Sample annotations come from the GEO series matrix, whose
//! `!Sample_description` rows carry the plate file and column of each cell.

use super::{require_loaded, LoadedDataset};
use crate::data::io::{file_name, list_files, open_text, parse_number, read_tab_rows};
use crate::data::{intersect_ids, DuplicatePolicy, ExpressionMatrix, LongRecord, SampleMetadata, Variable};
use crate::error::{Result, ScError};
use log::{info, warn};
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;

/// Load both plate tables and align them with the series matrix annotations.
pub fn load(data_dir: &Path, series_matrix_path: &Path) -> Result<LoadedDataset> {
    let expression = load_expression(data_dir)?;
    let metadata = parse_series_matrix(series_matrix_path)?;

    let common = intersect_ids(expression.sample_ids(), metadata.sample_ids());
    if common.len() < expression.n_samples() {
        warn!(
            "{} of {} cells have no series matrix annotation",
            expression.n_samples() - common.len(),
            expression.n_samples()
        );
    }
    let expression = expression.select_samples(&common)?;
    let mut metadata = metadata.subset_samples(&common)?;

    for sid in &common {
        let time = metadata
            .get(sid, "TimePoint")
            .and_then(Variable::as_numeric)
            .unwrap_or(0.0);
        let status = metadata
            .get(sid, "Infection_Status")
            .map(Variable::to_label)
            .unwrap_or_else(|| "No_Bacteria".to_string());
        metadata.set(sid, "Combined_Label", Variable::text(format!("{}h_{}", time, status)));
    }

    info!(
        "GSE65528: {} genes × {} cells aligned",
        expression.n_genes(),
        expression.n_samples()
    );
    Ok(LoadedDataset { expression, metadata })
}

/// Stack the plate tables and pivot them into a genes × cells matrix.
///
/// Genes and cells are sorted; repeated (gene, cell) pairs are averaged.
pub fn load_expression(data_dir: &Path) -> Result<ExpressionMatrix> {
    let files = list_files(data_dir, |name| name.ends_with("TPM_table.txt.gz"))?;
    info!("Found {} plate tables in {}", files.len(), data_dir.display());

    let mut records = Vec::new();
    let mut n_loaded = 0;
    for path in &files {
        let Some(name) = file_name(path) else { continue };
        let Some(plate) = plate_id(name) else {
            warn!("{}: no plate id in file name, skipped", name);
            continue;
        };
        match read_plate(path, plate) {
            Ok(plate_records) => {
                records.extend(plate_records);
                n_loaded += 1;
            }
            Err(e) => warn!("Failed to load {}: {}", name, e),
        }
    }
    require_loaded(n_loaded, "plate tables")?;

    ExpressionMatrix::from_long(records, DuplicatePolicy::Mean)
}

fn plate_id(name: &str) -> Option<&'static str> {
    if name.contains("_p1_") {
        Some("p1")
    } else if name.contains("_p2_") {
        Some("p2")
    } else {
        None
    }
}

/// Melt one plate table. The first column holds gene IDs; when the header is
/// one field shorter than the data rows, every header field names a well.
fn read_plate(path: &Path, plate: &str) -> Result<Vec<LongRecord>> {
    let rows = read_tab_rows(path)?;
    let Some((header, body)) = rows.split_first() else {
        return Err(ScError::EmptyData(format!("{} is empty", path.display())));
    };
    let row_width = body.first().map(Vec::len).unwrap_or(header.len());
    let wells: &[String] = if header.len() + 1 == row_width {
        header
    } else {
        header.get(1..).unwrap_or(&[])
    };

    let mut records = Vec::with_capacity(body.len() * wells.len());
    for (r, row) in body.iter().enumerate() {
        let gene = row[0].trim();
        for (w, well) in wells.iter().enumerate() {
            let raw = row.get(w + 1).map(String::as_str).unwrap_or("");
            if raw.trim().is_empty() {
                continue;
            }
            let value = parse_number(raw).ok_or_else(|| ScError::InvalidValue {
                value: raw.to_string(),
                row: r + 2,
                col: w + 2,
            })?;
            records.push(LongRecord {
                gene: gene.to_string(),
                sample: format!("{}_{}", plate, well.trim()),
                value,
            });
        }
    }
    Ok(records)
}

/// Parse a GEO series matrix into metadata keyed by `{plate_id}_{plate_column}`.
///
/// Columns: `GSM_ID`, one column per characteristic key (lower-cased, spaces
/// to `_`, parentheses and `?` removed), `plate_column`, `plate_id`,
/// `Infection_Status` and `TimePoint`. Samples without a plate or column are
/// dropped.
pub fn parse_series_matrix(path: &Path) -> Result<SampleMetadata> {
    let reader = open_text(path)?;

    let mut gsm_ids: Vec<String> = Vec::new();
    let mut characteristics: BTreeMap<usize, Vec<(String, String)>> = BTreeMap::new();
    let mut descriptions: BTreeMap<usize, Vec<(String, String)>> = BTreeMap::new();

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with("!series_matrix_table") {
            continue;
        }
        let mut parts = line.split('\t');
        let header = parts.next().unwrap_or("");
        let values: Vec<&str> = parts.map(|v| v.trim_matches('"')).collect();

        match header {
            "!Sample_geo_accession" => {
                gsm_ids = values.iter().map(|v| v.to_string()).collect();
            }
            "!Sample_characteristics_ch1" => {
                for (i, entry) in values.iter().enumerate() {
                    if let Some((key, value)) = entry.split_once(':') {
                        characteristics
                            .entry(i)
                            .or_default()
                            .push((clean_key(key), value.trim().to_string()));
                    }
                }
            }
            "!Sample_description" => {
                for (i, entry) in values.iter().enumerate() {
                    if let Some(column) = plate_column(entry) {
                        descriptions
                            .entry(i)
                            .or_default()
                            .push(("plate_column".to_string(), column));
                    } else if entry.contains("_table.txt") {
                        let base = entry.rsplit('/').next().unwrap_or(entry);
                        if let Some(plate) = plate_id(base) {
                            descriptions
                                .entry(i)
                                .or_default()
                                .push(("plate_id".to_string(), plate.to_string()));
                        }
                    }
                }
            }
            _ => {}
        }
    }

    if gsm_ids.is_empty() {
        return Err(ScError::Parse(format!(
            "{}: no !Sample_geo_accession line",
            path.display()
        )));
    }

    let mut metadata = SampleMetadata::new();
    for (i, gsm_id) in gsm_ids.iter().enumerate() {
        let mut fields: Vec<(String, String)> = characteristics.remove(&i).unwrap_or_default();
        fields.extend(descriptions.remove(&i).unwrap_or_default());
        let lookup = |key: &str| {
            fields
                .iter()
                .rev()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        let (Some(plate), Some(column)) = (lookup("plate_id"), lookup("plate_column")) else {
            warn!("{}: no plate position in series matrix, skipped", gsm_id);
            continue;
        };
        let cell_id = format!("{}_{}", plate, column);

        let status = infection_status(lookup("phrodo_positive"), lookup("gfp_positive"));
        let time = lookup("time_after_salmonella_exposure_h")
            .and_then(|t| t.trim().parse::<f64>().ok())
            .filter(|t| t.is_finite())
            .map(f64::trunc)
            .unwrap_or(0.0);

        let mut cells: Vec<(String, Variable)> = vec![("GSM_ID".to_string(), Variable::text(gsm_id))];
        cells.extend(fields.iter().map(|(k, v)| (k.clone(), Variable::text(v))));
        cells.push(("Infection_Status".to_string(), Variable::text(status)));
        cells.push(("TimePoint".to_string(), Variable::Numeric(time)));
        metadata.push_row(&cell_id, cells);
    }

    info!("Parsed {} annotated cells from series matrix", metadata.n_samples());
    Ok(metadata)
}

fn clean_key(key: &str) -> String {
    key.trim()
        .to_lowercase()
        .replace(' ', "_")
        .replace(['(', ')', '?'], "")
}

/// `Column 12 of processed data file` → `12`.
fn plate_column(entry: &str) -> Option<String> {
    if entry.contains("Column ") && entry.contains(" of processed data file") {
        Some(
            entry
                .replace("Column ", "")
                .replace(" of processed data file", ""),
        )
    } else {
        None
    }
}

fn infection_status(phrodo: Option<&str>, gfp: Option<&str>) -> &'static str {
    let yes = |v: Option<&str>| v.map(|s| s.eq_ignore_ascii_case("yes")).unwrap_or(false);
    match (yes(phrodo), yes(gfp)) {
        (true, true) => "Live_Bacteria",
        (true, false) => "Dead_Bacteria",
        _ => "No_Bacteria",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::fixtures::{write_gz, write_text};
    use tempfile::TempDir;

    const SERIES: &str = "!Series_title\t\"Salmonella\"\n\
!Sample_geo_accession\t\"GSM1\"\t\"GSM2\"\t\"GSM3\"\n\
!Sample_characteristics_ch1\t\"time after salmonella exposure (h): 4\"\t\"time after salmonella exposure (h): 24\"\t\"time after salmonella exposure (h): unexposed\"\n\
!Sample_characteristics_ch1\t\"pHrodo positive?: yes\"\t\"pHrodo positive?: yes\"\t\"pHrodo positive?: no\"\n\
!Sample_characteristics_ch1\t\"GFP positive?: yes\"\t\"GFP positive?: no\"\t\"GFP positive?: no\"\n\
!Sample_description\t\"Column 1 of processed data file\"\t\"Column 2 of processed data file\"\t\"Column 1 of processed data file\"\n\
!Sample_description\t\"GSE65528_p1_TPM_table.txt\"\t\"GSE65528_p1_TPM_table.txt\"\t\"ftp/GSE65528_p2_TPM_table.txt\"\n\
!series_matrix_table_begin\n\
!series_matrix_table_end\n";

    fn setup() -> TempDir {
        let dir = TempDir::new().unwrap();
        // Header without an index name: one field shorter than the rows
        write_gz(
            dir.path(),
            "GSE65528_p1_TPM_table.txt.gz",
            "1\t2\nActb\t10\t20\nTnf\t0\t4\n",
        );
        write_gz(
            dir.path(),
            "GSE65528_p2_TPM_table.txt.gz",
            "gene\t1\t2\nActb\t6\t8\nIl1b\t3\t0\n",
        );
        write_gz(dir.path(), "GSE65528_p3_other_TPM_table.txt.gz", "x\t1\nA\t1\n");
        write_text(dir.path(), "series_matrix.txt", SERIES);
        dir
    }

    #[test]
    fn test_load_expression() {
        let dir = setup();
        let matrix = load_expression(dir.path()).unwrap();
        assert_eq!(matrix.sample_ids(), &["p1_1", "p1_2", "p2_1", "p2_2"]);
        assert_eq!(matrix.gene_ids(), &["Actb", "Il1b", "Tnf"]);
        assert_eq!(matrix.get(0, 1), 20.0);
        assert_eq!(matrix.get(1, 2), 3.0);
        assert_eq!(matrix.get(1, 0), 0.0);
    }

    #[test]
    fn test_parse_series_matrix() {
        let dir = setup();
        let meta = parse_series_matrix(&dir.path().join("series_matrix.txt")).unwrap();
        assert_eq!(meta.sample_ids(), &["p1_1", "p1_2", "p2_1"]);
        assert_eq!(meta.get("p1_1", "GSM_ID"), Some(&Variable::text("GSM1")));
        assert_eq!(
            meta.get("p1_1", "time_after_salmonella_exposure_h"),
            Some(&Variable::text("4"))
        );
        assert_eq!(meta.get("p1_1", "Infection_Status"), Some(&Variable::text("Live_Bacteria")));
        assert_eq!(meta.get("p1_2", "Infection_Status"), Some(&Variable::text("Dead_Bacteria")));
        assert_eq!(meta.get("p2_1", "Infection_Status"), Some(&Variable::text("No_Bacteria")));
        // Non-numeric time points become 0
        assert_eq!(meta.get("p2_1", "TimePoint"), Some(&Variable::Numeric(0.0)));
    }

    #[test]
    fn test_load_aligned() {
        let dir = setup();
        let data = load(dir.path(), &dir.path().join("series_matrix.txt")).unwrap();
        // p2_2 has no annotation
        assert_eq!(data.expression.sample_ids(), &["p1_1", "p1_2", "p2_1"]);
        assert_eq!(data.metadata.sample_ids(), data.expression.sample_ids());
        assert_eq!(
            data.metadata.labels("Combined_Label").unwrap(),
            vec!["4h_Live_Bacteria", "24h_Dead_Bacteria", "0h_No_Bacteria"]
        );
    }

    #[test]
    fn test_helpers() {
        assert_eq!(clean_key(" pHrodo positive? "), "phrodo_positive");
        assert_eq!(plate_column("Column 96 of processed data file").as_deref(), Some("96"));
        assert_eq!(plate_id("x_p3_y"), None);
    }
}
