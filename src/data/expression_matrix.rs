//! Expression matrix with sparse storage for single-cell expression values.

use crate::data::io::{open_text, parse_number};
use crate::data::LabeledMatrix;
use crate::error::{Result, ScError};
use log::warn;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sprs::{CsMat, TriMat};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;

/// How repeated gene identifiers within one sample are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DuplicatePolicy {
    /// Add the values together (isoforms, fragments of the same gene).
    #[default]
    Sum,
    /// Average the values.
    Mean,
    /// Keep the first value seen.
    First,
}

impl DuplicatePolicy {
    fn combine(self, acc: &mut (f64, usize), value: f64) {
        match self {
            DuplicatePolicy::Sum | DuplicatePolicy::Mean => {
                acc.0 += value;
                acc.1 += 1;
            }
            DuplicatePolicy::First => {
                if acc.1 == 0 {
                    acc.0 = value;
                }
                acc.1 += 1;
            }
        }
    }

    fn finish(self, acc: (f64, usize)) -> f64 {
        match self {
            DuplicatePolicy::Mean if acc.1 > 0 => acc.0 / acc.1 as f64,
            _ => acc.0,
        }
    }
}

/// One sample's expression values, as read from a per-sample file.
#[derive(Debug, Clone)]
pub struct SampleColumn {
    pub sample_id: String,
    pub values: Vec<(String, f64)>,
}

impl SampleColumn {
    pub fn new(sample_id: impl Into<String>) -> Self {
        Self {
            sample_id: sample_id.into(),
            values: Vec::new(),
        }
    }

    pub fn push(&mut self, gene: impl Into<String>, value: f64) {
        self.values.push((gene.into(), value));
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A single (gene, sample, value) observation in long format.
#[derive(Debug, Clone, PartialEq)]
pub struct LongRecord {
    pub gene: String,
    pub sample: String,
    pub value: f64,
}

/// A sparse expression matrix storing values across samples.
///
/// Rows represent genes, columns represent samples.
/// Uses CSR (Compressed Sparse Row) format for efficient row-wise operations.
#[derive(Debug, Clone)]
pub struct ExpressionMatrix {
    /// Sparse matrix in CSR format (genes × samples)
    data: CsMat<f64>,
    /// Gene identifiers (row names)
    gene_ids: Vec<String>,
    /// Sample identifiers (column names)
    sample_ids: Vec<String>,
}

impl ExpressionMatrix {
    /// Create a new ExpressionMatrix from a sparse matrix and identifiers.
    pub fn new(data: CsMat<f64>, gene_ids: Vec<String>, sample_ids: Vec<String>) -> Result<Self> {
        let (nrows, ncols) = data.shape();
        if nrows != gene_ids.len() {
            return Err(ScError::DimensionMismatch {
                expected: nrows,
                actual: gene_ids.len(),
            });
        }
        if ncols != sample_ids.len() {
            return Err(ScError::DimensionMismatch {
                expected: ncols,
                actual: sample_ids.len(),
            });
        }
        Ok(Self {
            data,
            gene_ids,
            sample_ids,
        })
    }

    /// A matrix with no genes and no samples.
    pub fn empty() -> Self {
        Self {
            data: TriMat::<f64>::new((0, 0)).to_csr(),
            gene_ids: Vec::new(),
            sample_ids: Vec::new(),
        }
    }

    /// Load an expression matrix from a TSV file (optionally gzipped).
    ///
    /// Expected format:
    /// - First row: header with sample IDs (first column is the gene ID header)
    /// - Subsequent rows: gene ID followed by values; `NA` and empty cells are 0
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = open_text(path)?;
        let mut lines = reader.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| ScError::EmptyData("Empty TSV file".to_string()))??;
        let header: Vec<&str> = header_line.split('\t').collect();
        if header.len() < 2 {
            return Err(ScError::EmptyData(
                "TSV must have at least one sample".to_string(),
            ));
        }
        let sample_ids: Vec<String> = header[1..].iter().map(|s| s.trim().to_string()).collect();
        let n_samples = sample_ids.len();

        let mut triplets: Vec<(usize, usize, f64)> = Vec::new();
        let mut gene_ids: Vec<String> = Vec::new();

        for line_result in lines {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            let row_idx = gene_ids.len();
            gene_ids.push(fields[0].trim().to_string());

            for (col_idx, value_str) in fields[1..].iter().enumerate().take(n_samples) {
                let trimmed = value_str.trim();
                let value = match parse_number(trimmed) {
                    Some(v) => v,
                    None if trimmed.is_empty()
                        || trimmed.eq_ignore_ascii_case("na")
                        || trimmed.eq_ignore_ascii_case("nan") =>
                    {
                        0.0
                    }
                    None => {
                        return Err(ScError::InvalidValue {
                            value: value_str.to_string(),
                            row: row_idx,
                            col: col_idx,
                        })
                    }
                };
                if value != 0.0 {
                    triplets.push((row_idx, col_idx, value));
                }
            }
        }

        if gene_ids.is_empty() {
            return Err(ScError::EmptyData("No genes in TSV".to_string()));
        }

        let mut tri_mat = TriMat::new((gene_ids.len(), n_samples));
        for (row, col, val) in triplets {
            tri_mat.add_triplet(row, col, val);
        }

        Self::new(tri_mat.to_csr(), gene_ids, sample_ids)
    }

    /// Write the expression matrix to a TSV file.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        write!(writer, "gene_id")?;
        for sample_id in &self.sample_ids {
            write!(writer, "\t{}", sample_id)?;
        }
        writeln!(writer)?;

        for (row_idx, gene_id) in self.gene_ids.iter().enumerate() {
            write!(writer, "{}", gene_id)?;
            for value in self.row_dense(row_idx) {
                write!(writer, "\t{}", value)?;
            }
            writeln!(writer)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Outer-join per-sample columns into one matrix.
    ///
    /// Genes keep the order in which they are first seen; a gene absent from a
    /// sample is 0. Repeated genes within a sample are combined with `policy`.
    /// A repeated sample ID is skipped with a warning.
    pub fn from_columns(columns: Vec<SampleColumn>, policy: DuplicatePolicy) -> Result<Self> {
        let mut gene_index: HashMap<String, usize> = HashMap::new();
        let mut gene_ids: Vec<String> = Vec::new();
        let mut sample_ids: Vec<String> = Vec::new();
        let mut seen_samples: HashSet<String> = HashSet::new();
        let mut triplets: Vec<(usize, usize, f64)> = Vec::new();

        for column in columns {
            if !seen_samples.insert(column.sample_id.clone()) {
                warn!("Duplicate sample '{}' skipped", column.sample_id);
                continue;
            }
            let col_idx = sample_ids.len();
            sample_ids.push(column.sample_id);

            let mut order: Vec<usize> = Vec::new();
            let mut acc: HashMap<usize, (f64, usize)> = HashMap::new();
            for (gene, value) in column.values {
                let row = *gene_index.entry(gene.clone()).or_insert_with(|| {
                    gene_ids.push(gene);
                    gene_ids.len() - 1
                });
                let slot = acc.entry(row).or_insert_with(|| {
                    order.push(row);
                    (0.0, 0)
                });
                policy.combine(slot, value);
            }
            for row in order {
                let value = policy.finish(acc[&row]);
                if value != 0.0 {
                    triplets.push((row, col_idx, value));
                }
            }
        }

        let mut tri_mat = TriMat::new((gene_ids.len(), sample_ids.len()));
        for (row, col, val) in triplets {
            tri_mat.add_triplet(row, col, val);
        }
        Self::new(tri_mat.to_csr(), gene_ids, sample_ids)
    }

    /// Pivot long-format records into a matrix.
    ///
    /// Genes and samples are sorted; missing combinations are 0 and repeated
    /// (gene, sample) pairs are combined with `policy`.
    pub fn from_long(records: Vec<LongRecord>, policy: DuplicatePolicy) -> Result<Self> {
        let genes: BTreeSet<&str> = records.iter().map(|r| r.gene.as_str()).collect();
        let samples: BTreeSet<&str> = records.iter().map(|r| r.sample.as_str()).collect();
        let gene_ids: Vec<String> = genes.into_iter().map(String::from).collect();
        let sample_ids: Vec<String> = samples.into_iter().map(String::from).collect();

        let gene_pos: HashMap<&str, usize> = gene_ids
            .iter()
            .enumerate()
            .map(|(i, g)| (g.as_str(), i))
            .collect();
        let sample_pos: HashMap<&str, usize> = sample_ids
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i))
            .collect();

        let mut acc: HashMap<(usize, usize), (f64, usize)> = HashMap::new();
        for record in &records {
            let key = (gene_pos[record.gene.as_str()], sample_pos[record.sample.as_str()]);
            policy.combine(acc.entry(key).or_insert((0.0, 0)), record.value);
        }

        let mut tri_mat = TriMat::new((gene_ids.len(), sample_ids.len()));
        for ((row, col), slot) in acc {
            let value = policy.finish(slot);
            if value != 0.0 {
                tri_mat.add_triplet(row, col, value);
            }
        }
        Self::new(tri_mat.to_csr(), gene_ids, sample_ids)
    }

    /// Get the value at (row, col), returning 0 for missing entries.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data.get(row, col).copied().unwrap_or(0.0)
    }

    /// Number of genes (rows).
    #[inline]
    pub fn n_genes(&self) -> usize {
        self.data.rows()
    }

    /// Number of samples (columns).
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.data.cols()
    }

    /// Whether the matrix has no genes or no samples.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n_genes() == 0 || self.n_samples() == 0
    }

    /// Total number of non-zero entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.data.nnz()
    }

    /// Gene identifiers.
    #[inline]
    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    /// Sample identifiers.
    #[inline]
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Get the underlying sparse matrix.
    #[inline]
    pub fn data(&self) -> &CsMat<f64> {
        &self.data
    }

    /// Get a dense vector for a specific row (gene).
    pub fn row_dense(&self, row: usize) -> Vec<f64> {
        let mut dense = vec![0.0; self.n_samples()];
        if let Some(row_vec) = self.data.outer_view(row) {
            for (col, &val) in row_vec.iter() {
                dense[col] = val;
            }
        }
        dense
    }

    /// Column sums (total expression per sample).
    pub fn col_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.n_samples()];
        for row_vec in self.data.outer_iterator() {
            for (col, &val) in row_vec.iter() {
                sums[col] += val;
            }
        }
        sums
    }

    /// Number of genes per sample with a value strictly above `threshold`.
    pub fn detected_per_sample(&self, threshold: f64) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_samples()];
        let mut stored = vec![0usize; self.n_samples()];
        for row_vec in self.data.outer_iterator() {
            for (col, &val) in row_vec.iter() {
                stored[col] += 1;
                if val > threshold {
                    counts[col] += 1;
                }
            }
        }
        if 0.0 > threshold {
            for (count, nnz) in counts.iter_mut().zip(stored) {
                *count += self.n_genes() - nnz;
            }
        }
        counts
    }

    /// Number of samples per gene with a value strictly above `threshold`.
    pub fn detected_per_gene(&self, threshold: f64) -> Vec<usize> {
        let n_samples = self.n_samples();
        (0..self.n_genes())
            .into_par_iter()
            .map(|row| {
                let (above, stored) = self
                    .data
                    .outer_view(row)
                    .map(|v| {
                        (
                            v.iter().filter(|(_, &val)| val > threshold).count(),
                            v.nnz(),
                        )
                    })
                    .unwrap_or((0, 0));
                if 0.0 > threshold {
                    above + (n_samples - stored)
                } else {
                    above
                }
            })
            .collect()
    }

    /// Subset the matrix to include only specified genes (by index).
    pub fn subset_genes(&self, indices: &[usize]) -> Result<Self> {
        let n_samples = self.n_samples();
        let mut tri_mat = TriMat::new((indices.len(), n_samples));
        let mut new_gene_ids = Vec::with_capacity(indices.len());

        for (new_row, &old_row) in indices.iter().enumerate() {
            if old_row >= self.n_genes() {
                return Err(ScError::InvalidParameter(format!(
                    "Gene index {} out of bounds",
                    old_row
                )));
            }
            new_gene_ids.push(self.gene_ids[old_row].clone());

            if let Some(row_vec) = self.data.outer_view(old_row) {
                for (col, &val) in row_vec.iter() {
                    tri_mat.add_triplet(new_row, col, val);
                }
            }
        }

        Self::new(tri_mat.to_csr(), new_gene_ids, self.sample_ids.clone())
    }

    /// Subset the matrix to include only specified samples (by index).
    pub fn subset_samples(&self, indices: &[usize]) -> Result<Self> {
        // A sample may be selected more than once
        let mut col_map: HashMap<usize, Vec<usize>> = HashMap::new();
        for (new_idx, &old_idx) in indices.iter().enumerate() {
            col_map.entry(old_idx).or_default().push(new_idx);
        }

        let mut new_sample_ids = Vec::with_capacity(indices.len());
        for &old_col in indices {
            if old_col >= self.n_samples() {
                return Err(ScError::InvalidParameter(format!(
                    "Sample index {} out of bounds",
                    old_col
                )));
            }
            new_sample_ids.push(self.sample_ids[old_col].clone());
        }

        let mut tri_mat = TriMat::new((self.n_genes(), indices.len()));
        for (row, row_vec) in self.data.outer_iterator().enumerate() {
            for (old_col, &val) in row_vec.iter() {
                let Some(new_cols) = col_map.get(&old_col) else { continue };
                for &new_col in new_cols {
                    tri_mat.add_triplet(row, new_col, val);
                }
            }
        }

        Self::new(tri_mat.to_csr(), self.gene_ids.clone(), new_sample_ids)
    }

    /// Subset and reorder samples by identifier.
    pub fn select_samples(&self, sample_ids: &[String]) -> Result<Self> {
        let position: HashMap<&str, usize> = self
            .sample_ids
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i))
            .collect();
        let indices = sample_ids
            .iter()
            .map(|sid| {
                position.get(sid.as_str()).copied().ok_or_else(|| {
                    ScError::SampleMismatch(format!("Sample '{}' not found in matrix", sid))
                })
            })
            .collect::<Result<Vec<usize>>>()?;
        self.subset_samples(&indices)
    }

    /// Convert to a dense matrix.
    pub fn to_dense(&self) -> nalgebra::DMatrix<f64> {
        let mut dense = nalgebra::DMatrix::zeros(self.n_genes(), self.n_samples());
        for (row, row_vec) in self.data.outer_iterator().enumerate() {
            for (col, &val) in row_vec.iter() {
                dense[(row, col)] = val;
            }
        }
        dense
    }

    /// Convert to a dense labeled matrix tagged as untransformed.
    pub fn to_labeled(&self) -> LabeledMatrix {
        LabeledMatrix {
            data: self.to_dense(),
            gene_ids: self.gene_ids.clone(),
            sample_ids: self.sample_ids.clone(),
            transformation: "raw".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::NamedTempFile;

    fn create_test_matrix() -> ExpressionMatrix {
        // 3 genes × 4 samples
        let mut tri_mat = TriMat::new((3, 4));
        tri_mat.add_triplet(0, 0, 10.0);
        tri_mat.add_triplet(0, 1, 20.5);
        tri_mat.add_triplet(0, 3, 5.0);
        tri_mat.add_triplet(1, 0, 100.0);
        tri_mat.add_triplet(1, 1, 200.0);
        tri_mat.add_triplet(1, 2, 150.0);
        tri_mat.add_triplet(1, 3, 175.0);
        tri_mat.add_triplet(2, 0, 0.5);

        let gene_ids = vec!["Actb".to_string(), "Gapdh".to_string(), "Sox2".to_string()];
        let sample_ids = vec![
            "GSM1".to_string(),
            "GSM2".to_string(),
            "GSM3".to_string(),
            "GSM4".to_string(),
        ];

        ExpressionMatrix::new(tri_mat.to_csr(), gene_ids, sample_ids).unwrap()
    }

    #[test]
    fn test_dimensions() {
        let mat = create_test_matrix();
        assert_eq!(mat.n_genes(), 3);
        assert_eq!(mat.n_samples(), 4);
        assert!(!mat.is_empty());
        assert!(ExpressionMatrix::empty().is_empty());
    }

    #[test]
    fn test_get_values() {
        let mat = create_test_matrix();
        assert_relative_eq!(mat.get(0, 1), 20.5);
        assert_relative_eq!(mat.get(0, 2), 0.0);
        assert_relative_eq!(mat.get(2, 0), 0.5);
    }

    #[test]
    fn test_col_sums() {
        let mat = create_test_matrix();
        let sums = mat.col_sums();
        assert_relative_eq!(sums[0], 110.5);
        assert_relative_eq!(sums[1], 220.5);
        assert_relative_eq!(sums[2], 150.0);
        assert_relative_eq!(sums[3], 180.0);
    }

    #[test]
    fn test_detection_counts() {
        let mat = create_test_matrix();
        assert_eq!(mat.detected_per_sample(1.0), vec![2, 2, 1, 2]);
        assert_eq!(mat.detected_per_gene(1.0), vec![3, 4, 0]);
        // Negative thresholds count implicit zeros as detected.
        assert_eq!(mat.detected_per_sample(-1.0), vec![3, 3, 3, 3]);
    }

    #[test]
    fn test_tsv_roundtrip() {
        let mat = create_test_matrix();
        let temp_file = NamedTempFile::new().unwrap();
        mat.to_tsv(temp_file.path()).unwrap();

        let loaded = ExpressionMatrix::from_tsv(temp_file.path()).unwrap();
        assert_eq!(loaded.gene_ids(), mat.gene_ids());
        assert_eq!(loaded.sample_ids(), mat.sample_ids());
        for row in 0..mat.n_genes() {
            for col in 0..mat.n_samples() {
                assert_relative_eq!(loaded.get(row, col), mat.get(row, col));
            }
        }
    }

    #[test]
    fn test_from_tsv_rejects_text() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "gene\tS1").unwrap();
        writeln!(file, "Actb\tabc").unwrap();
        file.flush().unwrap();
        assert!(matches!(
            ExpressionMatrix::from_tsv(file.path()),
            Err(ScError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_from_columns_outer_join() {
        let mut a = SampleColumn::new("GSM1");
        a.push("Actb", 5.0);
        a.push("Sox2", 1.0);
        a.push("Actb", 3.0);
        let mut b = SampleColumn::new("GSM2");
        b.push("Nanog", 2.0);
        b.push("Actb", 4.0);

        let summed = ExpressionMatrix::from_columns(vec![a.clone(), b.clone()], DuplicatePolicy::Sum)
            .unwrap();
        assert_eq!(summed.gene_ids(), &["Actb", "Sox2", "Nanog"]);
        assert_eq!(summed.sample_ids(), &["GSM1", "GSM2"]);
        assert_relative_eq!(summed.get(0, 0), 8.0);
        assert_relative_eq!(summed.get(2, 0), 0.0);
        assert_relative_eq!(summed.get(2, 1), 2.0);

        let averaged =
            ExpressionMatrix::from_columns(vec![a.clone(), b.clone()], DuplicatePolicy::Mean).unwrap();
        assert_relative_eq!(averaged.get(0, 0), 4.0);

        let first = ExpressionMatrix::from_columns(vec![a, b], DuplicatePolicy::First).unwrap();
        assert_relative_eq!(first.get(0, 0), 5.0);
    }

    #[test]
    fn test_from_long_pivot_sorted() {
        let records = vec![
            LongRecord { gene: "Zfp".into(), sample: "p2_1".into(), value: 1.0 },
            LongRecord { gene: "Actb".into(), sample: "p1_1".into(), value: 2.0 },
            LongRecord { gene: "Actb".into(), sample: "p1_1".into(), value: 4.0 },
        ];
        let mat = ExpressionMatrix::from_long(records, DuplicatePolicy::Mean).unwrap();
        assert_eq!(mat.gene_ids(), &["Actb", "Zfp"]);
        assert_eq!(mat.sample_ids(), &["p1_1", "p2_1"]);
        assert_relative_eq!(mat.get(0, 0), 3.0);
        assert_relative_eq!(mat.get(0, 1), 0.0);
    }

    #[test]
    fn test_subset_genes() {
        let mat = create_test_matrix();
        let subset = mat.subset_genes(&[0, 2]).unwrap();
        assert_eq!(subset.gene_ids(), &["Actb", "Sox2"]);
        assert_relative_eq!(subset.get(1, 0), 0.5);
        assert!(mat.subset_genes(&[5]).is_err());
    }

    #[test]
    fn test_select_samples() {
        let mat = create_test_matrix();
        let subset = mat
            .select_samples(&["GSM4".to_string(), "GSM2".to_string()])
            .unwrap();
        assert_eq!(subset.sample_ids(), &["GSM4", "GSM2"]);
        assert_relative_eq!(subset.get(0, 0), 5.0);
        assert_relative_eq!(subset.get(0, 1), 20.5);
        assert!(mat.select_samples(&["GSM9".to_string()]).is_err());
    }

    #[test]
    fn test_subset_samples_repeated_index() {
        let mat = create_test_matrix();
        let subset = mat.subset_samples(&[1, 3, 1]).unwrap();
        assert_eq!(subset.sample_ids(), &["GSM2", "GSM4", "GSM2"]);
        assert_relative_eq!(subset.get(0, 0), 20.5);
        assert_relative_eq!(subset.get(0, 2), 20.5);
        assert_relative_eq!(subset.get(1, 2), 200.0);
        assert_relative_eq!(subset.get(0, 1), 5.0);
    }
}
