//! Sample metadata aligned to expression matrix columns.

use crate::data::io::open_text;
use crate::error::{Result, ScError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;

/// A metadata cell: text, number, or missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Variable {
    /// Free text or a categorical label.
    Text(String),
    /// Numeric value.
    Numeric(f64),
    /// Missing value.
    Missing,
}

impl Variable {
    /// Build a text cell.
    pub fn text(value: impl Into<String>) -> Self {
        Variable::Text(value.into())
    }

    /// Check if this is a missing value.
    pub fn is_missing(&self) -> bool {
        matches!(self, Variable::Missing)
    }

    /// Try to get as text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Variable::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as a number.
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Variable::Numeric(v) => Some(*v),
            _ => None,
        }
    }

    /// String form used when the value serves as a class label.
    ///
    /// Missing values all collapse onto the single label `nan`.
    pub fn to_label(&self) -> String {
        match self {
            Variable::Text(s) => s.clone(),
            Variable::Numeric(v) => v.to_string(),
            Variable::Missing => "nan".to_string(),
        }
    }

    fn parse_cell(raw: &str) -> Self {
        let v = raw.trim();
        if is_missing_token(v) {
            Variable::Missing
        } else {
            Variable::Text(v.to_string())
        }
    }
}

impl std::fmt::Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Variable::Text(s) => write!(f, "{}", s),
            Variable::Numeric(v) => write!(f, "{}", v),
            Variable::Missing => write!(f, "NA"),
        }
    }
}

fn is_missing_token(v: &str) -> bool {
    v.is_empty() || v == "NA" || v == "na" || v == "nan" || v == "NaN"
}

/// Sample metadata: one row per sample, ordered columns of [`Variable`]s.
#[derive(Debug, Clone, Default)]
pub struct SampleMetadata {
    /// Sample IDs in order.
    sample_ids: Vec<String>,
    /// Column names in order.
    column_names: Vec<String>,
    /// Data stored as sample_id -> column_name -> Variable.
    data: HashMap<String, HashMap<String, Variable>>,
}

impl SampleMetadata {
    /// Create empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata with the given samples and no columns.
    pub fn with_index(sample_ids: &[String]) -> Self {
        let mut meta = Self::new();
        for sid in sample_ids {
            meta.ensure_sample(sid);
        }
        meta
    }

    /// Load metadata from a TSV file.
    ///
    /// The first column holds sample IDs. Columns whose values all parse as
    /// numbers become numeric, the rest stay text. `NA`, `nan` and empty cells
    /// are missing.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut lines = open_text(path)?.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| ScError::EmptyData("Empty metadata file".to_string()))??;
        let header: Vec<&str> = header_line.split('\t').collect();
        let column_names: Vec<String> = header[1..].iter().map(|s| s.trim().to_string()).collect();

        let mut raw_data: Vec<(String, Vec<String>)> = Vec::new();
        for line_result in lines {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            let values = fields[1..].iter().map(|s| s.to_string()).collect();
            raw_data.push((fields[0].trim().to_string(), values));
        }

        if raw_data.is_empty() {
            return Err(ScError::EmptyData("No samples in metadata".to_string()));
        }

        let numeric_columns: HashSet<usize> = (0..column_names.len())
            .filter(|&col_idx| {
                raw_data.iter().all(|(_, values)| {
                    values
                        .get(col_idx)
                        .map(|v| {
                            let v = v.trim();
                            is_missing_token(v) || v.parse::<f64>().is_ok()
                        })
                        .unwrap_or(true)
                })
            })
            .collect();

        let mut meta = Self::new();
        meta.column_names = column_names.clone();
        for (sample_id, values) in raw_data {
            meta.ensure_sample(&sample_id);
            for (col_idx, col_name) in column_names.iter().enumerate() {
                let var = match values.get(col_idx) {
                    None => Variable::Missing,
                    Some(raw) => match Variable::parse_cell(raw) {
                        Variable::Text(s) if numeric_columns.contains(&col_idx) => s
                            .parse::<f64>()
                            .map(Variable::Numeric)
                            .unwrap_or(Variable::Missing),
                        other => other,
                    },
                };
                meta.set(&sample_id, col_name, var);
            }
        }
        Ok(meta)
    }

    /// Write metadata to a TSV file (missing values as `NA`).
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        write!(writer, "sample_id")?;
        for col in &self.column_names {
            write!(writer, "\t{}", col)?;
        }
        writeln!(writer)?;
        for sid in &self.sample_ids {
            write!(writer, "{}", sid)?;
            for col in &self.column_names {
                let value = self.get(sid, col).unwrap_or(&Variable::Missing);
                write!(writer, "\t{}", value)?;
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn ensure_sample(&mut self, sample_id: &str) {
        if !self.data.contains_key(sample_id) {
            self.sample_ids.push(sample_id.to_string());
            self.data.insert(sample_id.to_string(), HashMap::new());
        }
    }

    fn ensure_column(&mut self, column: &str) {
        if !self.has_column(column) {
            self.column_names.push(column.to_string());
        }
    }

    /// Append (or extend) a sample row with the given cells.
    pub fn push_row<I, K>(&mut self, sample_id: &str, cells: I)
    where
        I: IntoIterator<Item = (K, Variable)>,
        K: Into<String>,
    {
        self.ensure_sample(sample_id);
        for (column, value) in cells {
            let column = column.into();
            self.set(sample_id, &column, value);
        }
    }

    /// Set one cell, adding the sample and column if needed.
    pub fn set(&mut self, sample_id: &str, column: &str, value: Variable) {
        self.ensure_sample(sample_id);
        self.ensure_column(column);
        if let Some(row) = self.data.get_mut(sample_id) {
            row.insert(column.to_string(), value);
        }
    }

    /// Sample IDs in order.
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Column names in order.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Number of samples.
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Number of columns.
    pub fn n_columns(&self) -> usize {
        self.column_names.len()
    }

    /// Whether there are no samples.
    pub fn is_empty(&self) -> bool {
        self.sample_ids.is_empty()
    }

    /// Get a value for a specific sample and column.
    ///
    /// Returns `None` when the sample or column is unknown; a known column with
    /// no value for the sample reads as [`Variable::Missing`].
    pub fn get(&self, sample_id: &str, column: &str) -> Option<&Variable> {
        if !self.has_column(column) {
            return None;
        }
        self.data
            .get(sample_id)
            .map(|row| row.get(column).unwrap_or(&Variable::Missing))
    }

    /// Get all values for a column, in sample order.
    pub fn column(&self, column: &str) -> Result<Vec<&Variable>> {
        if !self.has_column(column) {
            return Err(ScError::MissingColumn(column.to_string()));
        }
        Ok(self
            .sample_ids
            .iter()
            .map(|sid| {
                self.data
                    .get(sid)
                    .and_then(|m| m.get(column))
                    .unwrap_or(&Variable::Missing)
            })
            .collect())
    }

    /// A column rendered as class labels, in sample order.
    pub fn labels(&self, column: &str) -> Result<Vec<String>> {
        Ok(self.column(column)?.iter().map(|v| v.to_label()).collect())
    }

    /// Sorted distinct non-missing labels of a column.
    pub fn levels(&self, column: &str) -> Result<Vec<String>> {
        let mut levels: Vec<String> = self
            .column(column)?
            .iter()
            .filter(|v| !v.is_missing())
            .map(|v| v.to_label())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        levels.sort();
        Ok(levels)
    }

    /// Check if a sample exists.
    pub fn has_sample(&self, sample_id: &str) -> bool {
        self.data.contains_key(sample_id)
    }

    /// Check if a column exists.
    pub fn has_column(&self, column: &str) -> bool {
        self.column_names.iter().any(|c| c == column)
    }

    /// Subset metadata to exactly the specified samples, failing on unknown IDs.
    pub fn subset_samples(&self, sample_ids: &[String]) -> Result<Self> {
        if let Some(missing) = sample_ids.iter().find(|sid| !self.has_sample(sid)) {
            return Err(ScError::SampleMismatch(format!(
                "Sample '{}' not found in metadata",
                missing
            )));
        }
        Ok(self.reindex(sample_ids))
    }

    /// Reorder to the given samples; unknown samples get all-missing rows.
    pub fn reindex(&self, sample_ids: &[String]) -> Self {
        let mut data = HashMap::new();
        let mut new_ids = Vec::new();
        for sid in sample_ids {
            if data.contains_key(sid) {
                continue;
            }
            let row = self.data.get(sid).cloned().unwrap_or_default();
            data.insert(sid.clone(), row);
            new_ids.push(sid.clone());
        }
        Self {
            sample_ids: new_ids,
            column_names: self.column_names.clone(),
            data,
        }
    }

    /// Replace missing values of a column with `value`.
    pub fn fill_missing(&mut self, column: &str, value: Variable) {
        self.ensure_column(column);
        for row in self.data.values_mut() {
            let cell = row.entry(column.to_string()).or_insert(Variable::Missing);
            if cell.is_missing() {
                *cell = value.clone();
            }
        }
    }

    /// Left join: add the other table's columns for this table's samples.
    ///
    /// Columns already present here are kept as they are.
    pub fn join_left(&mut self, other: &SampleMetadata) {
        let new_columns: Vec<String> = other
            .column_names
            .iter()
            .filter(|c| !self.has_column(c))
            .cloned()
            .collect();
        for col in &new_columns {
            self.column_names.push(col.clone());
        }
        for sid in self.sample_ids.clone() {
            for col in &new_columns {
                let value = other.get(&sid, col).cloned().unwrap_or(Variable::Missing);
                if let Some(row) = self.data.get_mut(&sid) {
                    row.insert(col.clone(), value);
                }
            }
        }
    }

    /// Remove a column if present.
    pub fn drop_column(&mut self, column: &str) {
        self.column_names.retain(|c| c != column);
        for row in self.data.values_mut() {
            row.remove(column);
        }
    }
}

/// IDs present in both lists, in the order of `left`.
pub fn intersect_ids(left: &[String], right: &[String]) -> Vec<String> {
    let right: HashSet<&str> = right.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    left.iter()
        .filter(|id| right.contains(id.as_str()) && seen.insert(id.as_str()))
        .cloned()
        .collect()
}
