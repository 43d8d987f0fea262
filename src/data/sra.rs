//! SRA run tables: per-run CSV exports keyed by GEO sample name.

use crate::data::io::open_text;
use crate::error::{Result, ScError};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// One row of a run table. Every table column is present; empty cells are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SraRecord {
    values: HashMap<String, Option<String>>,
}

impl SraRecord {
    /// Build a record from (column, value) pairs; empty values count as missing.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = pairs
            .into_iter()
            .map(|(k, v)| {
                let v: String = v.into();
                (k.into(), if v.is_empty() { None } else { Some(v) })
            })
            .collect();
        Self { values }
    }

    /// Whether the table this record came from has the column.
    pub fn has_column(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    /// Non-empty value of a column.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).and_then(|v| v.as_deref())
    }

    /// Value of a column as text: `default` when the column does not exist,
    /// `nan` when the cell is empty.
    pub fn value_or(&self, column: &str, default: &str) -> String {
        match self.values.get(column) {
            None => default.to_string(),
            Some(None) => "nan".to_string(),
            Some(Some(v)) => v.clone(),
        }
    }

    /// Set or replace a value.
    pub fn insert(&mut self, column: &str, value: Option<String>) {
        self.values.insert(column.to_string(), value);
    }
}

/// An SRA run table loaded from CSV.
#[derive(Debug, Clone, Default)]
pub struct SraRunTable {
    columns: Vec<String>,
    records: Vec<SraRecord>,
}

impl SraRunTable {
    /// Build a table from column names and records.
    pub fn new(columns: Vec<String>, records: Vec<SraRecord>) -> Self {
        Self { columns, records }
    }

    /// Load a comma-separated run table with a header row (gzip aware).
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = open_text(path)?;
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let columns: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if columns.is_empty() {
            return Err(ScError::EmptyData("Run table has no header".to_string()));
        }

        let mut records = Vec::new();
        for row in csv_reader.records() {
            let row = row?;
            let record = SraRecord::from_pairs(
                columns
                    .iter()
                    .enumerate()
                    .map(|(i, col)| (col.clone(), row.get(i).unwrap_or("").to_string())),
            );
            records.push(record);
        }

        Ok(Self { columns, records })
    }

    /// Column names in file order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Whether the table has the column.
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// All records in file order.
    pub fn records(&self) -> &[SraRecord] {
        &self.records
    }

    /// Number of runs.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table has no runs.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records whose `column` equals `value`, in file order.
    pub fn records_for<'a>(
        &'a self,
        column: &'a str,
        value: &'a str,
    ) -> impl Iterator<Item = &'a SraRecord> + 'a {
        self.records.iter().filter(move |r| r.get(column) == Some(value))
    }

    /// First record whose `column` equals `value`.
    pub fn find<'a>(&'a self, column: &'a str, value: &'a str) -> Option<&'a SraRecord> {
        self.records_for(column, value).next()
    }

    /// Collapse runs into one record per `key` value.
    ///
    /// Each column takes the first non-empty value within the group. Rows with
    /// an empty key are dropped. Groups are returned sorted by key.
    pub fn first_by(&self, key: &str) -> Result<Vec<(String, SraRecord)>> {
        if !self.has_column(key) {
            return Err(ScError::MissingColumn(key.to_string()));
        }
        let mut groups: BTreeMap<String, SraRecord> = BTreeMap::new();
        for record in &self.records {
            let Some(group_key) = record.get(key) else {
                continue;
            };
            let merged = groups.entry(group_key.to_string()).or_insert_with(|| {
                let mut empty = SraRecord::default();
                for col in &self.columns {
                    empty.insert(col, None);
                }
                empty
            });
            for col in &self.columns {
                if merged.get(col).is_none() {
                    if let Some(v) = record.get(col) {
                        merged.insert(col, Some(v.to_string()));
                    }
                }
            }
        }
        Ok(groups.into_iter().collect())
    }
}
