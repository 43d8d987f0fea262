//! Dense genes × samples matrix carried through the transformation steps.

use crate::error::{Result, ScError};
use nalgebra::DMatrix;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// A dense matrix with metadata about the transformation that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct LabeledMatrix {
    /// The values (genes × samples).
    #[serde(skip)]
    pub data: DMatrix<f64>,
    /// Gene identifiers.
    pub gene_ids: Vec<String>,
    /// Sample identifiers.
    pub sample_ids: Vec<String>,
    /// Name of the last transformation applied.
    pub transformation: String,
}

impl LabeledMatrix {
    /// Create a labeled matrix, checking that the identifiers match the shape.
    pub fn new(
        data: DMatrix<f64>,
        gene_ids: Vec<String>,
        sample_ids: Vec<String>,
        transformation: &str,
    ) -> Result<Self> {
        if data.nrows() != gene_ids.len() {
            return Err(ScError::DimensionMismatch {
                expected: data.nrows(),
                actual: gene_ids.len(),
            });
        }
        if data.ncols() != sample_ids.len() {
            return Err(ScError::DimensionMismatch {
                expected: data.ncols(),
                actual: sample_ids.len(),
            });
        }
        Ok(Self {
            data,
            gene_ids,
            sample_ids,
            transformation: transformation.to_string(),
        })
    }

    /// An empty matrix.
    pub fn empty(transformation: &str) -> Self {
        Self {
            data: DMatrix::zeros(0, 0),
            gene_ids: Vec::new(),
            sample_ids: Vec::new(),
            transformation: transformation.to_string(),
        }
    }

    /// Get the value for a gene and sample.
    pub fn get(&self, gene: usize, sample: usize) -> f64 {
        self.data[(gene, sample)]
    }

    /// Number of genes.
    pub fn n_genes(&self) -> usize {
        self.data.nrows()
    }

    /// Number of samples.
    pub fn n_samples(&self) -> usize {
        self.data.ncols()
    }

    /// Whether the matrix has no genes or no samples.
    pub fn is_empty(&self) -> bool {
        self.n_genes() == 0 || self.n_samples() == 0
    }

    /// Get a row (gene) as a vector.
    pub fn row(&self, gene: usize) -> Vec<f64> {
        self.data.row(gene).iter().cloned().collect()
    }

    /// Get a column (sample) as a vector.
    pub fn col(&self, sample: usize) -> Vec<f64> {
        self.data.column(sample).iter().cloned().collect()
    }

    /// Get reference to the underlying matrix.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Same identifiers, new values and transformation name.
    pub fn with_data(&self, data: DMatrix<f64>, transformation: &str) -> Result<Self> {
        Self::new(
            data,
            self.gene_ids.clone(),
            self.sample_ids.clone(),
            transformation,
        )
    }

    /// Keep the given genes (by index), in the given order.
    pub fn subset_genes(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.n_genes()) {
            return Err(ScError::InvalidParameter(format!(
                "Gene index {} out of bounds",
                bad
            )));
        }
        let data = self.data.select_rows(indices);
        let gene_ids = indices.iter().map(|&i| self.gene_ids[i].clone()).collect();
        Self::new(data, gene_ids, self.sample_ids.clone(), &self.transformation)
    }

    /// Write genes × samples values to a TSV file.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        write!(writer, "gene_id")?;
        for sample_id in &self.sample_ids {
            write!(writer, "\t{}", sample_id)?;
        }
        writeln!(writer)?;
        for (i, gene_id) in self.gene_ids.iter().enumerate() {
            write!(writer, "{}", gene_id)?;
            for j in 0..self.n_samples() {
                write!(writer, "\t{}", self.data[(i, j)])?;
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }
}
