//! Loaders for public GEO single-cell datasets.
//!
//! Each accession ships its expression values in a different layout (one file
//! per cell, plate tables, long tracking files) and annotates its samples in a
//! different way (SRA run tables, GEO series matrices). Every loader returns
//! the same [`LoadedDataset`]: a genes × samples [`ExpressionMatrix`] and
//! [`SampleMetadata`] keyed by the matrix's sample IDs.

pub mod gse41265;
pub mod gse42268;
pub mod gse45719;
pub mod gse52583;
pub mod gse55291;
pub mod gse65528;
pub mod gse74596;

use crate::data::{ExpressionMatrix, SampleMetadata, SraRecord, Variable};
use crate::error::{Result, ScError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Expression matrix with its sample annotations.
#[derive(Debug, Clone)]
pub struct LoadedDataset {
    pub expression: ExpressionMatrix,
    pub metadata: SampleMetadata,
}

impl std::fmt::Display for LoadedDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Expression: {} genes × {} samples",
            self.expression.n_genes(),
            self.expression.n_samples()
        )?;
        writeln!(
            f,
            "Metadata:   {} samples × {} columns",
            self.metadata.n_samples(),
            self.metadata.n_columns()
        )
    }
}

/// Supported GEO series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dataset {
    /// Mouse preimplantation embryos (Deng et al. 2014), RPKM.
    Gse45719,
    /// Salmonella-exposed macrophages (Avraham et al. 2015), TPM.
    Gse65528,
    /// Mouse lung epithelium development (Treutlein et al. 2014), FPKM.
    Gse52583,
    /// Mouse embryonic stem cells (Sasagawa et al. 2013), FPKM.
    Gse42268,
    /// Human single cells vs. bulk (Wu et al. 2014), FPKM.
    Gse55291,
    /// Mouse NKT cell subsets (Engel et al. 2016), read counts.
    Gse74596,
    /// LPS-stimulated dendritic cells (Shalek et al. 2013), TPM.
    Gse41265,
}

impl Dataset {
    /// GEO accession.
    pub fn name(&self) -> &'static str {
        match self {
            Dataset::Gse45719 => "GSE45719",
            Dataset::Gse65528 => "GSE65528",
            Dataset::Gse52583 => "GSE52583",
            Dataset::Gse42268 => "GSE42268",
            Dataset::Gse55291 => "GSE55291",
            Dataset::Gse74596 => "GSE74596",
            Dataset::Gse41265 => "GSE41265",
        }
    }

    /// One-line description of the dataset and its expected inputs.
    pub fn description(&self) -> &'static str {
        match self {
            Dataset::Gse45719 => {
                "Preimplantation embryo RPKM; dir of *expression.txt.gz + SRA run table"
            }
            Dataset::Gse65528 => "Macrophage TPM plates; dir of *TPM_table.txt.gz + series matrix",
            Dataset::Gse52583 => "Lung epithelium FPKM; dir of *.fpkm_tracking.gz + SRA run table",
            Dataset::Gse42268 => "ES cell FPKM; dir of *.txt + SRA run table (optional)",
            Dataset::Gse55291 => "Single-cell vs. bulk FPKM; dir of *.fpkm_tracking + SRA run table",
            Dataset::Gse74596 => {
                "NKT subset counts; dir of GSM*_MappedReads_Annotations.txt* + SRA run table"
            }
            Dataset::Gse41265 => "Dendritic cell TPM; dir of GENE tables + SRA run table",
        }
    }

    /// Unit of the expression values.
    pub fn units(&self) -> &'static str {
        match self {
            Dataset::Gse45719 => "RPKM",
            Dataset::Gse65528 | Dataset::Gse41265 => "TPM",
            Dataset::Gse52583 | Dataset::Gse42268 | Dataset::Gse55291 => "FPKM",
            Dataset::Gse74596 => "counts",
        }
    }

    /// Metadata columns that serve as benchmark targets.
    pub fn default_targets(&self) -> Vec<String> {
        let targets: &[&str] = match self {
            Dataset::Gse45719 => &["Combined_Label", "Stage", "Cross"],
            Dataset::Gse65528 => &["Combined_Label", "Infection_Status", "TimePoint"],
            Dataset::Gse52583 => &["Combined_Label", "Age", "Genotype"],
            Dataset::Gse42268 => &["Filename_Group"],
            Dataset::Gse55291 => &["cell_type"],
            Dataset::Gse74596 => &["NKT_Subset"],
            Dataset::Gse41265 => &["Combined_Label", "Stimulation_Detail"],
        };
        targets.iter().map(|s| s.to_string()).collect()
    }

    /// All datasets.
    pub fn all() -> Vec<Self> {
        vec![
            Dataset::Gse45719,
            Dataset::Gse65528,
            Dataset::Gse52583,
            Dataset::Gse42268,
            Dataset::Gse55291,
            Dataset::Gse74596,
            Dataset::Gse41265,
        ]
    }

    /// Parse an accession, case-insensitively.
    pub fn from_str(s: &str) -> Option<Self> {
        Self::all()
            .into_iter()
            .find(|d| d.name().eq_ignore_ascii_case(s.trim()))
    }

    /// Load the dataset from its expression directory and metadata file.
    pub fn load(&self, expression_path: &Path, metadata_path: &Path) -> Result<LoadedDataset> {
        match self {
            Dataset::Gse45719 => gse45719::load(expression_path, metadata_path),
            Dataset::Gse65528 => gse65528::load(expression_path, metadata_path),
            Dataset::Gse52583 => gse52583::load(expression_path, metadata_path, true),
            Dataset::Gse42268 => gse42268::load(expression_path, metadata_path),
            Dataset::Gse55291 => gse55291::load(expression_path, metadata_path),
            Dataset::Gse74596 => gse74596::load(expression_path, metadata_path),
            Dataset::Gse41265 => gse41265::load(expression_path, metadata_path),
        }
    }
}

impl std::fmt::Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Pattern for GEO sample accessions.
pub(crate) fn gsm_pattern() -> Result<Regex> {
    Ok(Regex::new(r"GSM\d+")?)
}

/// An SRA value as a metadata cell; absent and empty values are missing.
pub(crate) fn sra_cell(record: &SraRecord, column: &str) -> Variable {
    match record.get(column) {
        Some(v) => Variable::text(v),
        None => Variable::Missing,
    }
}

/// Fail when no file produced data.
pub(crate) fn require_loaded(n_loaded: usize, what: &str) -> Result<()> {
    if n_loaded == 0 {
        return Err(ScError::EmptyData(format!("No valid {} loaded", what)));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_from_str() {
        assert_eq!(Dataset::from_str("gse45719"), Some(Dataset::Gse45719));
        assert_eq!(Dataset::from_str(" GSE41265 "), Some(Dataset::Gse41265));
        assert_eq!(Dataset::from_str("GSE00000"), None);
    }

    #[test]
    fn test_all_datasets_named() {
        let all = Dataset::all();
        assert_eq!(all.len(), 7);
        for d in all {
            assert!(d.name().starts_with("GSE"));
            assert!(!d.default_targets().is_empty());
            assert_eq!(Dataset::from_str(d.name()), Some(d));
        }
    }

    #[test]
    fn test_gsm_pattern() {
        let re = gsm_pattern().unwrap();
        let m = re.find("GSM1112490_zygote_expression.txt.gz").unwrap();
        assert_eq!(m.as_str(), "GSM1112490");
    }
}
