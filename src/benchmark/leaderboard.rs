//! Ranked results of the clustering benchmark.

use crate::error::Result;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Agreement of one clustering with one metadata column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetScore {
    pub target: String,
    /// Adjusted mutual information, rounded to 3 decimals.
    pub ami: f64,
    /// Adjusted Rand index, rounded to 3 decimals.
    pub ari: f64,
}

/// One clustering run: a method at a given number of clusters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardRow {
    pub method: String,
    pub k: usize,
    /// One entry per target, in leaderboard target order.
    pub scores: Vec<TargetScore>,
}

impl LeaderboardRow {
    /// AMI against the first target (the ranking key).
    pub fn primary_ami(&self) -> f64 {
        self.scores.first().map_or(f64::NEG_INFINITY, |s| s.ami)
    }

    /// Scores for a target column.
    pub fn score(&self, target: &str) -> Option<&TargetScore> {
        self.scores.iter().find(|s| s.target == target)
    }
}

/// All clustering runs, best first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Leaderboard {
    pub targets: Vec<String>,
    pub rows: Vec<LeaderboardRow>,
}

impl Leaderboard {
    pub fn new(targets: Vec<String>) -> Self {
        Self {
            targets,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push(&mut self, row: LeaderboardRow) {
        self.rows.push(row);
    }

    /// Sort by AMI on the first target, descending. Ties keep run order.
    pub fn sort(&mut self) {
        self.rows.sort_by(|a, b| {
            b.primary_ami()
                .partial_cmp(&a.primary_ami())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    /// Top-ranked run.
    pub fn best(&self) -> Option<&LeaderboardRow> {
        self.rows.first()
    }

    fn header(&self) -> Vec<String> {
        let mut header = vec!["Method".to_string(), "k".to_string()];
        for t in &self.targets {
            header.push(format!("AMI_{}", t));
            header.push(format!("ARI_{}", t));
        }
        header
    }

    fn cells(row: &LeaderboardRow) -> Vec<String> {
        let mut cells = vec![row.method.clone(), row.k.to_string()];
        for s in &row.scores {
            cells.push(format!("{:.3}", s.ami));
            cells.push(format!("{:.3}", s.ari));
        }
        cells
    }

    /// Write the leaderboard as TSV (`Method`, `k`, `AMI_<t>`, `ARI_<t>`, ...).
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "{}", self.header().join("\t"))?;
        for row in &self.rows {
            writeln!(writer, "{}", Self::cells(row).join("\t"))?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl std::fmt::Display for Leaderboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.rows.is_empty() {
            return writeln!(f, "Leaderboard is empty");
        }
        let header = self.header();
        let body: Vec<Vec<String>> = self.rows.iter().map(Self::cells).collect();
        let widths: Vec<usize> = (0..header.len())
            .map(|c| {
                body.iter()
                    .map(|r| r.get(c).map_or(0, |s| s.len()))
                    .chain(std::iter::once(header[c].len()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let line = |cells: &[String]| -> String {
            cells
                .iter()
                .zip(&widths)
                .map(|(c, &w)| format!("{:<w$}", c, w = w))
                .collect::<Vec<_>>()
                .join("  ")
        };
        writeln!(f, "{}", line(&header))?;
        for r in &body {
            writeln!(f, "{}", line(r))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(method: &str, k: usize, ami: f64) -> LeaderboardRow {
        LeaderboardRow {
            method: method.to_string(),
            k,
            scores: vec![TargetScore {
                target: "Stage".to_string(),
                ami,
                ari: ami / 2.0,
            }],
        }
    }

    #[test]
    fn test_sort_and_best() {
        let mut board = Leaderboard::new(vec!["Stage".to_string()]);
        board.push(row("KMeans", 2, 0.4));
        board.push(row("HClust", 2, 0.9));
        board.push(row("Spectral", 2, 0.4));
        board.sort();
        assert_eq!(board.best().unwrap().method, "HClust");
        // Stable among ties
        assert_eq!(board.rows[1].method, "KMeans");
        assert_eq!(board.rows[2].method, "Spectral");
    }

    #[test]
    fn test_to_tsv() {
        let mut board = Leaderboard::new(vec!["Stage".to_string()]);
        board.push(row("KMeans", 3, 0.5));
        let file = tempfile::NamedTempFile::new().unwrap();
        board.to_tsv(file.path()).unwrap();
        let text = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Method\tk\tAMI_Stage\tARI_Stage");
        assert_eq!(lines[1], "KMeans\t3\t0.500\t0.250");
    }
}
