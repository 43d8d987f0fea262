//! Shared file helpers: transparent gzip reading and directory scans.

use crate::error::{Result, ScError};
use flate2::read::MultiGzDecoder;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Open a text file for buffered reading, decompressing `.gz` files on the fly.
pub fn open_text<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    if is_gzipped(path) {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Whether a path carries a `.gz` extension.
pub fn is_gzipped(path: &Path) -> bool {
    path.extension().map(|e| e == "gz").unwrap_or(false)
}

/// List regular files in `dir` whose file name satisfies `accept`, sorted by name.
pub fn list_files<P, F>(dir: P, accept: F) -> Result<Vec<PathBuf>>
where
    P: AsRef<Path>,
    F: Fn(&str) -> bool,
{
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(ScError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Directory not found: {}", dir.display()),
        )));
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if let Some(name) = file_name(&path) {
            if accept(name) {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// The final path component as UTF-8, if any.
pub fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

/// Read every non-empty line of a tab-separated file into string fields.
pub fn read_tab_rows<P: AsRef<Path>>(path: P) -> Result<Vec<Vec<String>>> {
    let reader = open_text(path)?;
    let mut rows = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }
        rows.push(line.split('\t').map(|s| s.to_string()).collect());
    }
    Ok(rows)
}

/// Parse a numeric cell leniently: surrounding quotes and whitespace are ignored,
/// empty and NA-like cells yield `None`.
pub fn parse_number(raw: &str) -> Option<f64> {
    let v = raw.trim().trim_matches('"').trim();
    if v.is_empty() || v.eq_ignore_ascii_case("na") || v.eq_ignore_ascii_case("nan") {
        return None;
    }
    v.parse::<f64>().ok().filter(|x| !x.is_nan())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_open_text_gzip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("table.txt.gz");
        let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        writeln!(enc, "gene\tvalue").unwrap();
        writeln!(enc, "Actb\t12.5").unwrap();
        enc.finish().unwrap();

        let rows = read_tab_rows(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec!["Actb", "12.5"]);
    }

    #[test]
    fn test_list_files_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        for name in ["b.txt", "a.txt", "c.csv"] {
            File::create(dir.path().join(name)).unwrap();
        }
        let files = list_files(dir.path(), |n| n.ends_with(".txt")).unwrap();
        let names: Vec<&str> = files.iter().filter_map(|p| file_name(p)).collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_list_files_missing_dir() {
        assert!(list_files("/definitely/not/here", |_| true).is_err());
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(" 3.5 "), Some(3.5));
        assert_eq!(parse_number("1e-3"), Some(0.001));
        assert_eq!(parse_number("\"7\""), Some(7.0));
        assert_eq!(parse_number("NA"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("abc"), None);
    }
}
