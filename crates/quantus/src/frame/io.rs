//! CSV source/sink for frames.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{QuantusError, Result};
use super::DataFrame;

/// Metadata about a loaded dataset file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// File name without path.
    pub file: String,
    /// Full path to the file.
    pub path: PathBuf,
    /// SHA-256 hash of the file contents.
    pub hash: String,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Number of data rows (excluding header).
    pub row_count: usize,
    /// Number of columns.
    pub column_count: usize,
    /// When the file was loaded.
    pub loaded_at: DateTime<Utc>,
}

/// Tokens treated as missing values when parsing cells.
fn is_null_token(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("na")
        || trimmed.eq_ignore_ascii_case("n/a")
        || trimmed.eq_ignore_ascii_case("nan")
        || trimmed.eq_ignore_ascii_case("null")
        || trimmed.eq_ignore_ascii_case("none")
        || trimmed == "."
        || trimmed == "-"
}

/// Read a CSV file into a frame.
///
/// The header row names the columns; cells parse as `f64`, with NA-like
/// tokens (`NA`, `null`, empty, ...) loaded as NaN. Unparseable cells fail
/// with row/column context.
pub fn read_csv(path: impl AsRef<Path>) -> Result<(DataFrame, SourceMetadata)> {
    let path = path.as_ref();

    let mut file = File::open(path).map_err(|e| QuantusError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut contents = Vec::new();
    file.read_to_end(&mut contents).map_err(|e| QuantusError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut hasher = Sha256::new();
    hasher.update(&contents);
    let hash = format!("sha256:{:x}", hasher.finalize());

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(contents.as_slice());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|s| s.trim().to_string())
        .collect();

    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); headers.len()];
    for (row_idx, record) in reader.records().enumerate() {
        let record = record?;
        for (col_idx, cell) in record.iter().enumerate() {
            if col_idx >= headers.len() {
                continue;
            }
            let value = if is_null_token(cell) {
                f64::NAN
            } else {
                cell.trim().parse::<f64>().map_err(|e| QuantusError::Parse {
                    row: row_idx,
                    column: col_idx,
                    message: format!("'{cell}': {e}"),
                })?
            };
            columns[col_idx].push(value);
        }
    }

    let mut frame = DataFrame::new();
    for (name, values) in headers.into_iter().zip(columns) {
        frame.push_column(name, values)?;
    }

    let metadata = SourceMetadata {
        file: path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
        path: path.to_path_buf(),
        hash,
        size_bytes: contents.len() as u64,
        row_count: frame.n_rows(),
        column_count: frame.n_cols(),
        loaded_at: Utc::now(),
    };

    Ok((frame, metadata))
}

/// Write a frame to a CSV file, columns in frame order.
pub fn write_csv(frame: &DataFrame, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut file = File::create(path).map_err(|e| QuantusError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(frame.names())?;
    for row in 0..frame.n_rows() {
        let record: Vec<String> = frame
            .iter()
            .map(|(_, values)| {
                let v = values[row];
                if v.is_nan() {
                    String::new()
                } else {
                    format!("{v}")
                }
            })
            .collect();
        writer.write_record(&record)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| QuantusError::schema(format!("CSV flush failed: {e}")))?;

    file.write_all(&bytes).map_err(|e| QuantusError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_tokens() {
        for token in ["", "NA", "n/a", "NaN", "null", "None", ".", "-"] {
            assert!(is_null_token(token), "token {token:?}");
        }
        assert!(!is_null_token("0"));
        assert!(!is_null_token("1.5"));
    }
}
