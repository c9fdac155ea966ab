//! Error types for the Quantus library.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Quantus operations.
#[derive(Debug, Error)]
pub enum QuantusError {
    /// Dataset shape does not satisfy a declared schema: missing required
    /// columns, duplicate or colliding column names, ragged columns, or a
    /// pipe stage applied to the wrong operand kind.
    #[error("schema error: {context}{}", format_missing(.missing))]
    Schema {
        context: String,
        missing: Vec<String>,
    },

    /// A value fell outside its declared bound while strict domain
    /// checking was requested.
    #[error("domain error: '{variable}' = {value} outside [{lo}, {hi}] at row {row}")]
    Domain {
        variable: String,
        value: f64,
        lo: f64,
        hi: f64,
        row: usize,
    },

    /// The model function failed during per-row evaluation.
    #[error("evaluation failed at row {row}: {message}")]
    Evaluation { row: usize, message: String },

    /// A fitting routine could not produce a model at all. Convergence and
    /// identifiability troubles are reported as warnings instead.
    #[error("{family} fit error: {message}")]
    Fit { family: String, message: String },

    /// Invalid marginal, bound, or fit-specification parameters.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error reading or accessing a file.
    #[error("IO error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error from the CSV library.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Error parsing a cell of a tabular file.
    #[error("parse error at row {row}, column {column}: {message}")]
    Parse {
        row: usize,
        column: usize,
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QuantusError {
    /// Schema error with a context message and no specific column list.
    pub fn schema(context: impl Into<String>) -> Self {
        QuantusError::Schema {
            context: context.into(),
            missing: Vec::new(),
        }
    }

    /// Schema error naming the columns that were required but absent.
    pub fn missing_columns(context: impl Into<String>, missing: Vec<String>) -> Self {
        QuantusError::Schema {
            context: context.into(),
            missing,
        }
    }
}

fn format_missing(missing: &[String]) -> String {
    if missing.is_empty() {
        String::new()
    } else {
        format!(" (missing columns: {})", missing.join(", "))
    }
}

/// Result type alias for Quantus operations.
pub type Result<T> = std::result::Result<T, QuantusError>;
