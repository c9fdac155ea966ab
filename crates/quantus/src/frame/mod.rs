//! Tabular frames: ordered, named numeric columns.

mod compare;
mod io;

pub use io::{read_csv, write_csv, SourceMetadata};

use indexmap::IndexMap;

use crate::error::{QuantusError, Result};

/// An ordered collection of named `f64` columns of equal length.
///
/// Column order is preserved (insertion order) and significant for display
/// and serialization, but operations that consume frames address columns by
/// name, never by position. Row *i* across all columns is one joint
/// observation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataFrame {
    columns: IndexMap<String, Vec<f64>>,
}

impl DataFrame {
    /// Create an empty frame.
    pub fn new() -> Self {
        Self {
            columns: IndexMap::new(),
        }
    }

    /// Build a frame from `(name, values)` pairs.
    ///
    /// Fails if column lengths differ or a name repeats.
    pub fn from_columns<N, V>(pairs: V) -> Result<Self>
    where
        N: Into<String>,
        V: IntoIterator<Item = (N, Vec<f64>)>,
    {
        let mut frame = Self::new();
        for (name, values) in pairs {
            frame.push_column(name, values)?;
        }
        Ok(frame)
    }

    /// Append a column to the frame.
    ///
    /// The first column fixes the row count; later columns must match it.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        if self.columns.contains_key(&name) {
            return Err(QuantusError::schema(format!(
                "duplicate column '{name}'"
            )));
        }
        if !self.columns.is_empty() && values.len() != self.n_rows() {
            return Err(QuantusError::schema(format!(
                "column '{}' has {} rows, expected {}",
                name,
                values.len(),
                self.n_rows()
            )));
        }
        self.columns.insert(name, values);
        Ok(())
    }

    /// Number of rows (0 for an empty frame).
    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, |(_, v)| v.len())
    }

    /// Number of columns.
    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    /// Column names in frame order.
    pub fn names(&self) -> Vec<&str> {
        self.columns.keys().map(|s| s.as_str()).collect()
    }

    /// Whether a column with this name exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Values of a column by name.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(|v| v.as_slice())
    }

    /// A single cell value.
    pub fn get(&self, name: &str, row: usize) -> Option<f64> {
        self.columns.get(name).and_then(|v| v.get(row)).copied()
    }

    /// Collect row `i` of the named columns, in the given name order.
    ///
    /// Fails if any name is absent; this is the reorder step evaluation
    /// relies on, so column order in the frame never matters.
    pub fn gather_row(&self, names: &[String], row: usize) -> Result<Vec<f64>> {
        names
            .iter()
            .map(|name| {
                self.get(name, row).ok_or_else(|| {
                    QuantusError::missing_columns(
                        format!("row {row} gather"),
                        vec![name.clone()],
                    )
                })
            })
            .collect()
    }

    /// New frame restricted to the named columns, in the given order.
    pub fn select(&self, names: &[String]) -> Result<Self> {
        let missing: Vec<String> = names
            .iter()
            .filter(|n| !self.columns.contains_key(*n))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(QuantusError::missing_columns("select", missing));
        }
        let mut out = Self::new();
        for name in names {
            // Presence checked above.
            if let Some(values) = self.columns.get(name) {
                out.push_column(name.clone(), values.clone())?;
            }
        }
        Ok(out)
    }

    /// Column-bind another frame onto this one.
    ///
    /// Row counts must match and names must not collide.
    pub fn bind_cols(&self, other: &DataFrame) -> Result<Self> {
        if self.n_cols() > 0 && other.n_cols() > 0 && self.n_rows() != other.n_rows() {
            return Err(QuantusError::schema(format!(
                "bind_cols row mismatch: {} vs {}",
                self.n_rows(),
                other.n_rows()
            )));
        }
        let mut out = self.clone();
        for (name, values) in &other.columns {
            out.push_column(name.clone(), values.clone())?;
        }
        Ok(out)
    }

    /// Row-bind another frame onto this one.
    ///
    /// Both frames must carry exactly the same column set; `other`'s
    /// columns are appended in this frame's order.
    pub fn bind_rows(&self, other: &DataFrame) -> Result<Self> {
        if self.n_cols() == 0 {
            return Ok(other.clone());
        }
        let missing: Vec<String> = self
            .columns
            .keys()
            .filter(|n| !other.columns.contains_key(*n))
            .cloned()
            .collect();
        if !missing.is_empty() || other.n_cols() != self.n_cols() {
            return Err(QuantusError::missing_columns(
                "bind_rows requires identical column sets",
                missing,
            ));
        }
        let mut out = Self::new();
        for (name, values) in &self.columns {
            let mut combined = values.clone();
            if let Some(extra) = other.column(name) {
                combined.extend_from_slice(extra);
            }
            out.push_column(name.clone(), combined)?;
        }
        Ok(out)
    }

    /// Iterate `(name, values)` pairs in frame order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }
}

/// Build a [`DataFrame`] from column literals.
///
/// ```
/// use quantus::frame;
///
/// let df = frame!("x" => [0.0, 1.0], "y" => [2.0, 3.0]);
/// assert_eq!(df.n_rows(), 2);
/// ```
///
/// Panics on ragged or duplicate columns, so it is meant for literals in
/// examples and tests; use [`DataFrame::from_columns`] for runtime data.
#[macro_export]
macro_rules! frame {
    ($($name:expr => [$($value:expr),* $(,)?]),* $(,)?) => {{
        let pairs: Vec<(&str, Vec<f64>)> = vec![
            $(($name, vec![$($value as f64),*])),*
        ];
        $crate::DataFrame::from_columns(pairs).unwrap()
    }};
}
