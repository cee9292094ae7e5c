//! Column-major tables of f64 values.
//!
//! A [`Table`] is the minimal tabular container the sampling engine needs:
//! named columns of equal length, cheap row selection (`filter`, `take`), and
//! the summary statistics used by contrast estimators. All values are f64;
//! binary columns hold 0.0/1.0 and categorical columns hold small integer
//! codes, with interpretation declared separately in a
//! [`Schema`](crate::Schema).
//!
//! # Example
//!
//! ```rust
//! use dosample_frame::Table;
//!
//! let table = Table::new()
//!     .with_column("z", vec![0.1, 0.8, 0.4])
//!     .unwrap()
//!     .with_column("d", vec![0.0, 1.0, 1.0])
//!     .unwrap();
//!
//! assert_eq!(table.n_rows(), 3);
//! let treated = table.filter(&[false, true, true]).unwrap();
//! assert_eq!(treated.n_rows(), 2);
//! assert!((treated.mean("z").unwrap() - 0.6).abs() < 1e-12);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::FrameError;

/// A column-major table with named f64 columns of equal length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl Table {
    /// Create an empty table with no columns.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from `(name, values)` pairs.
    ///
    /// # Errors
    /// Returns an error on duplicate names or ragged column lengths.
    pub fn from_columns(columns: Vec<(String, Vec<f64>)>) -> Result<Self, FrameError> {
        let mut table = Table::new();
        for (name, values) in columns {
            table.push_column(&name, values)?;
        }
        Ok(table)
    }

    /// Add a column, builder-style.
    ///
    /// # Errors
    /// Returns an error if the name already exists or the length disagrees
    /// with the current row count.
    pub fn with_column(mut self, name: &str, values: Vec<f64>) -> Result<Self, FrameError> {
        self.push_column(name, values)?;
        Ok(self)
    }

    /// Add a column in place.
    pub fn push_column(&mut self, name: &str, values: Vec<f64>) -> Result<(), FrameError> {
        if self.has_column(name) {
            return Err(FrameError::DuplicateColumn {
                name: name.to_string(),
            });
        }
        if !self.columns.is_empty() && values.len() != self.n_rows() {
            return Err(FrameError::LengthMismatch {
                name: name.to_string(),
                expected: self.n_rows(),
                got: values.len(),
            });
        }
        self.names.push(name.to_string());
        self.columns.push(values);
        Ok(())
    }

    /// Number of rows (units).
    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    /// Number of columns.
    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0
    }

    /// Column names in insertion order.
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// Whether a column named `name` exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    fn position(&self, name: &str) -> Result<usize, FrameError> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| FrameError::UnknownColumn {
                name: name.to_string(),
            })
    }

    /// Borrow a column's values.
    pub fn column(&self, name: &str) -> Result<&[f64], FrameError> {
        let idx = self.position(name)?;
        Ok(&self.columns[idx])
    }

    /// Mutably borrow a column's values. The length cannot change.
    pub fn column_mut(&mut self, name: &str) -> Result<&mut [f64], FrameError> {
        let idx = self.position(name)?;
        Ok(&mut self.columns[idx])
    }

    /// Copy out one row in column order.
    pub fn row(&self, index: usize) -> Result<Vec<f64>, FrameError> {
        if index >= self.n_rows() {
            return Err(FrameError::RowOutOfBounds {
                index,
                rows: self.n_rows(),
            });
        }
        Ok(self.columns.iter().map(|col| col[index]).collect())
    }

    /// Gather the rows at `indices` (repeats allowed) into a new table.
    pub fn take(&self, indices: &[usize]) -> Result<Table, FrameError> {
        let rows = self.n_rows();
        if let Some(&bad) = indices.iter().find(|&&i| i >= rows) {
            return Err(FrameError::RowOutOfBounds { index: bad, rows });
        }
        let columns = self
            .columns
            .iter()
            .map(|col| indices.iter().map(|&i| col[i]).collect())
            .collect();
        Ok(Table {
            names: self.names.clone(),
            columns,
        })
    }

    /// Keep the rows where `mask` is true.
    pub fn filter(&self, mask: &[bool]) -> Result<Table, FrameError> {
        if mask.len() != self.n_rows() {
            return Err(FrameError::MaskLengthMismatch {
                expected: self.n_rows(),
                got: mask.len(),
            });
        }
        let columns = self
            .columns
            .iter()
            .map(|col| {
                col.iter()
                    .zip(mask)
                    .filter(|(_, &keep)| keep)
                    .map(|(&v, _)| v)
                    .collect()
            })
            .collect();
        Ok(Table {
            names: self.names.clone(),
            columns,
        })
    }

    /// Mean of a column.
    ///
    /// # Errors
    /// Returns [`FrameError::Empty`] on a table without rows.
    pub fn mean(&self, name: &str) -> Result<f64, FrameError> {
        let col = self.column(name)?;
        if col.is_empty() {
            return Err(FrameError::Empty);
        }
        Ok(col.iter().sum::<f64>() / col.len() as f64)
    }

    /// Sample variance of a column (n − 1 denominator; 0.0 for a single row).
    pub fn variance(&self, name: &str) -> Result<f64, FrameError> {
        let col = self.column(name)?;
        if col.is_empty() {
            return Err(FrameError::Empty);
        }
        if col.len() < 2 {
            return Ok(0.0);
        }
        let mean = col.iter().sum::<f64>() / col.len() as f64;
        let ss: f64 = col.iter().map(|v| (v - mean) * (v - mean)).sum();
        Ok(ss / (col.len() - 1) as f64)
    }

    /// Mean of `column` over the rows where `where_column` equals `value`.
    ///
    /// Equality is exact, which is the intended semantics for binary and
    /// categorical codes stored as f64.
    pub fn mean_where(
        &self,
        column: &str,
        where_column: &str,
        value: f64,
    ) -> Result<f64, FrameError> {
        let values = self.column(column)?;
        let selector = self.column(where_column)?;

        let mut sum = 0.0;
        let mut count = 0usize;
        for (v, s) in values.iter().zip(selector) {
            if *s == value {
                sum += v;
                count += 1;
            }
        }
        if count == 0 {
            return Err(FrameError::EmptySelection {
                column: where_column.to_string(),
                value,
            });
        }
        Ok(sum / count as f64)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Table: {} rows × {} columns [{}]",
            self.n_rows(),
            self.n_cols(),
            self.names.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> Table {
        Table::new()
            .with_column("z", vec![0.1, 0.8, 0.4, 0.9])
            .unwrap()
            .with_column("d", vec![0.0, 1.0, 0.0, 1.0])
            .unwrap()
            .with_column("y", vec![1.0, 3.0, 2.0, 4.0])
            .unwrap()
    }

    #[test]
    fn test_build_and_shape() {
        let table = sample_table();
        assert_eq!(table.n_rows(), 4);
        assert_eq!(table.n_cols(), 3);
        assert_eq!(table.column_names(), &["z", "d", "y"]);
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let err = sample_table().with_column("z", vec![0.0; 4]).unwrap_err();
        assert!(matches!(err, FrameError::DuplicateColumn { .. }));
    }

    #[test]
    fn test_ragged_column_rejected() {
        let err = sample_table().with_column("w", vec![1.0, 2.0]).unwrap_err();
        assert!(matches!(
            err,
            FrameError::LengthMismatch {
                expected: 4,
                got: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_column() {
        let table = sample_table();
        assert!(matches!(
            table.column("missing").unwrap_err(),
            FrameError::UnknownColumn { .. }
        ));
    }

    #[test]
    fn test_column_mut_overwrites_values() {
        let mut table = sample_table();
        for v in table.column_mut("d").unwrap() {
            *v = 1.0;
        }
        assert_eq!(table.column("d").unwrap(), &[1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_row_and_bounds() {
        let table = sample_table();
        assert_eq!(table.row(1).unwrap(), vec![0.8, 1.0, 3.0]);
        assert!(matches!(
            table.row(4).unwrap_err(),
            FrameError::RowOutOfBounds { index: 4, rows: 4 }
        ));
    }

    #[test]
    fn test_take_gathers_with_repeats() {
        let table = sample_table();
        let picked = table.take(&[3, 0, 3]).unwrap();
        assert_eq!(picked.n_rows(), 3);
        assert_eq!(picked.column("y").unwrap(), &[4.0, 1.0, 4.0]);
        assert_eq!(picked.column_names(), table.column_names());
    }

    #[test]
    fn test_filter_by_mask() {
        let table = sample_table();
        let treated = table.filter(&[false, true, false, true]).unwrap();
        assert_eq!(treated.n_rows(), 2);
        assert_eq!(treated.column("y").unwrap(), &[3.0, 4.0]);

        let err = table.filter(&[true, false]).unwrap_err();
        assert!(matches!(err, FrameError::MaskLengthMismatch { .. }));
    }

    #[test]
    fn test_means_and_variance() {
        let table = sample_table();
        assert!((table.mean("y").unwrap() - 2.5).abs() < 1e-12);
        // Sample variance of [1, 3, 2, 4] = 5/3.
        assert!((table.variance("y").unwrap() - 5.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_mean_where_groups() {
        let table = sample_table();
        assert!((table.mean_where("y", "d", 1.0).unwrap() - 3.5).abs() < 1e-12);
        assert!((table.mean_where("y", "d", 0.0).unwrap() - 1.5).abs() < 1e-12);
        assert!(matches!(
            table.mean_where("y", "d", 2.0).unwrap_err(),
            FrameError::EmptySelection { .. }
        ));
    }

    #[test]
    fn test_empty_table_mean_errors() {
        let table = Table::new().with_column("y", vec![]).unwrap();
        assert!(matches!(table.mean("y").unwrap_err(), FrameError::Empty));
    }

    #[test]
    fn test_display_summary() {
        let table = sample_table();
        assert_eq!(table.to_string(), "Table: 4 rows × 3 columns [z, d, y]");
    }

    #[test]
    fn test_serde_round_trip() {
        let table = sample_table();
        let json = serde_json::to_string(&table).unwrap();
        let back: Table = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
    }
}
