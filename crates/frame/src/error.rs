//! Error types for table operations.

use thiserror::Error;

/// Errors that can occur when building or querying tables.
#[derive(Debug, Clone, Error)]
pub enum FrameError {
    /// A column name was not found in the table or registry.
    #[error("Unknown column `{name}`")]
    UnknownColumn { name: String },

    /// A column name was added twice.
    #[error("Duplicate column `{name}`")]
    DuplicateColumn { name: String },

    /// A column's length disagrees with the table's row count.
    #[error("Column `{name}` has {got} rows, expected {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        got: usize,
    },

    /// An operation that needs rows was given a table without any.
    #[error("Table has no rows")]
    Empty,

    /// A row index is outside the table.
    #[error("Row index {index} out of bounds for {rows} rows")]
    RowOutOfBounds { index: usize, rows: usize },

    /// A selection by value matched no rows.
    #[error("No rows where `{column}` == {value}")]
    EmptySelection { column: String, value: f64 },

    /// A mask's length disagrees with the table's row count.
    #[error("Mask has {got} entries, expected {expected}")]
    MaskLengthMismatch { expected: usize, got: usize },

    /// A variable-type code could not be parsed.
    #[error("Unknown variable type `{code}` (expected continuous/c, binary/b, or categorical/d)")]
    UnknownVariableType { code: String },
}
