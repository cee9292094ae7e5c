//! # dosample-frame - Columnar Tables for Causal Sampling
//!
//! This crate holds the tabular substrate of the do-sampling workspace: a
//! minimal column-major [`Table`] of f64 values and the [`Schema`] registry
//! declaring how each column is to be read statistically.
//!
//! ## Core Concepts
//!
//! - **Columns are the unit of access**: estimators consume whole columns,
//!   so storage is column-major and row access is a gather
//! - **Values are untyped f64**: binary columns hold 0.0/1.0 and categorical
//!   columns hold small integer codes; meaning lives in the [`Schema`], not
//!   in the storage
//! - **Selection is explicit**: `filter` (by mask) and `take` (by indices,
//!   repeats allowed) return independent tables and never alias the source
//!
//! ## Example
//!
//! ```rust
//! use dosample_frame::{Schema, Table, VariableType};
//!
//! let table = Table::new()
//!     .with_column("z", vec![0.2, 0.7, 0.5])
//!     .unwrap()
//!     .with_column("d", vec![0.0, 1.0, 1.0])
//!     .unwrap();
//!
//! let schema = Schema::new()
//!     .with_variable("z", VariableType::Continuous)
//!     .with_variable("d", VariableType::Binary);
//!
//! assert!(schema.get("d").unwrap().is_discrete());
//! assert_eq!(table.n_rows(), 3);
//! ```

mod error;
mod schema;
mod table;

pub use error::FrameError;
pub use schema::{Schema, VariableType};
pub use table::Table;
