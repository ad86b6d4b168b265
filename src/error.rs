//! Schema and configuration errors raised while assembling the feature table.
//!
//! Orchestration code wraps these in `anyhow` with file context; callers that
//! need to react to a specific case can `downcast_ref::<FeatureError>()`.

use std::path::PathBuf;

use arrow::datatypes::DataType;
use arrow::error::ArrowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeatureError {
    /// A configured source file does not exist
    #[error("source '{source_name}' not found at {}", path.display())]
    MissingSource { source_name: String, path: PathBuf },

    /// A source table has no column usable as the run identifier
    #[error("source '{source_name}' has no run identifier index (expected pandas index metadata or a '{expected}' column)")]
    MissingIndex {
        source_name: String,
        expected: String,
    },

    /// A source table has a null run identifier
    #[error("source '{source_name}' contains a null run identifier at row {row}")]
    NullRunId { source_name: String, row: usize },

    /// A source table lists the same run more than once
    #[error("run '{run}' appears more than once in source '{source_name}'")]
    DuplicateRun { source_name: String, run: String },

    /// Two sources provide a column with the same name
    #[error("column '{column}' is provided by both '{first}' and '{second}'")]
    ColumnCollision {
        column: String,
        first: String,
        second: String,
    },

    /// Columns required by a transform are absent from the table
    #[error("missing columns for {context}: {}", columns.join(", "))]
    MissingColumns {
        context: String,
        columns: Vec<String>,
    },

    /// A column that must be reduced numerically has a non-numeric type
    #[error("column '{column}' has non-numeric type {data_type}")]
    NonNumericColumn { column: String, data_type: DataType },

    /// A table would end up with two columns of the same name
    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),

    /// The feature catalog declares an internal or public name twice
    #[error("feature catalog declares '{0}' more than once")]
    DuplicateFeature(String),

    /// The run manifest has an unsupported number of columns
    #[error("run manifest must have one (run) or two (sample, run) columns, found {0}")]
    ManifestShape(usize),

    /// A run is mapped to two different samples in the manifest
    #[error("run '{run}' is mapped to conflicting samples '{first}' and '{second}'")]
    ConflictingSample {
        run: String,
        first: String,
        second: String,
    },

    /// Index length does not match the number of rows in the column data
    #[error("index has {index_len} entries but table has {num_rows} rows")]
    IndexLength { index_len: usize, num_rows: usize },

    #[error(transparent)]
    Arrow(#[from] ArrowError),
}
