//! Parquet support for the feature builder.
//!
//! - `reader` loads a per-run QC table and resolves its run identifier index
//! - `writer` persists the final feature table atomically

mod reader;
mod writer;

pub use reader::ParquetTableReader;
pub use writer::write_feature_table;
