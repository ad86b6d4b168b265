//! Source and output table formats

pub mod parquet;
pub mod reader;

pub use reader::{SourceSpec, TableReader};
