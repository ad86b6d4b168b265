use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;

use crate::table::IndexedTable;

/// A per-run source table: a QC category name and where its table lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub name: String,
    pub path: PathBuf,
}

impl SourceSpec {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Trait for reading a source into a run-indexed table
#[async_trait]
pub trait TableReader: Send + Sync {
    /// Read the whole source, indexed by run identifier
    async fn read_table(&self, source: &SourceSpec) -> Result<IndexedTable>;

    /// Whether the source is present, checked before any read is scheduled
    async fn exists(&self, source: &SourceSpec) -> Result<bool> {
        Ok(tokio::fs::try_exists(&source.path).await?)
    }
}
