//! Parquet source table reader.

use anyhow::{Context, Result};
use arrow::compute::concat_batches;
use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use parquet::arrow::async_reader::ParquetRecordBatchStreamBuilder;
use serde::Deserialize;
use tokio::fs::File;
use tracing::debug;

use crate::error::FeatureError;
use crate::formats::reader::{SourceSpec, TableReader};
use crate::table::IndexedTable;

/// Schema metadata key written by pandas
const PANDAS_METADATA_KEY: &str = "pandas";

/// The part of the pandas schema metadata needed to locate the index
#[derive(Debug, Deserialize)]
struct PandasMetadata {
    #[serde(default)]
    index_columns: Vec<serde_json::Value>,
}

/// Reads a whole Parquet file into a run-indexed table
pub struct ParquetTableReader {
    fallback_index: String,
}

impl ParquetTableReader {
    /// `fallback_index` is used when the file carries no pandas index metadata
    pub fn new(fallback_index: impl Into<String>) -> Self {
        Self {
            fallback_index: fallback_index.into(),
        }
    }
}

#[async_trait]
impl TableReader for ParquetTableReader {
    async fn read_table(&self, source: &SourceSpec) -> Result<IndexedTable> {
        let file = File::open(&source.path).await.with_context(|| {
            format!(
                "Failed to open source '{}' at {}",
                source.name,
                source.path.display()
            )
        })?;

        let builder = ParquetRecordBatchStreamBuilder::new(file)
            .await
            .context("Failed to read Parquet metadata")?;

        let schema = builder.schema().clone();
        let index_column = resolve_index_column(&schema, &self.fallback_index).ok_or_else(|| {
            FeatureError::MissingIndex {
                source_name: source.name.clone(),
                expected: self.fallback_index.clone(),
            }
        })?;

        let stream = builder
            .build()
            .context("Failed to build Parquet stream")?;
        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .context("Failed to read record batch")?;

        let batch = concat_batches(&schema, &batches)?;
        debug!(
            "Read {} rows from source '{}' (index column '{}')",
            batch.num_rows(),
            source.name,
            index_column
        );

        Ok(IndexedTable::from_indexed_batch(
            &source.name,
            batch,
            &index_column,
        )?)
    }
}

/// Pick the column holding the run identifier
///
/// The first named index recorded in the pandas metadata wins (pandas stores the
/// DataFrame index as a regular column). Otherwise a column called `fallback`
/// is used. Range indexes carry no identifiers and are skipped.
fn resolve_index_column(schema: &Schema, fallback: &str) -> Option<String> {
    let from_pandas = schema
        .metadata()
        .get(PANDAS_METADATA_KEY)
        .and_then(|raw| serde_json::from_str::<PandasMetadata>(raw).ok())
        .and_then(|meta| {
            meta.index_columns
                .into_iter()
                .find_map(|column| column.as_str().map(str::to_string))
        })
        .filter(|name| schema.index_of(name).is_ok());

    from_pandas.or_else(|| {
        schema
            .index_of(fallback)
            .ok()
            .map(|_| fallback.to_string())
    })
}
