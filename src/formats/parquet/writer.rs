//! Parquet feature table writer.

use anyhow::{Context, Result};
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::config::OUTPUT_ROW_GROUP_SIZE;
use crate::table::IndexedTable;

/// Write `table` (index first) to `path`
///
/// The file is written to a temporary file next to `path` and renamed into
/// place once complete, so a failed write never leaves a partial table behind.
pub fn write_feature_table(table: &IndexedTable, path: &Path) -> Result<()> {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let batch = table.to_record_batch()?;
    let props = WriterProperties::builder()
        .set_max_row_group_size(OUTPUT_ROW_GROUP_SIZE)
        .build();

    let mut temp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;

    let mut writer = ArrowWriter::try_new(temp.as_file_mut(), batch.schema(), Some(props))
        .context("Failed to create Parquet writer")?;
    writer
        .write(&batch)
        .context("Failed to write feature table")?;
    writer.close().context("Failed to finalize Parquet file")?;

    temp.persist(path)
        .with_context(|| format!("Failed to move feature table into {}", path.display()))?;

    Ok(())
}
