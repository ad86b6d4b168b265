//! In-memory table keyed by a string row index (run or sample identifier).
//!
//! Column data lives in an Arrow `RecordBatch`; the index is kept alongside it
//! rather than as a column so that transforms never mistake it for a feature.
//! Every operation returns a new table.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, Float64Array, StringArray, UInt64Array};
use arrow::compute::{cast, take};
use arrow::datatypes::{DataType, Field, Float64Type, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::record_batch::{RecordBatch, RecordBatchOptions};

use crate::error::FeatureError;

/// A column table with a string row index
#[derive(Debug, Clone)]
pub struct IndexedTable {
    index_name: String,
    index: Vec<String>,
    batch: RecordBatch,
}

impl IndexedTable {
    /// Create a table from an index and a batch of the same length
    pub fn try_new(
        index_name: impl Into<String>,
        index: Vec<String>,
        batch: RecordBatch,
    ) -> Result<Self, FeatureError> {
        if index.len() != batch.num_rows() {
            return Err(FeatureError::IndexLength {
                index_len: index.len(),
                num_rows: batch.num_rows(),
            });
        }

        let schema = batch.schema();
        let mut seen = HashSet::new();
        for field in schema.fields() {
            if !seen.insert(field.name().as_str()) {
                return Err(FeatureError::DuplicateColumn(field.name().clone()));
            }
        }

        Ok(Self {
            index_name: index_name.into(),
            index,
            batch,
        })
    }

    /// Create a table from named arrays
    pub fn from_columns(
        index_name: impl Into<String>,
        index: Vec<String>,
        columns: Vec<(String, ArrayRef)>,
    ) -> Result<Self, FeatureError> {
        let num_rows = index.len();
        if let Some((_, array)) = columns.iter().find(|(_, array)| array.len() != num_rows) {
            return Err(FeatureError::IndexLength {
                index_len: num_rows,
                num_rows: array.len(),
            });
        }

        let fields: Vec<Field> = columns
            .iter()
            .map(|(name, array)| Field::new(name, array.data_type().clone(), true))
            .collect();
        let arrays = columns.into_iter().map(|(_, array)| array).collect();

        let batch = build_batch(Arc::new(Schema::new(fields)), arrays, num_rows)?;
        Self::try_new(index_name, index, batch)
    }

    /// Split `index_column` out of `batch` and use it as the row index
    ///
    /// Index values are cast to strings, so integer run identifiers are accepted.
    pub fn from_indexed_batch(
        source_name: &str,
        batch: RecordBatch,
        index_column: &str,
    ) -> Result<Self, FeatureError> {
        let schema = batch.schema();
        let position = schema
            .index_of(index_column)
            .map_err(|_| FeatureError::MissingIndex {
                source_name: source_name.to_string(),
                expected: index_column.to_string(),
            })?;

        let ids = cast(batch.column(position), &DataType::Utf8)?;
        let ids = ids.as_string::<i32>();

        let mut index = Vec::with_capacity(ids.len());
        for (row, id) in ids.iter().enumerate() {
            match id {
                Some(id) => index.push(id.to_string()),
                None => {
                    return Err(FeatureError::NullRunId {
                        source_name: source_name.to_string(),
                        row,
                    });
                }
            }
        }

        let keep: Vec<usize> = (0..schema.fields().len())
            .filter(|&i| i != position)
            .collect();
        let batch = batch.project(&keep)?;

        Self::try_new(index_column, index, batch)
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn index(&self) -> &[String] {
        &self.index
    }

    pub fn num_rows(&self) -> usize {
        self.index.len()
    }

    pub fn num_columns(&self) -> usize {
        self.batch.num_columns()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|field| field.name().clone())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.batch.column_by_name(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<&ArrayRef> {
        self.batch.column_by_name(name)
    }

    /// First index value that occurs more than once, if any
    pub fn first_duplicate(&self) -> Option<&str> {
        let mut seen = HashSet::with_capacity(self.index.len());
        self.index
            .iter()
            .find(|id| !seen.insert(id.as_str()))
            .map(String::as_str)
    }

    /// Read a column as `Float64`, casting integer, boolean and decimal types
    pub fn float_column(&self, name: &str) -> Result<Float64Array, FeatureError> {
        let array = self
            .column(name)
            .ok_or_else(|| FeatureError::MissingColumns {
                context: "numeric column lookup".to_string(),
                columns: vec![name.to_string()],
            })?;

        let data_type = array.data_type();
        if !(data_type.is_numeric() || matches!(data_type, DataType::Boolean | DataType::Null)) {
            return Err(FeatureError::NonNumericColumn {
                column: name.to_string(),
                data_type: data_type.clone(),
            });
        }

        let floats = cast(array, &DataType::Float64)?;
        Ok(floats.as_primitive::<Float64Type>().clone())
    }

    /// Keep only `names`, in that order
    pub fn select(&self, names: &[&str]) -> Result<Self, FeatureError> {
        let schema = self.batch.schema();
        let mut indices = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        for name in names {
            match schema.index_of(name) {
                Ok(i) => indices.push(i),
                Err(_) => missing.push(name.to_string()),
            }
        }

        if !missing.is_empty() {
            return Err(FeatureError::MissingColumns {
                context: "column selection".to_string(),
                columns: missing,
            });
        }

        let batch = self.batch.project(&indices)?;
        Self::try_new(self.index_name.clone(), self.index.clone(), batch)
    }

    /// Remove every column named in `names`; names not present are ignored
    pub fn drop_columns(&self, names: &[String]) -> Result<Self, FeatureError> {
        let dropped: HashSet<&str> = names.iter().map(String::as_str).collect();
        let schema = self.batch.schema();
        let keep: Vec<usize> = schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, field)| !dropped.contains(field.name().as_str()))
            .map(|(i, _)| i)
            .collect();

        let batch = self.batch.project(&keep)?;
        Self::try_new(self.index_name.clone(), self.index.clone(), batch)
    }

    /// Append a column at the end
    pub fn with_column(&self, name: &str, array: ArrayRef) -> Result<Self, FeatureError> {
        if self.has_column(name) {
            return Err(FeatureError::DuplicateColumn(name.to_string()));
        }
        if array.len() != self.num_rows() {
            return Err(FeatureError::IndexLength {
                index_len: self.num_rows(),
                num_rows: array.len(),
            });
        }

        let schema = self.batch.schema();
        let mut fields: Vec<Field> = schema
            .fields()
            .iter()
            .map(|field| field.as_ref().clone())
            .collect();
        fields.push(Field::new(name, array.data_type().clone(), true));

        let mut columns = self.batch.columns().to_vec();
        columns.push(array);

        let batch = build_batch(Arc::new(Schema::new(fields)), columns, self.num_rows())?;
        Self::try_new(self.index_name.clone(), self.index.clone(), batch)
    }

    /// Conform the table to `ids`: one row per requested id, in order
    ///
    /// Ids absent from the table get an all-null row; table rows whose id is not
    /// requested are dropped. Repeated ids in `ids` repeat the row. When the
    /// table's own index has duplicates, the first occurrence wins.
    pub fn reindex(&self, ids: &[String]) -> Result<Self, FeatureError> {
        let mut positions: HashMap<&str, u64> = HashMap::with_capacity(self.index.len());
        for (row, id) in self.index.iter().enumerate() {
            positions.entry(id.as_str()).or_insert(row as u64);
        }

        let indices: UInt64Array = ids
            .iter()
            .map(|id| positions.get(id.as_str()).copied())
            .collect();

        let columns = self
            .batch
            .columns()
            .iter()
            .map(|column| take(column.as_ref(), &indices, None))
            .collect::<Result<Vec<_>, ArrowError>>()?;

        let batch = build_batch(self.batch.schema(), columns, ids.len())?;
        Self::try_new(self.index_name.clone(), ids.to_vec(), batch)
    }

    /// Place the columns of `parts` side by side under a shared index
    ///
    /// Every part must already be indexed by exactly `index`.
    pub fn concat_columns(
        index_name: impl Into<String>,
        index: Vec<String>,
        parts: &[IndexedTable],
    ) -> Result<Self, FeatureError> {
        let mut fields = Vec::new();
        let mut columns = Vec::new();

        for part in parts {
            if part.index != index {
                return Err(FeatureError::IndexLength {
                    index_len: index.len(),
                    num_rows: part.num_rows(),
                });
            }
            let schema = part.batch.schema();
            fields.extend(schema.fields().iter().map(|field| field.as_ref().clone()));
            columns.extend(part.batch.columns().iter().cloned());
        }

        let num_rows = index.len();
        let batch = build_batch(Arc::new(Schema::new(fields)), columns, num_rows)?;
        Self::try_new(index_name, index, batch)
    }

    /// Rename columns; names without an entry in `renames` pass through
    pub fn rename_columns(&self, renames: &HashMap<&str, &str>) -> Result<Self, FeatureError> {
        let schema = self.batch.schema();
        let fields: Vec<Field> = schema
            .fields()
            .iter()
            .map(|field| match renames.get(field.name().as_str()) {
                Some(new_name) => field.as_ref().clone().with_name(*new_name),
                None => field.as_ref().clone(),
            })
            .collect();

        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name().as_str()) {
                return Err(FeatureError::DuplicateColumn(field.name().clone()));
            }
        }

        let batch = build_batch(
            Arc::new(Schema::new(fields)),
            self.batch.columns().to_vec(),
            self.num_rows(),
        )?;
        Self::try_new(self.index_name.clone(), self.index.clone(), batch)
    }

    /// Render as a single batch with the index as the leading `Utf8` column
    pub fn to_record_batch(&self) -> Result<RecordBatch, FeatureError> {
        let schema = self.batch.schema();
        let mut fields = vec![Field::new(&self.index_name, DataType::Utf8, false)];
        fields.extend(schema.fields().iter().map(|field| field.as_ref().clone()));

        let index_array: ArrayRef = Arc::new(StringArray::from(self.index.clone()));
        let mut columns = vec![index_array];
        columns.extend(self.batch.columns().iter().cloned());

        build_batch(Arc::new(Schema::new(fields)), columns, self.num_rows())
    }
}

/// Build a batch that keeps its row count even with zero columns
fn build_batch(
    schema: SchemaRef,
    columns: Vec<ArrayRef>,
    num_rows: usize,
) -> Result<RecordBatch, FeatureError> {
    let options = RecordBatchOptions::new().with_row_count(Some(num_rows));
    Ok(RecordBatch::try_new_with_options(schema, columns, &options)?)
}
