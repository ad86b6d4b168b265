//! Sample aggregation: roll per-run rows up to one row per sample and give the
//! surviving columns their public feature names.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array};
use tracing::{debug, info, warn};

use crate::catalog::FeatureCatalog;
use crate::config::{RUN_KEY, SAMPLE_KEY};
use crate::error::FeatureError;
use crate::table::IndexedTable;

/// Run -> sample assignment taken from the run manifest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleMap {
    by_run: HashMap<String, String>,
}

impl SampleMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from (run, sample) pairs, rejecting conflicting assignments
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn try_from_pairs<I, R, S>(pairs: I) -> Result<Self, FeatureError>
    where
        I: IntoIterator<Item = (R, S)>,
        R: Into<String>,
        S: Into<String>,
    {
        let mut map = Self::new();
        for (run, sample) in pairs {
            map.insert(run, sample)?;
        }
        Ok(map)
    }

    /// Assign `run` to `sample`; re-stating the same assignment is allowed
    pub fn insert(
        &mut self,
        run: impl Into<String>,
        sample: impl Into<String>,
    ) -> Result<(), FeatureError> {
        let run = run.into();
        let sample = sample.into();

        match self.by_run.get(&run) {
            Some(existing) if *existing != sample => Err(FeatureError::ConflictingSample {
                run,
                first: existing.clone(),
                second: sample,
            }),
            Some(_) => Ok(()),
            None => {
                self.by_run.insert(run, sample);
                Ok(())
            }
        }
    }

    pub fn sample_of(&self, run: &str) -> Option<&str> {
        self.by_run.get(run).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_run.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_run.is_empty()
    }
}

/// How per-run rows map to output rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupingMode {
    /// One output row per run; no reduction
    Ungrouped,
    /// One output row per sample, reduced with the catalog's aggregation
    Grouped(SampleMap),
}

impl GroupingMode {
    /// Name of the row key column in the output table
    pub fn output_key(&self) -> &'static str {
        match self {
            GroupingMode::Ungrouped => RUN_KEY,
            GroupingMode::Grouped(_) => SAMPLE_KEY,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GroupingMode::Ungrouped => "per run",
            GroupingMode::Grouped(_) => "per sample",
        }
    }
}

/// Aggregate the run table and rename to public feature names
pub fn build_feature_table(
    table: &IndexedTable,
    mode: &GroupingMode,
    catalog: &FeatureCatalog,
) -> Result<IndexedTable, FeatureError> {
    let aggregated = aggregate_samples(table, mode, catalog)?;
    rename_features(&aggregated, catalog)
}

/// Reduce `table` to the catalog's columns, one row per output key
///
/// Grouped rows are ordered lexicographically by sample id. Runs without a
/// sample are dropped. Reducers skip missing values; a sample whose runs have
/// no value for a feature gets a null.
pub fn aggregate_samples(
    table: &IndexedTable,
    mode: &GroupingMode,
    catalog: &FeatureCatalog,
) -> Result<IndexedTable, FeatureError> {
    let missing: Vec<String> = catalog
        .columns()
        .into_iter()
        .filter(|column| !table.has_column(column))
        .map(str::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(FeatureError::MissingColumns {
            context: "feature catalog".to_string(),
            columns: missing,
        });
    }

    match mode {
        GroupingMode::Ungrouped => {
            debug!("Ungrouped mode: catalog aggregation functions are not applied");
            table.select(&catalog.columns())
        }
        GroupingMode::Grouped(samples) => group_by_sample(table, samples, catalog),
    }
}

fn group_by_sample(
    table: &IndexedTable,
    samples: &SampleMap,
    catalog: &FeatureCatalog,
) -> Result<IndexedTable, FeatureError> {
    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    let mut unmapped = 0usize;
    for (row, run) in table.index().iter().enumerate() {
        match samples.sample_of(run) {
            Some(sample) => groups.entry(sample).or_default().push(row),
            None => unmapped += 1,
        }
    }

    if unmapped > 0 {
        warn!(
            "{} of {} runs have no sample in the manifest and are dropped",
            unmapped,
            table.num_rows()
        );
    }

    let mut columns = Vec::with_capacity(catalog.len());
    for entry in catalog.entries() {
        let values = table.float_column(entry.column)?;
        let reduced: Float64Array = groups
            .values()
            .map(|rows| {
                entry.aggregation.reduce(
                    rows.iter()
                        .filter(|&&row| values.is_valid(row))
                        .map(|&row| values.value(row)),
                )
            })
            .collect();
        columns.push((entry.column.to_string(), Arc::new(reduced) as ArrayRef));
    }

    let index: Vec<String> = groups.keys().map(|sample| sample.to_string()).collect();
    info!(
        "Aggregated {} runs into {} samples",
        table.num_rows() - unmapped,
        index.len()
    );

    IndexedTable::from_columns(SAMPLE_KEY, index, columns)
}

/// Rename catalog columns to their public names
pub fn rename_features(
    table: &IndexedTable,
    catalog: &FeatureCatalog,
) -> Result<IndexedTable, FeatureError> {
    let renames = catalog.rename_map();
    for (from, to) in &renames {
        if table.has_column(from) {
            debug!("Renaming feature: {} -> {}", from, to);
        }
    }
    table.rename_columns(&renames)
}
