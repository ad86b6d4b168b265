//! The feature catalog: which columns become features, how runs of the same
//! sample are combined, and what each feature is called in the output.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::error::FeatureError;

/// Reducer applied to the runs of one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Sum,
    Mean,
    Min,
    Max,
}

impl Aggregation {
    /// Reduce the present values of a group
    ///
    /// Returns `None` when the group has no present values.
    pub fn reduce(self, values: impl IntoIterator<Item = f64>) -> Option<f64> {
        let mut count = 0usize;
        let mut acc = 0.0f64;

        for value in values {
            acc = if count == 0 {
                value
            } else {
                match self {
                    Aggregation::Sum | Aggregation::Mean => acc + value,
                    Aggregation::Min => acc.min(value),
                    Aggregation::Max => acc.max(value),
                }
            };
            count += 1;
        }

        match (count, self) {
            (0, _) => None,
            (n, Aggregation::Mean) => Some(acc / n as f64),
            _ => Some(acc),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Aggregation::Sum => "sum",
            Aggregation::Mean => "mean",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
        };
        f.write_str(name)
    }
}

/// One catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureSpec {
    /// Column name in the joined per-run table
    pub column: &'static str,
    pub aggregation: Aggregation,
    /// Public name, when it differs from `column`
    pub rename: Option<&'static str>,
}

impl FeatureSpec {
    pub const fn new(column: &'static str, aggregation: Aggregation) -> Self {
        Self {
            column,
            aggregation,
            rename: None,
        }
    }

    pub const fn renamed(
        column: &'static str,
        aggregation: Aggregation,
        public_name: &'static str,
    ) -> Self {
        Self {
            column,
            aggregation,
            rename: Some(public_name),
        }
    }

    pub fn public_name(&self) -> &'static str {
        self.rename.unwrap_or(self.column)
    }
}

use Aggregation::{Mean, Sum};

/// Built-in feature set. Percent coding bases is not listed: it is the
/// complement of percent UTR bases.
pub const FEATURE_CATALOG: &[FeatureSpec] = &[
    FeatureSpec::renamed("rRNA_pct_reads_mapped", Mean, "percent_rrna_reads"),
    FeatureSpec::renamed("too_short", Sum, "number_reads_too_short"),
    FeatureSpec::renamed("num_reads", Sum, "number_reads"),
    FeatureSpec::renamed("num_multimappers", Sum, "number_multimapping_reads"),
    FeatureSpec::renamed("per_alignment", Mean, "percent_alignment"),
    FeatureSpec::new("reads_MQ0", Sum),
    FeatureSpec::new("average_quality", Mean),
    FeatureSpec::renamed("Percent Reverse", Mean, "percent_reverse"),
    FeatureSpec::new("percent_utr_bases", Mean),
    FeatureSpec::new("percent_intronic_bases", Mean),
    FeatureSpec::new("percent_intergenic_bases", Mean),
    FeatureSpec::new("percent_mrna_bases", Mean),
    FeatureSpec::new("median_cv_coverage", Mean),
    FeatureSpec::new("percent_duplication", Mean),
    FeatureSpec::new("number_genic_reads", Sum),
    FeatureSpec::new("percent_genes_on", Mean),
    FeatureSpec::new("number_junction_reads", Sum),
    FeatureSpec::new("number_junctions_on", Sum),
    FeatureSpec::new("gene_body_five_prime", Mean),
    FeatureSpec::new("gene_body_middle", Mean),
    FeatureSpec::new("gene_body_three_prime", Mean),
];

/// Validated, ordered feature catalog
#[derive(Debug, Clone)]
pub struct FeatureCatalog {
    entries: Vec<FeatureSpec>,
}

impl Default for FeatureCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FeatureCatalog {
    /// Validate `entries`: internal names and public names must each be unique
    pub fn new(entries: Vec<FeatureSpec>) -> Result<Self, FeatureError> {
        let mut columns = HashSet::new();
        let mut public_names = HashSet::new();

        for entry in &entries {
            if !columns.insert(entry.column) {
                return Err(FeatureError::DuplicateFeature(entry.column.to_string()));
            }
            if !public_names.insert(entry.public_name()) {
                return Err(FeatureError::DuplicateFeature(
                    entry.public_name().to_string(),
                ));
            }
        }

        Ok(Self { entries })
    }

    /// The compiled-in catalog (its validity is covered by tests)
    pub fn builtin() -> Self {
        Self {
            entries: FEATURE_CATALOG.to_vec(),
        }
    }

    pub fn entries(&self) -> &[FeatureSpec] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn columns(&self) -> Vec<&'static str> {
        self.entries.iter().map(|entry| entry.column).collect()
    }

    pub fn public_names(&self) -> Vec<&'static str> {
        self.entries.iter().map(FeatureSpec::public_name).collect()
    }

    pub fn contains_column(&self, column: &str) -> bool {
        self.entries.iter().any(|entry| entry.column == column)
    }

    /// Internal name -> public name, for entries that are actually renamed
    pub fn rename_map(&self) -> HashMap<&'static str, &'static str> {
        self.entries
            .iter()
            .filter_map(|entry| entry.rename.map(|public| (entry.column, public)))
            .collect()
    }
}
