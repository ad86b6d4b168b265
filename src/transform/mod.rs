//! Pure table transforms applied after loading

pub mod aggregate;
pub mod coverage;

pub use aggregate::{GroupingMode, SampleMap, build_feature_table};
pub use coverage::{has_coverage, reduce_gene_body_coverage};
