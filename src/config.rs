//! Configuration constants for the feature builder
//!
//! This module centralizes the directory layout, key names and tunables used
//! throughout the application.

// ============================================================================
// Layout Configuration
// ============================================================================

/// Directory (under the output directory) holding source tables and the result
pub const FEATURES_DIR: &str = "Features";

/// Completion list of runs ready for feature extraction
pub const DONE_SAMPLE_FILE: &str = "done_sample.txt";

/// Final feature table
pub const OUTPUT_FILE: &str = "features.parquet";

/// Per-run source tables, in join order: (source name, file name)
pub const SOURCE_FILES: &[(&str, &str)] = &[
    ("layout", "layout.parquet"),
    ("fastq_screen", "fastq_screen.parquet"),
    ("atropos", "atropos.parquet"),
    ("hisat2", "hisat2.parquet"),
    ("aln_stats", "aln_stats.parquet"),
    ("rnaseqmetrics", "rnaseqmetrics.parquet"),
    ("genebody_coverage", "genebody_coverage.parquet"),
    ("markduplicates", "markduplicates.parquet"),
    ("count_summary", "count_summary.parquet"),
];

// ============================================================================
// Key Configuration
// ============================================================================

/// Column name of the run identifier
pub const RUN_KEY: &str = "srr";

/// Column name of the sample identifier
pub const SAMPLE_KEY: &str = "srx";

// ============================================================================
// Worker Configuration
// ============================================================================

/// Number of concurrent source readers
///
/// Source reads are small, local and independent, so a handful of workers is
/// enough to overlap I/O with parquet decoding.
pub const DEFAULT_WORKER_COUNT: usize = 3;

// ============================================================================
// I/O Configuration
// ============================================================================

/// Maximum rows per row group in the output parquet file
pub const OUTPUT_ROW_GROUP_SIZE: usize = 64 * 1024;
