//! High-level runner API for the feature table builder.
//!
//! This module wires the manifest readers, the source loader, the transforms
//! and the writer together behind two entry points: `run_build` for the
//! standard `<outdir>/Features` layout and `run_pipeline` for a fully explicit
//! `PipelineConfig`.
//!
//! This is the primary API for external users and for the CLI.

use anyhow::{Context, Result};
use derive_builder::Builder;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::{DONE_SAMPLE_FILE, FEATURES_DIR, OUTPUT_FILE, RUN_KEY, SOURCE_FILES};
use crate::coordination::{RunManifest, SourceLoader, read_completion_list};
use crate::formats::parquet::{ParquetTableReader, write_feature_table};
use crate::transform::coverage::is_tertile;
use crate::transform::{build_feature_table, has_coverage, reduce_gene_body_coverage};

pub use crate::catalog::{Aggregation, FeatureCatalog, FeatureSpec};
pub use crate::config::DEFAULT_WORKER_COUNT;
pub use crate::error::FeatureError;
pub use crate::formats::SourceSpec;

/// Fully explicit pipeline configuration
#[derive(Debug, Clone, Builder)]
pub struct PipelineConfig {
    /// Run manifest (one column: runs; two columns: sample, run)
    #[builder(setter(into))]
    manifest_path: PathBuf,
    /// Completion list whose `srr` column gives the requested runs
    #[builder(setter(into))]
    completion_list_path: PathBuf,
    /// Source tables, in join order
    sources: Vec<SourceSpec>,
    #[builder(setter(into))]
    output_path: PathBuf,
    #[builder(default = "DEFAULT_WORKER_COUNT")]
    worker_count: usize,
    #[builder(default)]
    quiet: bool,
    /// Compute the table but do not write it
    #[builder(default)]
    dry_run: bool,
    #[builder(default)]
    catalog: FeatureCatalog,
}

/// Arguments for building features from a standard output directory
#[derive(Debug, Clone)]
pub struct BuildArgs {
    pub manifest_path: PathBuf,
    /// Directory containing `Features/`
    pub output_dir: PathBuf,
    pub worker_count: usize,
    pub quiet: bool,
    pub dry_run: bool,
}

/// Result of a completed build
#[derive(Debug)]
pub struct BuildResult {
    /// "per sample" or "per run"
    pub mode: &'static str,
    pub runs_requested: usize,
    pub rows: usize,
    pub features: Vec<String>,
    pub duration: Duration,
    /// Where the table was written; `None` for a dry run
    pub output_path: Option<PathBuf>,
}

/// The standard source set under `features_dir`
pub fn feature_sources(features_dir: &Path) -> Vec<SourceSpec> {
    SOURCE_FILES
        .iter()
        .map(|(name, file)| SourceSpec::new(*name, features_dir.join(file)))
        .collect()
}

/// Build the feature table from `<output_dir>/Features`
///
/// Reads `done_sample.txt` and the nine per-run source tables from the
/// features directory and writes `features.parquet` next to them.
///
/// # Example
///
/// ```no_run
/// use qc_feature_table::runner::{BuildArgs, run_build};
///
/// # async fn example() -> anyhow::Result<()> {
/// let args = BuildArgs {
///     manifest_path: "srx2srr.txt".into(),
///     output_dir: "output".into(),
///     worker_count: 3,
///     quiet: true,
///     dry_run: false,
/// };
///
/// let result = run_build(args).await?;
/// println!("{} rows, {} features", result.rows, result.features.len());
/// # Ok(())
/// # }
/// ```
pub async fn run_build(args: BuildArgs) -> Result<BuildResult> {
    let features_dir = args.output_dir.join(FEATURES_DIR);

    let config = PipelineConfigBuilder::default()
        .manifest_path(args.manifest_path)
        .completion_list_path(features_dir.join(DONE_SAMPLE_FILE))
        .sources(feature_sources(&features_dir))
        .output_path(features_dir.join(OUTPUT_FILE))
        .worker_count(args.worker_count)
        .quiet(args.quiet)
        .dry_run(args.dry_run)
        .build()?;

    run_pipeline(&config).await
}

/// Run the pipeline: load, reduce coverage, aggregate, rename, write
///
/// Any failure aborts before the output is written.
pub async fn run_pipeline(config: &PipelineConfig) -> Result<BuildResult> {
    let start_time = Instant::now();

    let manifest = RunManifest::from_path(&config.manifest_path).await?;
    let runs = read_completion_list(&config.completion_list_path).await?;

    let known: HashSet<&str> = manifest.runs().iter().map(String::as_str).collect();
    let unlisted = runs.iter().filter(|run| !known.contains(run.as_str())).count();
    if unlisted > 0 {
        warn!(
            "{} completed runs are not listed in the run manifest",
            unlisted
        );
    }

    let reader = Arc::new(ParquetTableReader::new(RUN_KEY));
    let loader = SourceLoader::new(reader, config.worker_count, config.quiet);
    let mut table = loader.load(&config.sources, &runs).await?;

    let catalog_needs_coverage = config.catalog.columns().into_iter().any(is_tertile);
    if has_coverage(&table) || catalog_needs_coverage {
        table = reduce_gene_body_coverage(&table)?;
    } else {
        debug!("No gene body coverage columns; skipping coverage reduction");
    }

    let mode = manifest.into_mode();
    let features = build_feature_table(&table, &mode, &config.catalog)?;
    info!(
        "Built feature table: {} rows x {} features, keyed by '{}' ({})",
        features.num_rows(),
        features.num_columns(),
        mode.output_key(),
        mode.label()
    );

    let output_path = if config.dry_run {
        info!("Dry run: not writing {}", config.output_path.display());
        None
    } else {
        let path = config.output_path.clone();
        let to_write = features.clone();
        tokio::task::spawn_blocking(move || write_feature_table(&to_write, &path))
            .await
            .context("Feature table writer task failed")??;

        info!("Wrote {}", config.output_path.display());
        Some(config.output_path.clone())
    };

    Ok(BuildResult {
        mode: mode.label(),
        runs_requested: runs.len(),
        rows: features.num_rows(),
        features: features.column_names(),
        duration: start_time.elapsed(),
        output_path,
    })
}
