use anyhow::{Result, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, warn};

use super::worker::SourceWorker;
use crate::config::RUN_KEY;
use crate::error::FeatureError;
use crate::formats::{SourceSpec, TableReader};
use crate::table::IndexedTable;
use crate::telemetry::{ProgressStats, TelemetryEvent};

type WorkerHandle = JoinHandle<Result<Vec<(usize, IndexedTable)>>>;

/// The SourceLoader reads every source and aligns them on the requested runs.
pub struct SourceLoader {
    reader: Arc<dyn TableReader>,
    worker_count: usize,
    quiet: bool,
}

impl SourceLoader {
    pub fn new(reader: Arc<dyn TableReader>, worker_count: usize, quiet: bool) -> Self {
        Self {
            reader,
            worker_count,
            quiet,
        }
    }

    /// Load `sources` into one wide table indexed by exactly `runs`
    ///
    /// This method orchestrates the load:
    /// 1. Check that every source exists before reading any of them
    /// 2. Spawn a bounded worker pool that claims sources one at a time
    /// 3. Put the tables back in source order
    /// 4. Validate run uniqueness and column ownership
    /// 5. Reindex every table on `runs` and join them side by side
    pub async fn load(&self, sources: &[SourceSpec], runs: &[String]) -> Result<IndexedTable> {
        let start_time = Instant::now();

        // 1. Preflight
        self.check_sources_exist(sources).await?;

        if sources.is_empty() {
            warn!("No sources configured; the run table has no columns");
            return Ok(IndexedTable::concat_columns(RUN_KEY, runs.to_vec(), &[])?);
        }

        // 2. Spawn workers with a telemetry channel
        let sources = Arc::new(sources.to_vec());
        let (telemetry_tx, telemetry_rx) = mpsc::unbounded_channel::<TelemetryEvent>();
        let worker_handles = self.spawn_worker_pool(&sources, telemetry_tx.clone());

        // Drop the loader's copy of the sender so the channel closes when workers finish
        drop(telemetry_tx);

        let prog_jh = self.setup_progress_tracking(sources.len(), telemetry_rx);
        let worker_results = futures::future::join_all(worker_handles).await;

        // Wait for the progress bar to finish so we don't collide output
        if let Some(jh) = prog_jh {
            let _ = jh.await;
        }

        // 3. Restore source order
        let tables = Self::collect_tables(&sources, worker_results)?;

        // 4. Validate
        validate_sources(&sources, &tables)?;

        // 5. Reindex and join
        let parts = tables
            .iter()
            .map(|table| table.reindex(runs))
            .collect::<Result<Vec<_>, _>>()?;
        let table = IndexedTable::concat_columns(RUN_KEY, runs.to_vec(), &parts)?;

        info!(
            "Loaded {} sources into {} rows x {} columns in {:.2}s",
            sources.len(),
            table.num_rows(),
            table.num_columns(),
            start_time.elapsed().as_secs_f64()
        );
        Ok(table)
    }

    /// Fail before any read when a source is absent
    async fn check_sources_exist(&self, sources: &[SourceSpec]) -> Result<()> {
        for source in sources {
            if !self.reader.exists(source).await? {
                return Err(FeatureError::MissingSource {
                    source_name: source.name.clone(),
                    path: source.path.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Spawn worker tasks sharing one claim cursor and one abort flag
    fn spawn_worker_pool(
        &self,
        sources: &Arc<Vec<SourceSpec>>,
        telemetry_tx: mpsc::UnboundedSender<TelemetryEvent>,
    ) -> Vec<WorkerHandle> {
        let worker_count = self.worker_count.clamp(1, sources.len());
        info!(
            "Spawning {} workers for {} sources...",
            worker_count,
            sources.len()
        );

        let next_source = Arc::new(AtomicUsize::new(0));
        let abort = Arc::new(AtomicBool::new(false));

        (0..worker_count)
            .map(|worker_id| {
                let worker = SourceWorker {
                    worker_id,
                    reader: Arc::clone(&self.reader),
                    sources: Arc::clone(sources),
                    next_source: Arc::clone(&next_source),
                    abort: Arc::clone(&abort),
                    telemetry_tx: telemetry_tx.clone(),
                };
                tokio::spawn(async move { worker.run().await })
            })
            .collect()
    }

    /// Setup progress tracking with a progress bar
    fn setup_progress_tracking(
        &self,
        total_sources: usize,
        mut telemetry_rx: mpsc::UnboundedReceiver<TelemetryEvent>,
    ) -> Option<JoinHandle<()>> {
        if self.quiet {
            return None;
        }

        let source_bar = ProgressBar::new(total_sources as u64);
        source_bar.set_style(bar_style(
            "[{elapsed_precise}] Sources: [{bar:30.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        ));

        Some(tokio::spawn(async move {
            let mut stats = ProgressStats::new();

            while let Some(event) = telemetry_rx.recv().await {
                stats.update(&event);
                source_bar.set_position(stats.sources_loaded as u64);
                source_bar.set_message(format!(
                    "| {} reading, {} rows, {} columns",
                    stats.in_flight(),
                    stats.rows_read,
                    stats.columns_read
                ));
            }

            match stats.slowest_ms() {
                Some(slowest) => {
                    source_bar.finish_with_message(format!("| slowest source {}ms", slowest))
                }
                None => source_bar.finish(),
            }
        }))
    }

    /// Put worker results back in source order, surfacing the first failure
    fn collect_tables(
        sources: &[SourceSpec],
        worker_results: Vec<Result<Result<Vec<(usize, IndexedTable)>>, JoinError>>,
    ) -> Result<Vec<IndexedTable>> {
        let mut slots: Vec<Option<IndexedTable>> = vec![None; sources.len()];

        for (i, result) in worker_results.into_iter().enumerate() {
            match result {
                Ok(Ok(loaded)) => {
                    for (index, table) in loaded {
                        slots[index] = Some(table);
                    }
                }
                Ok(Err(e)) => return Err(e),
                Err(e) => return Err(anyhow!("Worker {} panicked: {}", i, e)),
            }
        }

        slots
            .into_iter()
            .zip(sources)
            .map(|(slot, source)| {
                slot.ok_or_else(|| anyhow!("Source '{}' was never loaded", source.name))
            })
            .collect()
    }
}

/// Check every table before the join
///
/// A run listed twice in one source would make the reindex ambiguous. A column
/// offered by two sources would make the joined table ambiguous.
pub fn validate_sources(sources: &[SourceSpec], tables: &[IndexedTable]) -> Result<(), FeatureError> {
    let mut owners: HashMap<String, &str> = HashMap::new();

    for (source, table) in sources.iter().zip(tables) {
        if let Some(run) = table.first_duplicate() {
            return Err(FeatureError::DuplicateRun {
                source_name: source.name.clone(),
                run: run.to_string(),
            });
        }

        for column in table.column_names() {
            if let Some(first) = owners.get(&column) {
                return Err(FeatureError::ColumnCollision {
                    column,
                    first: first.to_string(),
                    second: source.name.clone(),
                });
            }
            owners.insert(column, &source.name);
        }
    }

    Ok(())
}

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .map(|style| style.progress_chars("=>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}
