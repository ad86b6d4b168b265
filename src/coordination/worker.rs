use anyhow::{Context, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::debug;

use crate::formats::{SourceSpec, TableReader};
use crate::table::IndexedTable;
use crate::telemetry::TelemetryEvent;

/// Worker that reads sources until none are left to claim
pub struct SourceWorker {
    pub worker_id: usize,
    pub reader: Arc<dyn TableReader>,
    pub sources: Arc<Vec<SourceSpec>>,
    pub next_source: Arc<AtomicUsize>,
    pub abort: Arc<AtomicBool>,
    pub telemetry_tx: mpsc::UnboundedSender<TelemetryEvent>,
}

impl SourceWorker {
    /// Run the worker loop
    ///
    /// Returns every table this worker read, tagged with its source position.
    /// The first failed read raises the shared abort flag so that no worker
    /// claims further sources.
    pub async fn run(&self) -> Result<Vec<(usize, IndexedTable)>> {
        let mut loaded = Vec::new();

        while let Some(index) = self.try_claim() {
            match self.load_source(&self.sources[index]).await {
                Ok(table) => loaded.push((index, table)),
                Err(e) => {
                    self.abort.store(true, Ordering::SeqCst);
                    return Err(e);
                }
            }
        }

        debug!(
            "Worker {} finished after {} sources",
            self.worker_id,
            loaded.len()
        );
        Ok(loaded)
    }

    /// Claim the next unread source, unless the load was aborted
    fn try_claim(&self) -> Option<usize> {
        if self.abort.load(Ordering::SeqCst) {
            return None;
        }

        let index = self.next_source.fetch_add(1, Ordering::SeqCst);
        (index < self.sources.len()).then_some(index)
    }

    async fn load_source(&self, source: &SourceSpec) -> Result<IndexedTable> {
        let _ = self.telemetry_tx.send(TelemetryEvent::SourceStarted);
        let start = Instant::now();

        let table = self
            .reader
            .read_table(source)
            .await
            .with_context(|| format!("Failed to load source '{}'", source.name))?;

        let _ = self.telemetry_tx.send(TelemetryEvent::SourceLoaded {
            rows: table.num_rows() as u64,
            columns: table.num_columns() as u64,
            duration_ms: start.elapsed().as_millis() as u64,
        });

        debug!(
            "Worker {} loaded source '{}' ({} rows, {} columns)",
            self.worker_id,
            source.name,
            table.num_rows(),
            table.num_columns()
        );
        Ok(table)
    }
}
