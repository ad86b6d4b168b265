/// Telemetry events sent from source workers to the loader for progress tracking
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    /// Worker started reading a source
    SourceStarted,
    /// Worker finished reading a source
    SourceLoaded {
        rows: u64,
        columns: u64,
        duration_ms: u64,
    },
}

/// Statistics aggregated from telemetry events
#[derive(Debug, Default, Clone)]
pub struct ProgressStats {
    pub sources_started: usize,
    pub sources_loaded: usize,
    pub rows_read: u64,
    pub columns_read: u64,
    pub load_durations_ms: Vec<u64>,
}

impl ProgressStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a telemetry event
    pub fn update(&mut self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::SourceStarted => {
                self.sources_started += 1;
            }
            TelemetryEvent::SourceLoaded {
                rows,
                columns,
                duration_ms,
            } => {
                self.sources_loaded += 1;
                self.rows_read += rows;
                self.columns_read += columns;
                self.load_durations_ms.push(*duration_ms);
            }
        }
    }

    /// Sources claimed by a worker but not yet loaded
    pub fn in_flight(&self) -> usize {
        self.sources_started.saturating_sub(self.sources_loaded)
    }

    /// Duration of the slowest source read
    pub fn slowest_ms(&self) -> Option<u64> {
        self.load_durations_ms.iter().copied().max()
    }
}
