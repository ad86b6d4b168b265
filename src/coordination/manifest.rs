use std::path::Path;

use anyhow::{Context, Result};
use csv::StringRecord;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::config::RUN_KEY;
use crate::error::FeatureError;
use crate::transform::{GroupingMode, SampleMap};

/// The run manifest: every known run and, optionally, the sample it belongs to
///
/// A one-column manifest lists runs only and yields `GroupingMode::Ungrouped`.
/// A two-column manifest lists (sample, run) pairs and yields
/// `GroupingMode::Grouped`. Columns are matched by position; header names are
/// not interpreted. Empty sample cells leave the run without a sample.
#[derive(Debug, Clone)]
pub struct RunManifest {
    runs: Vec<String>,
    mode: GroupingMode,
}

impl RunManifest {
    /// Read and parse a tab-separated manifest file
    pub async fn from_path(path: &Path) -> Result<Self> {
        let data = fs::read(path)
            .await
            .with_context(|| format!("Failed to read run manifest {}", path.display()))?;

        let manifest = Self::parse(&data)
            .with_context(|| format!("Invalid run manifest {}", path.display()))?;

        info!(
            "Run manifest lists {} runs ({})",
            manifest.runs.len(),
            manifest.mode.label()
        );
        Ok(manifest)
    }

    /// Parse tab-separated manifest contents (with header)
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = tsv_reader(data);
        let width = reader
            .headers()
            .context("Failed to read manifest header")?
            .len();

        if width != 1 && width != 2 {
            return Err(FeatureError::ManifestShape(width).into());
        }

        let mut runs = Vec::new();
        let mut samples = SampleMap::new();

        for (line, record) in reader.records().enumerate() {
            // header is line 1
            let record =
                record.with_context(|| format!("Failed to parse manifest line {}", line + 2))?;

            let (sample, run) = if width == 1 {
                (None, field(&record, 0))
            } else {
                (Some(field(&record, 0)), field(&record, 1))
            };

            if run.is_empty() {
                continue;
            }

            if let Some(sample) = sample.filter(|sample| !sample.is_empty()) {
                samples.insert(run, sample)?;
            }
            runs.push(run.to_string());
        }

        let mode = if width == 2 {
            if samples.is_empty() {
                warn!("Run manifest has a sample column but assigns no run to a sample");
            } else {
                debug!("{} runs are assigned to a sample", samples.len());
            }
            GroupingMode::Grouped(samples)
        } else {
            GroupingMode::Ungrouped
        };

        Ok(Self { runs, mode })
    }

    pub fn runs(&self) -> &[String] {
        &self.runs
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn mode(&self) -> &GroupingMode {
        &self.mode
    }

    pub fn into_mode(self) -> GroupingMode {
        self.mode
    }
}

/// Read the completion list: the runs ready for feature extraction, in order
pub async fn read_completion_list(path: &Path) -> Result<Vec<String>> {
    let data = fs::read(path)
        .await
        .with_context(|| format!("Failed to read completion list {}", path.display()))?;

    let runs = parse_completion_list(&data)
        .with_context(|| format!("Invalid completion list {}", path.display()))?;

    info!("Completion list has {} runs", runs.len());
    Ok(runs)
}

/// Parse a tab-separated completion list with a `srr` header column
pub fn parse_completion_list(data: &[u8]) -> Result<Vec<String>> {
    let mut reader = tsv_reader(data);
    let position = reader
        .headers()
        .context("Failed to read completion list header")?
        .iter()
        .position(|name| name == RUN_KEY)
        .ok_or_else(|| FeatureError::MissingColumns {
            context: "completion list".to_string(),
            columns: vec![RUN_KEY.to_string()],
        })?;

    let mut runs = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record =
            record.with_context(|| format!("Failed to parse completion list line {}", line + 2))?;
        let run = field(&record, position);
        if !run.is_empty() {
            runs.push(run.to_string());
        }
    }

    Ok(runs)
}

fn tsv_reader(data: &[u8]) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(data)
}

fn field(record: &StringRecord, position: usize) -> &str {
    record.get(position).unwrap_or("")
}
