//! Run log: one JSON document per run recording every dataset outcome.
//!
//! The document is a JSON array of [`DownloadResult`] records. It is
//! rewritten after every append (temp file + rename), so an interrupted run
//! still leaves a complete, parseable log of everything attempted so far.

use crate::error::{Error, Result};
use crate::types::{DownloadResult, DownloadStatus, RunSummary};
use chrono::{DateTime, Local};
use std::collections::{HashMap, HashSet};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Accumulates results for one run and persists them to the log directory
pub struct RunLogger {
    run_id: String,
    path: PathBuf,
    results: Vec<DownloadResult>,
    logged: HashSet<String>,
    dirty: bool,
    closed: bool,
}

impl RunLogger {
    /// Allocate a new run in `log_dir`, stamped with the current local time
    pub fn create(log_dir: &Path) -> Result<Self> {
        Self::create_at(log_dir, Local::now())
    }

    /// Allocate a new run in `log_dir` stamped with `now`
    ///
    /// The run identifier is `run_{counter}_{YYYYMMDD}_{HHMMSS}`, where the
    /// counter is one more than the highest counter already in `log_dir`.
    /// An empty log document is written immediately.
    pub fn create_at(log_dir: &Path, now: DateTime<Local>) -> Result<Self> {
        std::fs::create_dir_all(log_dir)?;
        let counter = next_run_counter(log_dir)?;
        let run_id = format!("run_{:04}_{}", counter, now.format("%Y%m%d_%H%M%S"));
        let path = log_dir.join(format!("{run_id}.json"));

        let mut logger = Self {
            run_id,
            path,
            results: Vec::new(),
            logged: HashSet::new(),
            dirty: true,
            closed: false,
        };
        logger.flush()?;
        tracing::info!(run_id = %logger.run_id, path = %logger.path.display(), "Run log created");
        Ok(logger)
    }

    /// Identifier of this run
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Where the log document is written
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Results recorded so far, in order
    pub fn results(&self) -> &[DownloadResult] {
        &self.results
    }

    /// Totals over the recorded results
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for result in &self.results {
            summary.record(result);
        }
        summary
    }

    /// Record the outcome for one dataset and persist the log
    ///
    /// Each dataset uuid may be recorded once per run; a second append for the
    /// same uuid is rejected and leaves the log unchanged.
    pub fn append(&mut self, result: DownloadResult) -> Result<()> {
        if !self.logged.insert(result.descriptor.uuid.clone()) {
            return Err(Error::DuplicateResult {
                uuid: result.descriptor.uuid,
            });
        }
        tracing::debug!(
            uuid = %result.descriptor.uuid,
            status = %result.status,
            "Recording dataset result"
        );
        self.results.push(result);
        self.dirty = true;
        self.flush()
    }

    /// Write the full document if anything changed since the last write
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let tmp = self.path.with_extension("json.tmp");
        {
            let file = std::fs::File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &self.results)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        self.dirty = false;
        Ok(())
    }

    /// Final flush; returns the log path
    pub fn close(mut self) -> Result<PathBuf> {
        self.flush()?;
        self.closed = true;
        tracing::info!(
            run_id = %self.run_id,
            results = self.results.len(),
            path = %self.path.display(),
            "Run log written"
        );
        Ok(self.path.clone())
    }
}

impl Drop for RunLogger {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.flush() {
            tracing::error!(error = %e, path = %self.path.display(), "Failed to flush run log");
        }
    }
}

/// One more than the highest `run_NNNN_...` counter present in `log_dir`
fn next_run_counter(log_dir: &Path) -> Result<u32> {
    let highest = run_logs(log_dir)?
        .last()
        .map(|(counter, _)| *counter)
        .unwrap_or(0);
    Ok(highest + 1)
}

/// Counter of a `run_NNNN_...` file name
fn run_counter(name: &str) -> Option<u32> {
    let rest = name.strip_prefix("run_")?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Run log files in `log_dir`, oldest counter first
fn run_logs(log_dir: &Path) -> Result<Vec<(u32, PathBuf)>> {
    let mut logs = Vec::new();
    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(counter) = name.to_str().and_then(run_counter) else {
            continue;
        };
        logs.push((counter, entry.path()));
    }
    logs.sort();
    Ok(logs)
}

/// Datasets whose output is complete according to earlier run logs
///
/// Logs are replayed oldest first. Only results that wrote pages change a
/// dataset's state: a `success` marks its output complete, any other status
/// marks it incomplete, since the file was truncated and partly rewritten.
/// Outputs that no longer exist on disk are left out. Unreadable logs are
/// skipped with a warning; a missing `log_dir` yields an empty map.
pub fn completed_downloads(log_dir: &Path) -> Result<HashMap<String, PathBuf>> {
    if !log_dir.exists() {
        return Ok(HashMap::new());
    }

    let mut state: HashMap<String, Option<PathBuf>> = HashMap::new();
    for (_, path) in run_logs(log_dir)? {
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let results: Vec<DownloadResult> = match std::fs::read(&path)
            .map_err(Error::from)
            .and_then(|bytes| serde_json::from_slice(&bytes).map_err(Error::from))
        {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable run log");
                continue;
            }
        };
        for result in results {
            if result.pages_fetched == 0 {
                continue;
            }
            let complete = match (result.status, result.output_path) {
                (DownloadStatus::Success, Some(output)) => Some(output),
                _ => None,
            };
            state.insert(result.descriptor.uuid, complete);
        }
    }

    Ok(state
        .into_iter()
        .filter_map(|(uuid, output)| output.filter(|p| p.exists()).map(|p| (uuid, p)))
        .collect())
}
