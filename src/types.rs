//! Core types for cms-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One downloadable dataset as listed in the catalog
///
/// The `uuid` is the stable identifier used for output naming and for
/// correlating run log entries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    /// Dataset title
    pub title: String,
    /// Free-text description
    pub description: String,
    /// Data API endpoint (paged with `offset` / `size`)
    pub api_url: String,
    /// Dataset identifier
    pub uuid: String,
    /// Human-facing dataset page
    pub dataset_url: String,
}

/// One row as returned by the dataset API, passed through untouched
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Outcome of one dataset within a run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    /// All pages were fetched and written
    Success,
    /// Retries exhausted, malformed response, bad URL, output error or interrupt
    Failed,
    /// Abandoned by the operator
    Skipped,
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DownloadStatus::Success => "success",
            DownloadStatus::Failed => "failed",
            DownloadStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Final record for one dataset in one run
///
/// Serialized as one element of the run log array; the descriptor fields
/// are flattened into the record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownloadResult {
    /// The dataset this result belongs to
    #[serde(flatten)]
    pub descriptor: DatasetDescriptor,
    /// Outcome
    pub status: DownloadStatus,
    /// Data rows written to the output file
    pub row_count: u64,
    /// Page requests that returned a page
    pub pages_fetched: u64,
    /// Output file, if one was created
    pub output_path: Option<PathBuf>,
    /// Last error for failed results, reason for skipped ones
    pub error_detail: Option<String>,
    /// When processing of this dataset began
    pub started_at: DateTime<Utc>,
    /// When processing of this dataset ended
    pub finished_at: DateTime<Utc>,
}

/// Totals for a finished (or interrupted) run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Results recorded
    pub total: usize,
    /// Results with status success
    pub succeeded: usize,
    /// Results with status failed
    pub failed: usize,
    /// Results with status skipped
    pub skipped: usize,
    /// Data rows written across all datasets
    pub rows: u64,
    /// Whether the run stopped early on an interrupt
    pub interrupted: bool,
}

impl RunSummary {
    /// Fold one result into the totals
    pub fn record(&mut self, result: &DownloadResult) {
        self.total += 1;
        self.rows += result.row_count;
        match result.status {
            DownloadStatus::Success => self.succeeded += 1,
            DownloadStatus::Failed => self.failed += 1,
            DownloadStatus::Skipped => self.skipped += 1,
        }
    }
}
