//! Sequential processing of a whole catalog.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::run_log::{RunLogger, completed_downloads};
use crate::source::PageSource;
use crate::types::{DatasetDescriptor, DownloadResult, DownloadStatus, RunSummary};

use super::Downloader;

impl<S: PageSource> Downloader<S> {
    /// Download every dataset in order, recording one result per dataset
    ///
    /// Datasets are processed one at a time. The skip signal is lowered
    /// before each dataset starts. A failed dataset never stops the run; only
    /// the cancellation token does, after the in-progress dataset has been
    /// recorded. Datasets never started get no log entry. With `skip_existing`
    /// set, datasets completed by an earlier run are recorded as skipped
    /// without any request and without the pause that follows a download.
    pub async fn run(
        &self,
        descriptors: &[DatasetDescriptor],
        logger: &mut RunLogger,
    ) -> RunSummary {
        let total = descriptors.len();
        let delay = self.config.fetch.delay_between_datasets;
        let mut interrupted = false;
        let completed = self.completed_downloads();

        tracing::info!(run_id = %logger.run_id(), datasets = total, "Starting run");

        for (index, descriptor) in descriptors.iter().enumerate() {
            if self.cancel.is_cancelled() {
                interrupted = true;
                break;
            }

            self.skip.reset();
            tracing::info!(
                dataset = index + 1,
                total,
                uuid = %descriptor.uuid,
                title = %descriptor.title,
                "Processing dataset"
            );

            if let Some(output) = completed.get(&descriptor.uuid) {
                tracing::info!(
                    uuid = %descriptor.uuid,
                    path = %output.display(),
                    "Output already downloaded, skipping"
                );
                record(logger, already_downloaded(descriptor, output));
                continue;
            }

            let result = self.download(descriptor).await;
            record(logger, result);

            if self.cancel.is_cancelled() {
                interrupted = true;
                break;
            }

            if index + 1 < total && !delay.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        interrupted = true;
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        let mut summary = logger.summary();
        summary.interrupted = interrupted;

        tracing::info!(
            run_id = %logger.run_id(),
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            rows = summary.rows,
            interrupted = summary.interrupted,
            "Download summary"
        );
        summary
    }

    /// Outputs finished by earlier runs, when `skip_existing` is on
    fn completed_downloads(&self) -> HashMap<String, PathBuf> {
        if !self.config.skip_existing {
            return HashMap::new();
        }
        match completed_downloads(&self.config.log_dir) {
            Ok(done) => {
                tracing::info!(datasets = done.len(), "Found completed downloads from earlier runs");
                done
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not read earlier run logs, downloading everything");
                HashMap::new()
            }
        }
    }
}

fn record(logger: &mut RunLogger, result: DownloadResult) {
    let uuid = result.descriptor.uuid.clone();
    if let Err(e) = logger.append(result) {
        tracing::error!(uuid = %uuid, error = %e, "Could not record result");
    }
}

fn already_downloaded(descriptor: &DatasetDescriptor, output: &Path) -> DownloadResult {
    let now = Utc::now();
    DownloadResult {
        descriptor: descriptor.clone(),
        status: DownloadStatus::Skipped,
        row_count: 0,
        pages_fetched: 0,
        output_path: Some(output.to_path_buf()),
        error_detail: Some("already downloaded".to_string()),
        started_at: now,
        finished_at: now,
    }
}
