//! Paginated fetch of one dataset.

use chrono::Utc;

use crate::error::Error;
use crate::output::TableWriter;
use crate::retry::{RetryError, fetch_with_retry};
use crate::source::PageSource;
use crate::types::{DatasetDescriptor, DownloadResult, DownloadStatus};
use crate::utils::output_path;

use super::Downloader;

/// Why the page loop ended early
enum Stop {
    Skipped,
    Interrupted,
    Failed(Error),
}

/// State that survives an early exit from the page loop
#[derive(Default)]
struct Progress {
    writer: Option<TableWriter>,
    pages: u64,
}

impl<S: PageSource> Downloader<S> {
    /// Download every row of one dataset into its output file
    ///
    /// Pages of `page_size` rows are requested from offset 0 until a page
    /// comes back short (or empty). The skip signal and the cancellation token
    /// are checked before every attempt, retries included, and during retry
    /// pauses. The output file is created when the
    /// first page arrives, so a dataset whose first request fails leaves no
    /// file behind.
    ///
    /// Always returns exactly one result; failures never propagate.
    pub async fn download(&self, descriptor: &DatasetDescriptor) -> DownloadResult {
        let started_at = Utc::now();
        let path = output_path(&self.config.output_dir, &descriptor.title, &descriptor.uuid);

        let mut progress = Progress::default();
        let outcome = self.fetch_pages(descriptor, &path, &mut progress).await;

        let mut row_count = 0;
        let mut written_to = None;
        let mut close_error = None;
        if let Some(writer) = progress.writer.take() {
            row_count = writer.rows_written();
            written_to = Some(writer.path().to_path_buf());
            if let Err(e) = writer.finish() {
                close_error = Some(e);
            }
        }

        let (status, error_detail) = match (outcome, close_error) {
            (Ok(()), None) => (DownloadStatus::Success, None),
            (Ok(()), Some(e)) => (DownloadStatus::Failed, Some(e.to_string())),
            (Err(Stop::Skipped), _) => {
                (DownloadStatus::Skipped, Some("skipped by operator".to_string()))
            }
            (Err(Stop::Interrupted), _) if self.skip.is_raised() => (
                DownloadStatus::Skipped,
                Some("interrupted after skip request".to_string()),
            ),
            (Err(Stop::Interrupted), _) => {
                (DownloadStatus::Failed, Some(Error::Interrupted.to_string()))
            }
            (Err(Stop::Failed(e)), _) => (DownloadStatus::Failed, Some(e.to_string())),
        };

        match status {
            DownloadStatus::Success => tracing::info!(
                uuid = %descriptor.uuid,
                rows = row_count,
                pages = progress.pages,
                "Dataset downloaded"
            ),
            DownloadStatus::Skipped => tracing::info!(
                uuid = %descriptor.uuid,
                rows = row_count,
                "Dataset skipped"
            ),
            DownloadStatus::Failed => tracing::warn!(
                uuid = %descriptor.uuid,
                rows = row_count,
                error = error_detail.as_deref().unwrap_or_default(),
                "Dataset failed"
            ),
        }

        DownloadResult {
            descriptor: descriptor.clone(),
            status,
            row_count,
            pages_fetched: progress.pages,
            output_path: written_to,
            error_detail,
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn fetch_pages(
        &self,
        descriptor: &DatasetDescriptor,
        path: &std::path::Path,
        progress: &mut Progress,
    ) -> Result<(), Stop> {
        let page_size = self.config.fetch.page_size;
        let mut offset = 0u64;

        loop {
            let fetched = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Stop::Interrupted),
                fetched = fetch_with_retry(
                    &self.config.retry,
                    || self.skip.is_raised() || self.cancel.is_cancelled(),
                    || self.source.fetch_page(&descriptor.api_url, offset, page_size),
                ) => fetched,
            };
            let rows = match fetched {
                Ok(rows) => rows,
                Err(RetryError::Failed(e)) => return Err(Stop::Failed(e)),
                Err(RetryError::Stopped) if self.cancel.is_cancelled() => {
                    return Err(Stop::Interrupted);
                }
                Err(RetryError::Stopped) => return Err(Stop::Skipped),
            };
            progress.pages += 1;

            if progress.writer.is_none() {
                progress.writer = Some(TableWriter::create(path).map_err(Stop::Failed)?);
            }
            if let Some(writer) = progress.writer.as_mut() {
                writer.write_page(&rows).map_err(Stop::Failed)?;
            }

            tracing::debug!(
                uuid = %descriptor.uuid,
                offset,
                rows = rows.len(),
                "Page written"
            );

            if (rows.len() as u64) < page_size {
                return Ok(());
            }
            offset += page_size;
        }
    }
}
