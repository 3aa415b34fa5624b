//! # cms-dl
//!
//! Bulk downloader for the CMS open-data catalog.
//!
//! A catalog CSV lists datasets (title, API URL, uuid). Each dataset is
//! fetched page by page from its JSON API and written to one CSV file per
//! dataset. Every run produces a JSON run log with one record per dataset
//! attempted.
//!
//! ## Quick Start
//!
//! ```no_run
//! use cms_dl::{Config, Downloader, RunLogger, SkipSignal, load_catalog};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let datasets = load_catalog(&config.catalog_path)?;
//!
//!     let mut logger = RunLogger::create(&config.log_dir)?;
//!     let cancel = CancellationToken::new();
//!     tokio::spawn(cms_dl::cancel_on_signal(cancel.clone()));
//!
//!     let downloader = Downloader::from_config(config, SkipSignal::new(), cancel)?;
//!     let summary = downloader.run(&datasets, &mut logger).await;
//!     logger.close()?;
//!
//!     println!("{} of {} datasets downloaded", summary.succeeded, summary.total);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Catalog loading
pub mod catalog;
/// Configuration types
pub mod config;
/// Operator skip control
pub mod control;
/// Paginated dataset downloader
pub mod downloader;
/// Error types
pub mod error;
/// Tabular output files
pub mod output;
/// Retry logic with exponential backoff
pub mod retry;
/// Per-run result log
pub mod run_log;
/// Page sources (HTTP API)
pub mod source;
/// Core types
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use catalog::load_catalog;
pub use config::{Config, FetchConfig, RetryConfig};
pub use control::{SkipSignal, spawn_skip_listener};
pub use downloader::Downloader;
pub use error::{Error, Result};
pub use run_log::RunLogger;
pub use source::{HttpPageSource, PageSource};
pub use types::{DatasetDescriptor, DownloadResult, DownloadStatus, Row, RunSummary};

/// Cancel `token` when the process receives a termination signal
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// Meant to be spawned as a background task next to [`Downloader::run`]; the
/// run records the in-progress dataset and stops once the token fires.
pub async fn cancel_on_signal(token: tokio_util::sync::CancellationToken) {
    wait_for_signal().await;
    tracing::warn!("Interrupt received, stopping after the current dataset is recorded");
    token.cancel();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
