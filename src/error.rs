//! Error types for cms-dl
//!
//! This module provides the single error type used throughout the crate.
//! Variants fall into three groups:
//! - Startup errors (configuration, catalog) which abort the whole run
//! - Per-dataset errors (network, HTTP status, malformed page, output I/O)
//!   which are recorded in the run log and never stop the run
//! - Run log bookkeeping errors

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cms-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for cms-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "page_size")
        key: Option<String>,
    },

    /// The descriptor table could not be read or parsed
    #[error("cannot read catalog {path}: {reason}")]
    Catalog {
        /// Path of the catalog file
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error (connect, timeout, body read)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The dataset API answered with a non-success status
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// The descriptor's API URL is missing or unparseable
    #[error("invalid API URL {url:?}: {reason}")]
    InvalidUrl {
        /// The offending URL as found in the catalog
        url: String,
        /// Parser message
        reason: String,
    },

    /// A page body was not a JSON array of row objects
    #[error("malformed page at offset {offset}: {reason}")]
    MalformedPage {
        /// Offset of the page that failed to decode
        offset: u64,
        /// Decoder message
        reason: String,
    },

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A result for this dataset was already written to the run log
    #[error("dataset {uuid} already has a result in this run")]
    DuplicateResult {
        /// uuid of the dataset
        uuid: String,
    },

    /// The run was interrupted (Ctrl+C / SIGTERM)
    #[error("interrupted")]
    Interrupted,
}

impl Error {
    /// Shorthand for a configuration error on a named key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Machine-readable error code, stable across releases
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Catalog { .. } => "catalog_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::HttpStatus { .. } => "http_status",
            Error::InvalidUrl { .. } => "invalid_url",
            Error::MalformedPage { .. } => "malformed_page",
            Error::Csv(_) => "csv_error",
            Error::Serialization(_) => "serialization_error",
            Error::DuplicateResult { .. } => "duplicate_result",
            Error::Interrupted => "interrupted",
        }
    }
}
