//! Dataset downloader split into focused submodules.
//!
//! - [`dataset`] - paginated fetch of a single dataset into one output file
//! - [`run`] - sequential processing of a whole catalog with run logging

mod dataset;
mod run;


use crate::config::Config;
use crate::control::SkipSignal;
use crate::error::Result;
use crate::source::{HttpPageSource, PageSource};
use tokio_util::sync::CancellationToken;

/// Downloads datasets page by page from a [`PageSource`]
///
/// One downloader serves one run: the skip signal and the cancellation
/// token are scoped to it.
pub struct Downloader<S: PageSource> {
    pub(crate) source: S,
    pub(crate) config: Config,
    pub(crate) skip: SkipSignal,
    pub(crate) cancel: CancellationToken,
}

impl Downloader<HttpPageSource> {
    /// Downloader over the real dataset API
    pub fn from_config(
        config: Config,
        skip: SkipSignal,
        cancel: CancellationToken,
    ) -> Result<Self> {
        config.validate()?;
        let source = HttpPageSource::new(&config.fetch)?;
        Ok(Self::new(source, config, skip, cancel))
    }
}

impl<S: PageSource> Downloader<S> {
    /// Create a downloader over an arbitrary page source
    pub fn new(source: S, config: Config, skip: SkipSignal, cancel: CancellationToken) -> Self {
        Self {
            source,
            config,
            skip,
            cancel,
        }
    }

    /// The skip flag consulted before every page request
    pub fn skip_signal(&self) -> &SkipSignal {
        &self.skip
    }

    /// The token that interrupts the run
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}
