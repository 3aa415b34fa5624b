//! Page sources: where dataset rows come from.
//!
//! The fetch loop only knows the [`PageSource`] trait. [`HttpPageSource`] is
//! the production implementation against the data.cms.gov data API, which
//! pages with `offset` / `size` query parameters and answers with a JSON
//! array of row objects.

use crate::config::FetchConfig;
use crate::error::{Error, Result};
use crate::types::Row;
use url::Url;

/// Abstraction over page retrieval, enabling testability.
#[async_trait::async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch up to `size` rows of the dataset at `api_url`, starting at `offset`
    ///
    /// An empty vector means there is no data at or past `offset`.
    async fn fetch_page(&self, api_url: &str, offset: u64, size: u64) -> Result<Vec<Row>>;
}

/// Production [`PageSource`] over HTTP.
#[derive(Clone)]
pub struct HttpPageSource {
    client: reqwest::Client,
}

impl HttpPageSource {
    /// Build a client with the configured timeout and User-Agent
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_page(&self, api_url: &str, offset: u64, size: u64) -> Result<Vec<Row>> {
        let url = page_url(api_url, offset, size)?;
        tracing::debug!(url = %url, "Requesting page");

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.bytes().await?;
        parse_page(&body, offset)
    }
}

/// Build the request URL for one page
///
/// Existing `offset` / `size` parameters on `api_url` are replaced, any other
/// query parameters are kept.
pub fn page_url(api_url: &str, offset: u64, size: u64) -> Result<Url> {
    let invalid = |reason: &str| Error::InvalidUrl {
        url: api_url.to_string(),
        reason: reason.to_string(),
    };

    if api_url.trim().is_empty() {
        return Err(invalid("empty"));
    }
    let mut url = Url::parse(api_url).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "offset" && k != "size")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    {
        let mut query = url.query_pairs_mut();
        query.clear();
        for (k, v) in &kept {
            query.append_pair(k, v);
        }
        query
            .append_pair("offset", &offset.to_string())
            .append_pair("size", &size.to_string());
    }

    Ok(url)
}

/// Decode a page body into rows
///
/// The body must be a JSON array whose elements are all objects.
pub fn parse_page(body: &[u8], offset: u64) -> Result<Vec<Row>> {
    serde_json::from_slice::<Vec<Row>>(body).map_err(|e| Error::MalformedPage {
        offset,
        reason: e.to_string(),
    })
}
