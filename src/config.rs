//! Configuration types for cms-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Page fetching behavior (page size, timeouts, pacing)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Rows requested per page (default: 5000)
    ///
    /// A page returning fewer rows than this ends the dataset.
    #[serde(default = "default_page_size")]
    pub page_size: u64,

    /// Timeout for a single page request (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Pause between two datasets (default: 1 second)
    #[serde(default = "default_delay_between_datasets", with = "duration_serde")]
    pub delay_between_datasets: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
            delay_between_datasets: default_delay_between_datasets(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 2 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration for a download run
///
/// Every field has a default, so an empty JSON object `{}` is a valid
/// configuration file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Descriptor table to read (default: "cms_datasets.csv")
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,

    /// Directory receiving one CSV per dataset (default: "./downloads")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Directory receiving one JSON run log per run (default: "./logs")
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Page fetching settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Retry settings for page requests
    #[serde(default)]
    pub retry: RetryConfig,

    /// Skip datasets that an earlier run in `log_dir` already downloaded
    /// completely (default: false)
    #[serde(default)]
    pub skip_existing: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_path: default_catalog_path(),
            output_dir: default_output_dir(),
            log_dir: default_log_dir(),
            fetch: FetchConfig::default(),
            retry: RetryConfig::default(),
            skip_existing: false,
        }
    }
}

impl Config {
    /// Load a configuration from a JSON file
    ///
    /// Missing fields take their defaults. The loaded config is validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {e}", path.display()),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&text).map_err(|e| Error::Config {
            message: format!("cannot parse {}: {e}", path.display()),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the fetch loop cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.fetch.page_size == 0 {
            return Err(Error::config("page_size", "page size must be at least 1"));
        }
        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "backoff_multiplier",
                "backoff multiplier must be a finite number >= 1.0",
            ));
        }
        if self.fetch.user_agent.trim().is_empty() {
            return Err(Error::config("user_agent", "user agent must not be empty"));
        }
        Ok(())
    }
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("cms_datasets.csv")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_page_size() -> u64 {
    5000
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    concat!(
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 ",
        "(KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
    )
    .to_string()
}

fn default_delay_between_datasets() -> Duration {
    Duration::from_secs(1)
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.catalog_path, PathBuf::from("cms_datasets.csv"));
        assert_eq!(config.fetch.page_size, 5000);
        assert_eq!(config.fetch.request_timeout, Duration::from_secs(30));
        assert_eq!(config.fetch.delay_between_datasets, Duration::from_secs(1));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_delay, Duration::from_secs(2));
        assert!(config.retry.jitter);
        assert!(!config.skip_existing);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_json_object_yields_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.fetch.page_size, 5000);
        assert_eq!(config.log_dir, PathBuf::from("./logs"));
    }

    #[test]
    fn partial_json_overrides_only_given_fields() {
        let json = r#"{
            "output_dir": "/data/cms",
            "fetch": { "page_size": 100, "delay_between_datasets": 0 },
            "retry": { "max_attempts": 7 },
            "skip_existing": true
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/data/cms"));
        assert_eq!(config.fetch.page_size, 100);
        assert_eq!(config.fetch.delay_between_datasets, Duration::ZERO);
        assert_eq!(config.fetch.request_timeout, Duration::from_secs(30));
        assert_eq!(config.retry.max_attempts, 7);
        assert_eq!(config.retry.max_delay, Duration::from_secs(60));
        assert!(config.skip_existing);
    }

    #[test]
    fn durations_serialize_as_seconds() {
        let json = serde_json::to_value(RetryConfig::default()).unwrap();
        assert_eq!(json["initial_delay"], 2);
        assert_eq!(json["max_delay"], 60);
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let mut config = Config::default();
        config.fetch.page_size = 0;
        match config.validate() {
            Err(Error::Config { key, .. }) => assert_eq!(key.as_deref(), Some("page_size")),
            other => panic!("expected page_size config error, got {other:?}"),
        }
    }

    #[test]
    fn shrinking_backoff_is_rejected() {
        let mut config = Config::default();
        config.retry.backoff_multiplier = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_file_reads_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.json");
        std::fs::write(&good, r#"{"fetch": {"page_size": 250}}"#).unwrap();
        assert_eq!(Config::from_file(&good).unwrap().fetch.page_size, 250);

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, r#"{"fetch": {"page_size": 0}}"#).unwrap();
        assert!(Config::from_file(&bad).is_err());

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            Config::from_file(&missing),
            Err(Error::Config { .. })
        ));
    }
}
