//! Utility functions for file naming and URL cleanup

use std::path::{Path, PathBuf};

/// Longest sanitized title kept in an output file name (in characters)
const MAX_TITLE_LEN: usize = 100;

/// Extension of per-dataset output files
pub const OUTPUT_EXTENSION: &str = "csv";

/// Turn a dataset title into a file-name-safe stem
///
/// ASCII letters and digits are kept, runs of whitespace become a single
/// `_`, `-` and `_` are kept, everything else is dropped. Leading and
/// trailing underscores are trimmed and the result is capped at
/// [`MAX_TITLE_LEN`] characters. An empty result becomes `"dataset"`.
///
/// # Examples
///
/// ```
/// use cms_dl::utils::sanitize_title;
///
/// assert_eq!(sanitize_title("Medicare Part D: Prescribers (2021)"), "Medicare_Part_D_Prescribers_2021");
/// assert_eq!(sanitize_title("???"), "dataset");
/// ```
pub fn sanitize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut last_underscore = false;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            out.push(ch);
            last_underscore = false;
        } else if (ch.is_whitespace() || ch == '_') && !last_underscore {
            out.push('_');
            last_underscore = true;
        }
    }

    let trimmed: String = out.trim_matches('_').chars().take(MAX_TITLE_LEN).collect();
    let trimmed = trimmed.trim_end_matches('_');
    if trimmed.is_empty() {
        "dataset".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Deterministic output file name for a dataset: `{sanitized_title}_{uuid}.csv`
///
/// The uuid is sanitized as well so a malformed catalog entry cannot escape
/// the output directory.
pub fn output_file_name(title: &str, uuid: &str) -> String {
    let uuid: String = uuid
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    format!("{}_{}.{}", sanitize_title(title), uuid, OUTPUT_EXTENSION)
}

/// Full output path for a dataset inside `output_dir`
pub fn output_path(output_dir: &Path, title: &str, uuid: &str) -> PathBuf {
    output_dir.join(output_file_name(title, uuid))
}

/// Normalize an API URL taken from the catalog
///
/// Trims whitespace and stray single quotes left by the scraper and forces
/// `https://` for `cms.gov` hosts. The result is not validated here; an
/// unparseable URL fails the dataset when its first page is requested.
pub fn clean_api_url(url: &str) -> String {
    let url = url.trim().trim_matches('\'').trim();
    if let Some(rest) = url.strip_prefix("http://") {
        let host = rest.split(['/', '?']).next().unwrap_or_default();
        if host == "cms.gov" || host.ends_with(".cms.gov") {
            return format!("https://{rest}");
        }
    }
    url.to_string()
}
