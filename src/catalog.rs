//! Dataset catalog loading
//!
//! The catalog is a CSV table produced by the portal scraper, one row per
//! dataset. Both the scraper's human-readable headers (`Title`, `API URL`,
//! `UUID`, ...) and snake_case headers (`title`, `api_url`, `uuid`, ...) are
//! accepted. Any structural problem is fatal for the run.

use crate::error::{Error, Result};
use crate::types::DatasetDescriptor;
use crate::utils::clean_api_url;
use serde::Deserialize;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct CatalogRow {
    #[serde(alias = "Title")]
    title: String,
    #[serde(alias = "Description", default)]
    description: String,
    #[serde(alias = "API URL", alias = "api url", default)]
    api_url: String,
    #[serde(alias = "UUID")]
    uuid: String,
    #[serde(alias = "Dataset URL", alias = "dataset url", default)]
    dataset_url: String,
}

/// Read the descriptor table at `path`
///
/// Rows with a duplicate uuid are dropped (first occurrence wins).
pub fn load_catalog(path: &Path) -> Result<Vec<DatasetDescriptor>> {
    let file = std::fs::File::open(path).map_err(|e| Error::Catalog {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let descriptors = read_catalog(file, path)?;
    tracing::info!(
        path = %path.display(),
        datasets = descriptors.len(),
        "Loaded dataset catalog"
    );
    Ok(descriptors)
}

/// Parse a descriptor table from any reader; `path` is only used in errors
pub fn read_catalog<R: Read>(reader: R, path: &Path) -> Result<Vec<DatasetDescriptor>> {
    let catalog_err = |reason: String| Error::Catalog {
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut seen = HashSet::new();
    let mut descriptors = Vec::new();

    for (index, record) in reader.deserialize::<CatalogRow>().enumerate() {
        // +2: one for the header line, one for 1-based numbering
        let line = index + 2;
        let row = record.map_err(|e| catalog_err(format!("line {line}: {e}")))?;

        if row.uuid.is_empty() {
            return Err(catalog_err(format!("line {line}: empty uuid")));
        }
        if !seen.insert(row.uuid.clone()) {
            tracing::warn!(uuid = %row.uuid, line, "Duplicate dataset in catalog, ignoring");
            continue;
        }

        descriptors.push(DatasetDescriptor {
            title: row.title,
            description: row.description,
            api_url: clean_api_url(&row.api_url),
            uuid: row.uuid,
            dataset_url: row.dataset_url,
        });
    }

    Ok(descriptors)
}
