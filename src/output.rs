//! Streaming CSV output for one dataset.
//!
//! Rows are written page by page as they arrive; nothing beyond the current
//! page is held in memory. The header comes from the field names of the
//! first non-empty page, in order of first appearance. Rows from later pages
//! are projected onto that header.

use crate::error::Result;
use crate::types::Row;
use serde_json::Value;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Output table for a single dataset
pub struct TableWriter {
    path: PathBuf,
    writer: csv::Writer<BufWriter<File>>,
    header: Option<Vec<String>>,
    rows_written: u64,
}

impl TableWriter {
    /// Create (or truncate) the output file, creating parent directories
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(BufWriter::new(file));
        Ok(Self {
            path: path.to_path_buf(),
            writer,
            header: None,
            rows_written: 0,
        })
    }

    /// Append one page of rows and flush it to disk
    pub fn write_page(&mut self, rows: &[Row]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        if self.header.is_none() {
            let header = header_from(rows);
            self.writer.write_record(&header)?;
            self.header = Some(header);
        }
        let header = self.header.as_deref().unwrap_or_default();

        for row in rows {
            let extra = row.keys().filter(|k| !header.contains(k)).count();
            if extra > 0 {
                tracing::debug!(
                    path = %self.path.display(),
                    extra,
                    "Row has fields outside the header, dropping them"
                );
            }
            let record: Vec<String> = header
                .iter()
                .map(|name| row.get(name).map(cell).unwrap_or_default())
                .collect();
            self.writer.write_record(&record)?;
            self.rows_written += 1;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Data rows written so far (header excluded)
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Path of the output file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and close the file, returning the number of data rows
    pub fn finish(mut self) -> Result<u64> {
        self.writer.flush()?;
        Ok(self.rows_written)
    }
}

/// Field names across a page, in order of first appearance
fn header_from(rows: &[Row]) -> Vec<String> {
    let mut header: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !header.iter().any(|h| h == key) {
                header.push(key.clone());
            }
        }
    }
    header
}

/// Render one JSON value as a CSV cell
fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        nested @ (Value::Array(_) | Value::Object(_)) => nested.to_string(),
    }
}
