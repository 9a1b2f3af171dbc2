//! Source record parser
//!
//! Turns a CSV or JSON-Lines extract into a lazy stream of raw records. The
//! file is never loaded whole: CSV rows are read on a blocking task feeding a
//! bounded channel, JSON-Lines are read line by line. A slow consumer stops
//! the reader once the channel is full.

mod csv_reader;
mod departments;
mod jsonl_reader;

pub use departments::Departments;

use crate::error::{ImportError, ImportResult};
use futures::stream::{Stream, StreamExt};
use serde_json::{Map, Value};
use std::path::Path;
use std::pin::Pin;
use tracing::debug;

/// One line of an extract, untyped
pub type RawRecord = Map<String, Value>;

/// Lazy stream of raw records
pub type RecordStream = Pin<Box<dyn Stream<Item = ImportResult<RawRecord>> + Send>>;

/// Supported extract formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    JsonLines,
}

impl SourceFormat {
    /// Detect the format from the file extension
    pub fn from_path(path: &Path) -> ImportResult<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match extension.as_deref() {
            Some("csv") => Ok(SourceFormat::Csv),
            Some("jsonl") | Some("ndjson") => Ok(SourceFormat::JsonLines),
            _ => Err(ImportError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// Reader options
#[derive(Debug, Clone)]
pub struct SourceOptions {
    /// Keep only records whose department field starts with one of these codes
    pub departments: Departments,
    /// Field holding the key the department filter applies to
    pub department_field: Option<&'static str>,
    /// CSV delimiter
    pub delimiter: u8,
    /// Records read ahead of the consumer
    pub buffer: usize,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            departments: Departments::default(),
            department_field: None,
            delimiter: b',',
            buffer: 1024,
        }
    }
}

impl SourceOptions {
    fn keeps(&self, record: &RawRecord) -> bool {
        if self.departments.is_empty() {
            return true;
        }
        let Some(field) = self.department_field else {
            return true;
        };
        match record.get(field) {
            Some(Value::String(s)) => self.departments.matches(s),
            Some(Value::Number(n)) => self.departments.matches(&n.to_string()),
            _ => false,
        }
    }
}

/// Open an extract and stream its records
///
/// Fails before reading anything when the format is unsupported or the file
/// cannot be opened.
pub async fn read_records(path: &Path, options: &SourceOptions) -> ImportResult<RecordStream> {
    let format = SourceFormat::from_path(path)?;
    debug!(path = %path.display(), ?format, "Opening extract");

    let records: RecordStream = match format {
        SourceFormat::Csv => csv_reader::read(path, options.delimiter, options.buffer)?,
        SourceFormat::JsonLines => jsonl_reader::read(path).await?,
    };

    if options.departments.is_empty() {
        return Ok(records);
    }

    let options = options.clone();
    let filtered = records.filter(move |item| {
        let keep = match item {
            Ok(record) => options.keeps(record),
            Err(_) => true,
        };
        futures::future::ready(keep)
    });
    Ok(Box::pin(filtered))
}
