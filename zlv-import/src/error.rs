//! Error types for zlv-import

use crate::validation::ValidationError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading, validating or processing an extract
#[derive(Debug, Error)]
pub enum ImportError {
    /// File extension is neither CSV nor JSON-Lines
    #[error("Unsupported file format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    /// Malformed line or row in the extract
    #[error("Parse error at line {line}: {message}")]
    Parse { line: u64, message: String },

    /// Record does not satisfy its schema
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Record points at an owner or housing unit that does not exist
    #[error("Missing reference: {0}")]
    MissingReference(String),

    /// Invalid command-line or configuration input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Pipeline stopped by an interrupt
    #[error("Import cancelled")]
    Cancelled,

    /// CSV reader error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// zlv-common error (database, configuration)
    #[error(transparent)]
    Common(#[from] zlv_common::Error),
}

impl From<sqlx::Error> for ImportError {
    fn from(err: sqlx::Error) -> Self {
        ImportError::Common(zlv_common::Error::Database(err))
    }
}

/// Result type for the import pipeline
pub type ImportResult<T> = Result<T, ImportError>;
