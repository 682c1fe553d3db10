//! Error taxonomy for the import engine.
//!
//! Every fallible library operation returns [`Result`]. Variants carry the
//! book key or path involved so the importer can decide whether to continue
//! with the next book or abort the run.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::BookKey;

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, HighlightsError>;

#[derive(Error, Debug)]
pub enum HighlightsError {
    /// The ereader database could not be opened or queried.
    #[error("highlight source unavailable at {}: {reason}", path.display())]
    SourceUnavailable { path: PathBuf, reason: String },

    /// No configuration file was found.
    #[error("no configuration found at {}; run `kh config new`", path.display())]
    ConfigurationMissing { path: PathBuf },

    /// A configuration file exists but cannot be used.
    #[error("invalid configuration in {}: {reason}", path.display())]
    InvalidConfig { path: PathBuf, reason: String },

    /// Appending blocks to a book document failed. Nothing was committed.
    #[error("failed to write document for {book} at {}: {source}", path.display())]
    DocumentWriteFailed {
        book: BookKey,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read document for {book} at {}: {source}", path.display())]
    DocumentReadFailed {
        book: BookKey,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The persisted id index is malformed. Recovered by scanning documents.
    #[error("imported-id index {} is corrupt: {reason}", path.display())]
    IndexCorrupt { path: PathBuf, reason: String },

    #[error("failed to write imported-id index {}: {source}", path.display())]
    IndexWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The import selection does not match any highlight in the source.
    #[error("{0} does not identify any highlight")]
    SelectionNotFound(String),
}

impl HighlightsError {
    pub fn source_unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_config(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::InvalidConfig {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn index_corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::IndexCorrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
