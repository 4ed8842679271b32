use std::io;

use thiserror::Error;

/// Failures raised by a record source while counting or paging.
///
/// These are the only fatal errors in a harvest; everything below the source
/// (unresolved fields, odd shapes, empty results) degrades to "no value".
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("record source '{source_name}' is unavailable: {reason}")]
    Unavailable { source_name: String, reason: String },
    #[error("invalid page cursor '{0}'")]
    InvalidCursor(String),
    #[error("invalid page query: {0}")]
    InvalidQuery(String),
}

/// Why a stored record could not be turned into a `ResourceRecord`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("stored record is not a document")]
    NotADocument,
    #[error("stored record has no payload at '{0}'")]
    MissingPayload(String),
}

/// Error type for loading and validating a `HarvestConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid type pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("configuration error: {0}")]
    Invalid(String),
}
