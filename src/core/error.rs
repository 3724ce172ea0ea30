//! Error taxonomy for the ingestion pipeline

use thiserror::Error;

/// Retrieving or caching the remote rate document failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{url} responded with status {status}")]
    Status { url: String, status: u16 },

    #[error("failed to read response body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to write cached document {path}: {source}")]
    CacheWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// The document could not be turned into a page/row text model.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read cached document {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unreadable document: {0}")]
    Document(String),

    #[error("document parser stopped unexpectedly: {0}")]
    Worker(String),
}

/// A label matched but the quotes next to it could not be read.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractionError {
    #[error("no whitespace between label and quotes")]
    MissingSeparator,

    #[error("missing {field} quote")]
    MissingField { field: &'static str },

    #[error("invalid {field} quote '{token}'")]
    InvalidNumber { field: &'static str, token: String },

    #[error("negative {field} quote {value}")]
    NegativeQuote { field: &'static str, value: f64 },
}

/// Reading from or writing to the rate store failed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no stored rate for currency {code}")]
    NotFound { code: String },

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("corrupt stored record: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("rate store unavailable: {0}")]
    Unavailable(String),
}

impl From<fjall::Error> for StoreError {
    fn from(err: fjall::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}
