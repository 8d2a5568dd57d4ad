//! Error types for the ingestion pipeline
//!
//! Each stage has its own error so callers can tell a network failure from a
//! malformed payload or a failed upload. None of them is fatal to a dump run:
//! the orchestrator logs the error, counts the item as failed and moves on.

use thiserror::Error;

/// Why a single HTTP attempt failed
#[derive(Error, Debug)]
pub enum AttemptError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("rate limited (HTTP 429)")]
    RateLimited,

    /// 4xx other than 429. Retried like any other failure.
    #[error("request rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("server error HTTP {status}: {body}")]
    Server { status: u16, body: String },

    #[error("failed to decode response body: {0}")]
    Decode(String),

    #[error("request failed: {0}")]
    Other(String),
}

impl AttemptError {
    pub fn kind(&self) -> &'static str {
        match self {
            AttemptError::Timeout | AttemptError::Connect(_) | AttemptError::Server { .. } => {
                "transient"
            },
            AttemptError::RateLimited => "rate_limited",
            AttemptError::Rejected { .. } | AttemptError::Decode(_) => "permanent_request",
            AttemptError::Other(_) => "unknown",
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AttemptError::Timeout
        } else if err.is_connect() {
            AttemptError::Connect(err.to_string())
        } else if err.is_decode() {
            AttemptError::Decode(err.to_string())
        } else {
            AttemptError::Other(err.to_string())
        }
    }
}

/// Fetcher failure signal
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("all {attempts} attempts failed for {url}; last error: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: AttemptError,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Table builder failure
#[derive(Error, Debug)]
pub enum TableError {
    #[error("input contains no records")]
    Empty,

    #[error("expected a JSON object or an array of objects, got {0}")]
    Malformed(String),

    #[error("record {index} is not a JSON object (got {kind})")]
    NotAnObject { index: usize, kind: String },

    #[error("failed to re-encode records: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("columnar conversion failed: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("columnar conversion produced {got} rows for {expected} records")]
    RowCount { expected: usize, got: usize },
}

/// Blob store failure
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("bucket '{0}' does not exist")]
    NoSuchBucket(String),

    #[error("S3 request failed: {0}")]
    S3(String),
}

/// Archive failure: the artifact was not persisted
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("parquet serialization failed: {0}")]
    Parquet(#[from] polars::prelude::PolarsError),

    #[error("upload of {key} failed: {source}")]
    Upload {
        key: String,
        #[source]
        source: StorageError,
    },
}

/// Catalog definition error
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("catalog id '{0}' is not a lowercase slug")]
    InvalidId(String),

    #[error("catalog label '{label}' for '{id}' is not of the form 'Name (TICKER)'")]
    InvalidLabel { id: String, label: String },

    #[error("catalog ticker '{ticker}' for '{id}' must be 2-6 characters")]
    InvalidTicker { id: String, ticker: String },

    #[error("catalog id '{0}' is defined twice")]
    Duplicate(String),
}

/// Failure of one collection (fetch + build + archive) in the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no catalog entry matches '{0}'")]
    UnknownCoin(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Lake(#[from] coinlake_common::LakeError),
}
