//! Error types shared by the pipeline components
use std::fmt;

use thiserror::Error;

/// Which dataset a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Account,
    Post,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Account => write!(f, "account"),
            RecordKind::Post => write!(f, "post"),
        }
    }
}

/// Errors raised by the fetch/transform/publish/relay components.
/// Nothing here is retried; every variant aborts the current step.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Transport failure or a non-JSON body from the metrics API
    #[error("request to {url} failed: {reason}")]
    UpstreamApi { url: String, reason: String },

    /// An API response is missing an expected key or holds a value of the wrong type
    #[error("{kind} response #{index} does not match the expected schema: {detail}")]
    MissingField {
        kind: RecordKind,
        index: usize,
        detail: String,
    },

    #[error("failed to write blob '{key}': {reason}")]
    StorageWrite { key: String, reason: String },

    #[error("blob '{key}' does not exist")]
    BlobNotFound { key: String },

    #[error("failed to download blob '{key}': {reason}")]
    Download { key: String, reason: String },

    #[error("push of metric '{metric}' was rejected: {reason}")]
    MetricsPush { metric: String, reason: String },

    #[error("CSV error in '{key}': {source}")]
    Csv {
        key: String,
        #[source]
        source: csv::Error,
    },

    #[error("blob '{key}' has columns {found:?}, expected {expected:?}")]
    UnexpectedColumns {
        key: String,
        found: Vec<String>,
        expected: Vec<String>,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    /// True for both flavours of a failed blob read
    pub fn is_download_error(&self) -> bool {
        matches!(
            self,
            PipelineError::BlobNotFound { .. } | PipelineError::Download { .. }
        )
    }
}
