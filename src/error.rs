//! Error types for cursor parsing and federated queries.

use thiserror::Error;

/// The client cursor, or a key token inside it, could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("empty segment at position {position}")]
    EmptySegment { position: usize },

    #[error("segment {segment:?} has no ':' separator")]
    MissingSeparator { segment: String },

    #[error("segment {segment:?} has an empty source id")]
    EmptySourceId { segment: String },

    #[error("source {source_id} has an empty value")]
    EmptyValue { source_id: String },

    #[error("segment {segment:?} is not valid percent-encoding")]
    BadEncoding { segment: String },

    #[error("source {source_id} appears more than once")]
    DuplicateSource { source_id: String },

    #[error("bad key token {token:?}: {reason}")]
    BadKey { token: String, reason: String },
}

#[derive(Debug, Error)]
pub enum FederationError {
    #[error("invalid continuation: {0}")]
    MalformedCursor(#[from] CursorError),

    #[error("source {source_id} unavailable: {source:#}")]
    SourceUnavailable {
        source_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("page size must be at least 1")]
    InvalidPageSize,
}

pub type FederationResult<T> = Result<T, FederationError>;
