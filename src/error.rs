//! Error types for aggregation parsing and response serialization.
//!
//! Every failure aborts the current call. A response that simply lacks an
//! aggregation (no matching documents) is not an error and never reaches here.

use thiserror::Error;

/// Errors raised by the aggregation tree, response tree and serializers.
#[derive(Debug, Error)]
pub enum AggError {
    /// A requested level or grouping name does not exist in the aggregation tree.
    #[error("Cannot find <{0}>, agg node does not exist")]
    SchemaMismatch(String),

    /// A key that matches neither a declared filter nor the "other" bucket.
    #[error("Unknown <{key}> key in <Agg {agg}>")]
    UnresolvedKey { agg: String, key: String },

    /// The raw response lacks an expected structural field.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Unknown serialization mode name.
    #[error("Unknown {0} output format")]
    UnsupportedOutputMode(String),

    /// The aggregation request body cannot be interpreted.
    #[error("Invalid aggregation <{name}>: {reason}")]
    InvalidAggregation { name: String, reason: String },
}

impl AggError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        AggError::MalformedResponse(msg.into())
    }

    pub(crate) fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        AggError::InvalidAggregation {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, AggError>;
