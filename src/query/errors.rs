//! Query language errors

use thiserror::Error;

/// Result type for query parsing
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors raised while parsing query, sort and projection JSON
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("Malformed query expression: {0}")]
    MalformedQuery(String),

    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    #[error("Invalid regex '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },

    #[error("Malformed sort: {0}")]
    MalformedSort(String),

    #[error("Malformed projection: {0}")]
    MalformedProjection(String),
}

impl QueryError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::MalformedQuery(_) => "COMPOSITE_QUERY_MALFORMED",
            QueryError::UnknownOperator(_) => "COMPOSITE_QUERY_UNKNOWN_OPERATOR",
            QueryError::InvalidRegex { .. } => "COMPOSITE_QUERY_INVALID_REGEX",
            QueryError::MalformedSort(_) => "COMPOSITE_SORT_MALFORMED",
            QueryError::MalformedProjection(_) => "COMPOSITE_PROJECTION_MALFORMED",
        }
    }
}
