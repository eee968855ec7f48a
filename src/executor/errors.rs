//! Executor errors
//!
//! Error codes:
//! - COMPOSITE_RANGE_ON_NON_ROOT (FATAL, programming error)
//! - COMPOSITE_BACKEND_FETCH (recorded on the operation context)

use thiserror::Error;

use crate::finder::FinderError;

/// Result type for executor operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    #[error("A range can only be set on the root entity, not on {entity}")]
    RangeOnNonRoot { entity: String },

    #[error("Fetch from {entity} failed: {source}")]
    BackendFetch { entity: String, source: FinderError },
}

impl ExecutorError {
    pub fn code(&self) -> &'static str {
        match self {
            ExecutorError::RangeOnNonRoot { .. } => "COMPOSITE_RANGE_ON_NON_ROOT",
            ExecutorError::BackendFetch { .. } => "COMPOSITE_BACKEND_FETCH",
        }
    }

    /// Fetch failures are collected and the find carries on
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExecutorError::RangeOnNonRoot { .. })
    }

    pub fn entity(&self) -> &str {
        match self {
            ExecutorError::RangeOnNonRoot { entity } | ExecutorError::BackendFetch { entity, .. } => entity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_severity() {
        let err = ExecutorError::RangeOnNonRoot { entity: "B".into() };
        assert_eq!(err.code(), "COMPOSITE_RANGE_ON_NON_ROOT");
        assert!(err.is_fatal());

        let err = ExecutorError::BackendFetch {
            entity: "B".into(),
            source: FinderError::Backend("timeout".into()),
        };
        assert!(!err.is_fatal());
        assert_eq!(err.entity(), "B");
        assert_eq!(err.to_string(), "Fetch from B failed: Backend error: timeout");
    }
}
