//! Index error types
//!
//! Error codes:
//! - COMPOSITE_INDEX_KEY_TYPE_MISMATCH (FATAL)
//! - COMPOSITE_INDEX_LOOKUP_NOT_SINGULAR (FATAL)

use thiserror::Error;

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Index errors. Both indicate a caller bug, never bad data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("Cannot compare {left} key with {right} key")]
    KeyTypeMismatch { left: String, right: String },

    #[error("Lookup spec does not name a single key: {0}")]
    NotSingular(String),
}

impl IndexError {
    pub fn code(&self) -> &'static str {
        match self {
            IndexError::KeyTypeMismatch { .. } => "COMPOSITE_INDEX_KEY_TYPE_MISMATCH",
            IndexError::NotSingular(_) => "COMPOSITE_INDEX_LOOKUP_NOT_SINGULAR",
        }
    }

    pub fn is_fatal(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = IndexError::KeyTypeMismatch {
            left: "int".into(),
            right: "string".into(),
        };
        assert_eq!(err.code(), "COMPOSITE_INDEX_KEY_TYPE_MISMATCH");
        assert!(err.to_string().contains("int"));
        assert!(IndexError::NotSingular("range".into()).is_fatal());
    }
}
