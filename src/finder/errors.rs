//! # Finder Errors

use thiserror::Error;

/// Result type for backend finds
pub type FinderResult<T> = Result<T, FinderError>;

/// Errors reported by a backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FinderError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Document {id}: {message}")]
    Document { id: String, message: String },

    #[error("Unsupported request: {0}")]
    Unsupported(String),
}

impl FinderError {
    pub fn code(&self) -> &'static str {
        match self {
            FinderError::Backend(_) => "COMPOSITE_BACKEND_ERROR",
            FinderError::Document { .. } => "COMPOSITE_BACKEND_DOCUMENT_ERROR",
            FinderError::Unsupported(_) => "COMPOSITE_BACKEND_UNSUPPORTED",
        }
    }
}
