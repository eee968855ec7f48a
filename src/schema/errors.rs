//! Schema error types
//!
//! Error codes:
//! - COMPOSITE_SCHEMA_MALFORMED
//! - COMPOSITE_SCHEMA_DUPLICATE

use thiserror::Error;

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors raised while loading or registering entity schemas
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("Malformed schema in {source_name}: {reason}")]
    Malformed { source_name: String, reason: String },

    #[error("Schema {name}:{version} is already registered")]
    Duplicate { name: String, version: String },
}

impl SchemaError {
    pub fn malformed(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        SchemaError::Malformed {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            SchemaError::Malformed { .. } => "COMPOSITE_SCHEMA_MALFORMED",
            SchemaError::Duplicate { .. } => "COMPOSITE_SCHEMA_DUPLICATE",
        }
    }

    pub fn is_fatal(&self) -> bool {
        true
    }
}
