//! Metadata resolution errors
//!
//! Error codes:
//! - COMPOSITE_UNKNOWN_ENTITY (FATAL)
//! - COMPOSITE_DISABLED_METADATA (FATAL)
//! - COMPOSITE_METADATA_VERSION_CONFLICT (FATAL)
//! - COMPOSITE_UNKNOWN_BACKEND (FATAL)

use thiserror::Error;

/// Result type for metadata resolution
pub type MetadataResult<T> = Result<T, MetadataError>;

/// Errors that abort a composite find before any sub-query runs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error("Unknown entity {name}:{}", version.as_deref().unwrap_or("<default>"))]
    UnknownEntity { name: String, version: Option<String> },

    #[error("Entity {name}:{version} is disabled")]
    DisabledMetadata { name: String, version: String },

    #[error("Entity {name} appears with versions {first} and {second}")]
    VersionConflict {
        name: String,
        first: String,
        second: String,
    },

    #[error("Entity {name} is stored in unknown backend {backend}")]
    UnknownBackend { name: String, backend: String },
}

impl MetadataError {
    pub fn code(&self) -> &'static str {
        match self {
            MetadataError::UnknownEntity { .. } => "COMPOSITE_UNKNOWN_ENTITY",
            MetadataError::DisabledMetadata { .. } => "COMPOSITE_DISABLED_METADATA",
            MetadataError::VersionConflict { .. } => "COMPOSITE_METADATA_VERSION_CONFLICT",
            MetadataError::UnknownBackend { .. } => "COMPOSITE_UNKNOWN_BACKEND",
        }
    }

    pub fn is_fatal(&self) -> bool {
        true
    }
}
