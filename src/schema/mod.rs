//! Entity schemas and the metadata store
//!
//! # Design Principles
//!
//! - Schemas are immutable once registered
//! - Every entity name has one default version
//! - Disabled versions stay registered; resolution refuses them

mod errors;
mod loader;
mod store;
mod types;

pub use errors::{SchemaError, SchemaResult};
pub use loader::SchemaLoader;
pub use store::{InMemoryMetadataStore, MetadataStore};
pub use types::{AccessRules, EntitySchema, EntityStatus, IndexDef, ReferenceDef, DEFAULT_BACKEND};
