//! Composite metadata
//!
//! Resolves the tree of entities a composite find may touch, starting from
//! the root entity and following reference fields.

mod composite;
mod errors;
mod resolver;

pub use composite::{CompositeEntity, CompositeMetadata, EntityId, ROOT};
pub use errors::{MetadataError, MetadataResult};
pub use resolver::{MetadataResolver, ResolvedComposite};
