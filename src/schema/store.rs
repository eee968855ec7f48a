//! Metadata store
//!
//! Entity schemas by name and version, with one default version per name.

use std::collections::HashMap;
use std::sync::Arc;

use super::errors::{SchemaError, SchemaResult};
use super::types::EntitySchema;

/// Source of entity schemas
pub trait MetadataStore: Send + Sync {
    /// The schema of `name` at `version`, or at the default version when
    /// `version` is `None`
    fn entity(&self, name: &str, version: Option<&str>) -> Option<Arc<EntitySchema>>;
}

/// Metadata store held entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    schemas: HashMap<(String, String), Arc<EntitySchema>>,
    defaults: HashMap<String, String>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema. The first version registered for a name becomes
    /// its default version.
    ///
    /// Schemas are immutable: registering the same name and version twice
    /// fails.
    pub fn register(&mut self, schema: EntitySchema) -> SchemaResult<()> {
        schema
            .validate_structure()
            .map_err(|e| SchemaError::malformed("<in-memory>", e))?;

        let key = (schema.name.clone(), schema.version.clone());
        if self.schemas.contains_key(&key) {
            return Err(SchemaError::Duplicate {
                name: key.0,
                version: key.1,
            });
        }
        self.defaults
            .entry(schema.name.clone())
            .or_insert_with(|| schema.version.clone());
        self.schemas.insert(key, Arc::new(schema));
        Ok(())
    }

    /// Builder form of [`InMemoryMetadataStore::register`]
    pub fn with(mut self, schema: EntitySchema) -> SchemaResult<Self> {
        self.register(schema)?;
        Ok(self)
    }

    /// Makes `version` the default version of `name`
    pub fn set_default(&mut self, name: &str, version: &str) -> SchemaResult<()> {
        if !self.exists(name, version) {
            return Err(SchemaError::malformed(
                "<in-memory>",
                format!("cannot default {} to unknown version {}", name, version),
            ));
        }
        self.defaults.insert(name.to_string(), version.to_string());
        Ok(())
    }

    pub fn default_version(&self, name: &str) -> Option<&str> {
        self.defaults.get(name).map(String::as_str)
    }

    pub fn exists(&self, name: &str, version: &str) -> bool {
        self.schemas.contains_key(&(name.to_string(), version.to_string()))
    }

    /// Returns all registered schemas.
    pub fn all_schemas(&self) -> impl Iterator<Item = &Arc<EntitySchema>> {
        self.schemas.values()
    }

    pub fn schema_count(&self) -> usize {
        self.schemas.len()
    }
}

impl MetadataStore for InMemoryMetadataStore {
    fn entity(&self, name: &str, version: Option<&str>) -> Option<Arc<EntitySchema>> {
        let version = match version {
            Some(v) => v,
            None => self.default_version(name)?,
        };
        self.schemas.get(&(name.to_string(), version.to_string())).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_default_version() {
        let mut store = InMemoryMetadataStore::new();
        store.register(EntitySchema::new("A", "1.0.0")).unwrap();
        store.register(EntitySchema::new("A", "2.0.0")).unwrap();
        assert_eq!(store.entity("A", None).unwrap().version, "1.0.0");
        assert_eq!(store.entity("A", Some("2.0.0")).unwrap().version, "2.0.0");
        store.set_default("A", "2.0.0").unwrap();
        assert_eq!(store.entity("A", None).unwrap().version, "2.0.0");
        assert!(store.entity("A", Some("3.0.0")).is_none());
        assert!(store.entity("B", None).is_none());
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut store = InMemoryMetadataStore::new();
        store.register(EntitySchema::new("A", "1")).unwrap();
        let err = store.register(EntitySchema::new("A", "1")).unwrap_err();
        assert_eq!(err.code(), "COMPOSITE_SCHEMA_DUPLICATE");
        assert!(store.set_default("A", "9").is_err());
    }
}
