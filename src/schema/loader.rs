//! Schema loader for reading entity schemas from disk
//!
//! A schema file holds one schema object or an array of them. Files in a
//! directory are read in file-name order, so the first version of an
//! entity met in that order becomes its default version.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::errors::{SchemaError, SchemaResult};
use super::store::InMemoryMetadataStore;
use super::types::EntitySchema;

/// Loads schema files into an [`InMemoryMetadataStore`]
pub struct SchemaLoader {
    store: InMemoryMetadataStore,
}

impl Default for SchemaLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaLoader {
    pub fn new() -> Self {
        Self {
            store: InMemoryMetadataStore::new(),
        }
    }

    /// Loads every `.json` file of a directory.
    pub fn load_dir(&mut self, dir: &Path) -> SchemaResult<()> {
        let entries = fs::read_dir(dir).map_err(|e| {
            SchemaError::malformed(dir.display().to_string(), format!("Failed to read schema directory: {}", e))
        })?;

        let mut files: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                SchemaError::malformed(dir.display().to_string(), format!("Failed to read directory entry: {}", e))
            })?;
            let path = entry.path();
            // Skip non-JSON files
            if path.extension().map_or(false, |ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();

        for path in files {
            self.load_file(&path)?;
        }
        Ok(())
    }

    /// Loads a single schema file.
    pub fn load_file(&mut self, path: &Path) -> SchemaResult<()> {
        let content = fs::read_to_string(path)
            .map_err(|e| SchemaError::malformed(path.display().to_string(), format!("Failed to read file: {}", e)))?;
        let value: Value = serde_json::from_str(&content)
            .map_err(|e| SchemaError::malformed(path.display().to_string(), format!("Invalid JSON: {}", e)))?;
        self.load_value(&path.display().to_string(), &value)
    }

    /// Loads one schema object or an array of schema objects.
    pub fn load_value(&mut self, source_name: &str, value: &Value) -> SchemaResult<()> {
        let items: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        for item in items {
            let schema: EntitySchema = serde_json::from_value(item.clone())
                .map_err(|e| SchemaError::malformed(source_name, format!("Invalid schema: {}", e)))?;
            schema
                .validate_structure()
                .map_err(|e| SchemaError::malformed(source_name, e))?;
            self.store.register(schema)?;
        }
        Ok(())
    }

    pub fn schema_count(&self) -> usize {
        self.store.schema_count()
    }

    /// The populated store
    pub fn into_store(self) -> InMemoryMetadataStore {
        self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MetadataStore;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_load_dir_in_name_order() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.json"), json!({"name": "A", "version": "2"}).to_string()).unwrap();
        fs::write(
            dir.path().join("a.json"),
            json!([{"name": "A", "version": "1"}, {"name": "B", "version": "1"}]).to_string(),
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut loader = SchemaLoader::new();
        loader.load_dir(dir.path()).unwrap();
        assert_eq!(loader.schema_count(), 3);
        let store = loader.into_store();
        assert_eq!(store.entity("A", None).unwrap().version, "1");
    }

    #[test]
    fn test_malformed_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        let err = SchemaLoader::new().load_file(&path).unwrap_err();
        assert_eq!(err.code(), "COMPOSITE_SCHEMA_MALFORMED");
        assert!(err.to_string().contains("bad.json"));
    }

    #[test]
    fn test_missing_version_rejected() {
        let err = SchemaLoader::new()
            .load_value("inline", &json!({"name": "A"}))
            .unwrap_err();
        assert!(matches!(err, SchemaError::Malformed { .. }));
    }
}
