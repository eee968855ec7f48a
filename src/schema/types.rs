//! Entity schema definitions
//!
//! An entity schema names the entity and its version, the backend that
//! stores it, the fields that identify a document, the indexed fields, the
//! reference fields linking it to other entities and its access rules.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::query::{Path, QueryExpr, Sort};

/// Backend used when a schema does not name one
pub const DEFAULT_BACKEND: &str = "memory";

/// Whether an entity version may be queried
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
    #[default]
    Enabled,
    Disabled,
}

/// A secondary index declared on an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    #[serde(default)]
    pub name: Option<String>,
    pub fields: Vec<Path>,
    #[serde(default)]
    pub unique: bool,
}

/// A reference field: an array of documents of another entity, selected by
/// a query relative to the referenced entity.
///
/// The query may address fields of the object holding the reference field
/// with a `$parent.` prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDef {
    /// Path of the reference field inside the referencing entity
    pub field: Path,
    /// Referenced entity name
    pub entity: String,
    /// Referenced entity version; resolved later when absent
    #[serde(default)]
    pub version: Option<String>,
    pub query: QueryExpr,
    #[serde(default)]
    pub sort: Option<Sort>,
}

/// Role lists guarding an entity and its fields. An empty list, or one
/// containing `anyone`, allows everybody.
///
/// Only `find` and the field lists are enforced here. The write operations'
/// lists are carried so the roles of a composite can be reported in full.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRules {
    #[serde(default)]
    pub find: Vec<String>,
    #[serde(default)]
    pub insert: Vec<String>,
    #[serde(default)]
    pub update: Vec<String>,
    #[serde(default)]
    pub delete: Vec<String>,
    #[serde(default)]
    pub fields: BTreeMap<Path, Vec<String>>,
}

impl AccessRules {
    /// Every role named by any rule
    pub fn roles(&self) -> impl Iterator<Item = &String> {
        self.find
            .iter()
            .chain(&self.insert)
            .chain(&self.update)
            .chain(&self.delete)
            .chain(self.fields.values().flatten())
    }
}

/// One version of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySchema {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub status: EntityStatus,
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_id_fields")]
    pub id_fields: Vec<Path>,
    #[serde(default)]
    pub indexes: Vec<IndexDef>,
    #[serde(default)]
    pub references: Vec<ReferenceDef>,
    #[serde(default)]
    pub access: AccessRules,
}

fn default_backend() -> String {
    DEFAULT_BACKEND.to_string()
}

fn default_id_fields() -> Vec<Path> {
    vec![Path::parse("_id")]
}

impl EntitySchema {
    /// Schema with the default backend, `_id` identity and nothing else
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            status: EntityStatus::Enabled,
            backend: default_backend(),
            id_fields: default_id_fields(),
            indexes: Vec::new(),
            references: Vec::new(),
            access: AccessRules::default(),
        }
    }

    pub fn with_index(mut self, fields: &[&str]) -> Self {
        self.indexes.push(IndexDef {
            name: None,
            fields: fields.iter().map(|f| Path::parse(f)).collect(),
            unique: false,
        });
        self
    }

    pub fn with_reference(mut self, reference: ReferenceDef) -> Self {
        self.references.push(reference);
        self
    }

    pub fn with_status(mut self, status: EntityStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = backend.into();
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.status == EntityStatus::Enabled
    }

    /// True if a lookup on this single field can use an index: the field is
    /// the sole identity field or leads some declared index.
    pub fn is_indexed(&self, field: &Path) -> bool {
        (self.id_fields.len() == 1 && &self.id_fields[0] == field)
            || self.indexes.iter().any(|idx| idx.fields.first() == Some(field))
    }

    pub fn reference(&self, field: &Path) -> Option<&ReferenceDef> {
        self.references.iter().find(|r| &r.field == field)
    }

    /// Checks the parts of a schema serde cannot
    pub fn validate_structure(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("entity name is empty".into());
        }
        if self.version.is_empty() {
            return Err(format!("entity {} has an empty version", self.name));
        }
        if self.id_fields.is_empty() {
            return Err(format!("entity {} declares no identity fields", self.name));
        }
        for idx in &self.indexes {
            if idx.fields.is_empty() {
                return Err(format!("entity {} declares an index without fields", self.name));
            }
        }
        for reference in &self.references {
            if reference.field.is_empty() || reference.field.last() == Some("*") {
                return Err(format!("entity {} has an invalid reference field '{}'", self.name, reference.field));
            }
            if reference.entity.is_empty() {
                return Err(format!("reference {}.{} names no entity", self.name, reference.field));
            }
        }
        Ok(())
    }
}

impl ReferenceDef {
    pub fn new(field: impl Into<Path>, entity: impl Into<String>, query: QueryExpr) -> Self {
        Self {
            field: field.into(),
            entity: entity.into(),
            version: None,
            query,
            sort: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }
}
