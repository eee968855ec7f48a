//! Composite metadata resolution
//!
//! Walks reference fields breadth-first from the root entity. A reference
//! is followed only if the query has a field under it or the projection
//! names it (or something under it) explicitly. References without a
//! version wait until another reference pins a version of the same entity;
//! if none does, the store's default version is used. An explicit version
//! found later for an entity that fell back to its default restarts the
//! walk with that version pinned. One entity name may appear at one version
//! only.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::debug;

use super::composite::{CompositeMetadata, EntityId, ROOT};
use super::errors::{MetadataError, MetadataResult};
use crate::query::{Path, Projection, QueryExpr};
use crate::schema::{EntitySchema, MetadataStore, ReferenceDef};

/// Output of metadata resolution
#[derive(Debug, Clone)]
pub struct ResolvedComposite {
    pub metadata: CompositeMetadata,
    /// Every role mentioned by the entity or field access rules of the
    /// resolved entities
    pub roles: BTreeSet<String>,
}

/// Resolves composite metadata against a metadata store
pub struct MetadataResolver<'a> {
    store: &'a dyn MetadataStore,
}

impl<'a> MetadataResolver<'a> {
    pub fn new(store: &'a dyn MetadataStore) -> Self {
        Self { store }
    }

    pub fn resolve(
        &self,
        name: &str,
        version: Option<&str>,
        query: Option<&QueryExpr>,
        projection: Option<&Projection>,
    ) -> MetadataResult<ResolvedComposite> {
        let root = self.fetch(name, version)?;
        let mut forced: HashMap<String, String> = HashMap::new();
        let metadata = loop {
            match self.walk(root.clone(), &forced, query, projection)? {
                Walk::Resolved(metadata) => break metadata,
                Walk::Repin { entity, version } => {
                    debug!(entity = %entity, version = %version, "default version overridden, resolving again");
                    forced.insert(entity, version);
                }
            }
        };

        let roles = collect_roles(&metadata);
        debug!(
            entity = name,
            entities = metadata.len(),
            roles = roles.len(),
            "composite metadata resolved"
        );
        Ok(ResolvedComposite { metadata, roles })
    }

    /// One pass over the reference tree. `forced` holds versions that an
    /// explicit reference demanded after an earlier pass had already picked
    /// a default for that entity.
    fn walk(
        &self,
        root: Arc<EntitySchema>,
        forced: &HashMap<String, String>,
        query: Option<&QueryExpr>,
        projection: Option<&Projection>,
    ) -> MetadataResult<Walk> {
        let mut pins = Pins::default();
        pins.versions.insert(root.name.clone(), root.version.clone());
        for (entity, version) in forced {
            pins.versions.entry(entity.clone()).or_insert_with(|| version.clone());
        }

        let query_fields = query.map(QueryExpr::fields).unwrap_or_default();
        let needed = |field: &Path| {
            query_fields.iter().any(|q| q.matches_prefix(field))
                || projection.map(|p| p.explicitly_includes(field)).unwrap_or(false)
        };

        let mut metadata = CompositeMetadata::new(root);
        let mut queue: VecDeque<EntityId> = VecDeque::from([ROOT]);
        let mut deferred: Vec<(EntityId, ReferenceDef)> = Vec::new();

        loop {
            while let Some(id) = queue.pop_front() {
                let entity = metadata.entity(id);
                let references: Vec<ReferenceDef> = entity
                    .schema
                    .references
                    .iter()
                    .filter(|r| needed(&entity.entity_path.join(&r.field)))
                    .cloned()
                    .collect();
                for reference in references {
                    match reference.version.clone() {
                        Some(version) => {
                            if pins.overrides_default(&reference.entity, &version) {
                                return Ok(Walk::Repin {
                                    entity: reference.entity,
                                    version,
                                });
                            }
                            pins.pin(&reference.entity, &version)?;
                            let schema = self.fetch(&reference.entity, Some(&version))?;
                            queue.push_back(metadata.add_child(id, reference, schema));
                        }
                        None => deferred.push((id, reference)),
                    }
                }
            }

            if deferred.is_empty() {
                break;
            }
            // Prefer a deferred reference whose entity has been pinned since
            let pick = deferred
                .iter()
                .position(|(_, r)| pins.versions.contains_key(&r.entity))
                .unwrap_or(0);
            let (parent, reference) = deferred.remove(pick);
            let version = pins.versions.get(&reference.entity).cloned();
            let schema = self.fetch(&reference.entity, version.as_deref())?;
            if version.is_none() {
                pins.defaulted.insert(schema.name.clone());
            }
            pins.pin(&schema.name, &schema.version)?;
            queue.push_back(metadata.add_child(parent, reference, schema));
        }

        Ok(Walk::Resolved(metadata))
    }

    fn fetch(&self, name: &str, version: Option<&str>) -> MetadataResult<Arc<EntitySchema>> {
        let schema = self
            .store
            .entity(name, version)
            .ok_or_else(|| MetadataError::UnknownEntity {
                name: name.to_string(),
                version: version.map(str::to_string),
            })?;
        if !schema.is_enabled() {
            return Err(MetadataError::DisabledMetadata {
                name: schema.name.clone(),
                version: schema.version.clone(),
            });
        }
        Ok(schema)
    }
}

enum Walk {
    Resolved(CompositeMetadata),
    /// An explicit version met an entity pinned to its default version
    Repin { entity: String, version: String },
}

/// Versions pinned during one walk
#[derive(Default)]
struct Pins {
    versions: HashMap<String, String>,
    /// Entities pinned only because the store's default version was used
    defaulted: HashSet<String>,
}

impl Pins {
    fn overrides_default(&self, name: &str, version: &str) -> bool {
        self.defaulted.contains(name) && self.versions.get(name).is_some_and(|v| v != version)
    }

    fn pin(&mut self, name: &str, version: &str) -> MetadataResult<()> {
        match self.versions.get(name) {
            Some(existing) if existing != version => Err(MetadataError::VersionConflict {
                name: name.to_string(),
                first: existing.clone(),
                second: version.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                self.versions.insert(name.to_string(), version.to_string());
                Ok(())
            }
        }
    }
}

fn collect_roles(metadata: &CompositeMetadata) -> BTreeSet<String> {
    let mut roles = BTreeSet::new();
    for entity in metadata.entities() {
        roles.extend(entity.schema.access.roles().cloned());
    }
    roles
}
