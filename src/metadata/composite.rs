//! Composite entity tree
//!
//! Entities live in an arena indexed by [`EntityId`]; the root is always
//! entity 0. Every non-root entity is reached from its parent through one
//! reference field, and its documents sit at `<reference field>.*` in the
//! composite document.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::query::path::{is_index, ANY};
use crate::query::{Path, QueryExpr};
use crate::schema::{EntitySchema, ReferenceDef};

/// Index of an entity in a [`CompositeMetadata`]
pub type EntityId = usize;

/// The root entity
pub const ROOT: EntityId = 0;

/// One entity of the composite tree
#[derive(Debug, Clone)]
pub struct CompositeEntity {
    pub id: EntityId,
    pub schema: Arc<EntitySchema>,
    pub parent: Option<EntityId>,
    /// The reference in the parent that leads here
    pub reference: Option<ReferenceDef>,
    /// Composite path of that reference field, empty for the root
    pub reference_field: Path,
    /// Composite path of this entity's documents, empty for the root
    pub entity_path: Path,
    pub children: Vec<EntityId>,
    /// The reference query with composite paths
    pub join_query: Option<QueryExpr>,
}

impl CompositeEntity {
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Resolved tree of entities reachable from a root entity
#[derive(Debug, Clone)]
pub struct CompositeMetadata {
    entities: Vec<CompositeEntity>,
}

impl CompositeMetadata {
    pub fn new(root: Arc<EntitySchema>) -> Self {
        Self {
            entities: vec![CompositeEntity {
                id: ROOT,
                schema: root,
                parent: None,
                reference: None,
                reference_field: Path::empty(),
                entity_path: Path::empty(),
                children: Vec::new(),
                join_query: None,
            }],
        }
    }

    /// Attaches `schema` under `parent` through `reference`
    pub fn add_child(&mut self, parent: EntityId, reference: ReferenceDef, schema: Arc<EntitySchema>) -> EntityId {
        let id = self.entities.len();
        let reference_field = self.entities[parent].entity_path.join(&reference.field);
        let entity_path = reference_field.push(ANY);
        let container = reference_field.parent();
        let join_query = reference.query.map_fields(&|p| {
            if p.is_parent_relative() {
                parent_relative(&container, p)
            } else {
                entity_path.join(p)
            }
        });
        self.entities.push(CompositeEntity {
            id,
            schema,
            parent: Some(parent),
            reference: Some(reference),
            reference_field,
            entity_path,
            children: Vec::new(),
            join_query: Some(join_query),
        });
        self.entities[parent].children.push(id);
        id
    }

    pub fn root(&self) -> &CompositeEntity {
        &self.entities[ROOT]
    }

    pub fn entity(&self, id: EntityId) -> &CompositeEntity {
        &self.entities[id]
    }

    pub fn entities(&self) -> &[CompositeEntity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Proper ancestors, nearest first
    pub fn ancestors(&self, id: EntityId) -> Vec<EntityId> {
        let mut out = Vec::new();
        let mut current = self.entities[id].parent;
        while let Some(p) = current {
            out.push(p);
            current = self.entities[p].parent;
        }
        out
    }

    /// True if one entity is the parent of the other
    pub fn adjacent(&self, a: EntityId, b: EntityId) -> bool {
        self.entities[a].parent == Some(b) || self.entities[b].parent == Some(a)
    }

    /// Entity owning a composite field path: the deepest entity whose
    /// document path is a prefix of it
    pub fn owner(&self, path: &Path) -> EntityId {
        let mut current = ROOT;
        'descend: loop {
            for &child in &self.entities[current].children {
                let entity_path = &self.entities[child].entity_path;
                if path.matches_prefix(entity_path) {
                    current = child;
                    continue 'descend;
                }
            }
            return current;
        }
    }

    /// A composite path relative to an entity's document
    pub fn to_relative(&self, id: EntityId, path: &Path) -> Path {
        path.tail(self.entities[id].entity_path.len())
    }

    /// An entity-relative path as a composite path
    pub fn to_absolute(&self, id: EntityId, relative: &Path) -> Path {
        self.entities[id].entity_path.join(relative)
    }

    /// True if `path` is the reference field of some child entity
    pub fn is_reference_field(&self, path: &Path) -> bool {
        self.entities.iter().skip(1).any(|e| path.matches(&e.reference_field))
    }

    /// Smallest connected set of entities containing the root and every
    /// entity owning a field of the query
    pub fn minimal_entity_set(&self, query: Option<&QueryExpr>) -> BTreeSet<EntityId> {
        let mut set = BTreeSet::from([ROOT]);
        for field in query.map(QueryExpr::fields).unwrap_or_default() {
            let owner = self.owner(&field);
            set.insert(owner);
            set.extend(self.ancestors(owner));
        }
        set
    }
}

/// Resolves `$parent` segments against the object holding a reference
/// field. The first `$parent` is that object; each further one climbs out
/// of the enclosing field (and the array it sits in).
fn parent_relative(container: &Path, path: &Path) -> Path {
    let mut base = container.clone();
    let mut rest = path.segments();
    let mut first = true;
    while let Some((segment, tail)) = rest.split_first() {
        if segment != crate::query::path::PARENT {
            break;
        }
        if !first {
            while base.last().map(|s| s == ANY || is_index(s)).unwrap_or(false) {
                base = base.parent();
            }
            base = base.parent();
        }
        first = false;
        rest = tail;
    }
    base.join(&Path::from_segments(rest.iter().cloned()))
}
