//! Per-invocation result documents
//!
//! Every document a plan node produces becomes a [`ResultDoc`] in the
//! execution arena. Documents point at each other by [`DocRef`]: child
//! documents sit in the reference slots of their entity parent, and every
//! document remembers the plan-parent documents whose values produced it.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::metadata::EntityId;
use crate::planner::NodeId;
use crate::query::path::values_at;
use crate::query::Path;
use crate::schema::EntitySchema;

/// Index of a document in the execution arena
pub type DocRef = usize;

/// Identity of a document: its identity field values
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocId(String);

impl DocId {
    /// Identity of `doc` under `schema`, or `None` when every identity
    /// field is missing or null
    pub fn extract(schema: &EntitySchema, doc: &Value) -> Option<DocId> {
        let values: Vec<Value> = schema
            .id_fields
            .iter()
            .map(|field| {
                values_at(doc, field)
                    .into_iter()
                    .next()
                    .map(|(_, v)| v.clone())
                    .unwrap_or(Value::Null)
            })
            .collect();
        if values.iter().all(Value::is_null) {
            return None;
        }
        Some(DocId(
            values.iter().map(Value::to_string).collect::<Vec<_>>().join("|"),
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One insertion point of a reference inside a parent document
#[derive(Debug, Clone, PartialEq)]
pub struct RefSlot {
    pub child_entity: EntityId,
    /// Concrete path of the object holding the reference field
    pub container: Path,
    /// Concrete path of the reference field itself
    pub field: Path,
    pub children: Vec<DocRef>,
}

/// A document produced by a plan node
#[derive(Debug, Clone)]
pub struct ResultDoc {
    pub id: Option<DocId>,
    pub node: NodeId,
    pub entity: EntityId,
    pub body: Arc<Value>,
    pub slots: Vec<RefSlot>,
    pub plan_parents: Vec<DocRef>,
}

impl ResultDoc {
    pub fn new(id: Option<DocId>, node: NodeId, entity: EntityId, body: Arc<Value>) -> Self {
        Self {
            id,
            node,
            entity,
            body,
            slots: Vec::new(),
            plan_parents: Vec::new(),
        }
    }

    /// Slot indexes for references to `child_entity`
    pub fn slots_for(&self, child_entity: EntityId) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.child_entity == child_entity)
            .map(|(i, _)| i)
            .collect()
    }
}
