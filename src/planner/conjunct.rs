//! Conjuncts: the units of a query the planner attaches to the plan
//!
//! The request query is split at its top-level `$and`s. Each resulting
//! clause, together with the entities owning the fields it references, is
//! a conjunct. Reference join queries are conjuncts too.

use std::collections::BTreeSet;

use serde_json::{json, Value};

use super::rewrite::rewrite_query;
use crate::metadata::{CompositeMetadata, EntityId};
use crate::query::{Path, QueryExpr};

/// Where a conjunct comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConjunctSource {
    /// The caller's query
    Request,
    /// The join query of the reference leading to this entity
    Reference(EntityId),
}

/// One clause with the entities it touches
#[derive(Debug, Clone, PartialEq)]
pub struct Conjunct {
    /// Clause with composite field paths
    pub clause: QueryExpr,
    pub entities: BTreeSet<EntityId>,
    pub source: ConjunctSource,
}

impl Conjunct {
    pub fn new(clause: QueryExpr, composite: &CompositeMetadata, source: ConjunctSource) -> Self {
        let entities = clause.fields().iter().map(|f| composite.owner(f)).collect();
        Self {
            clause,
            entities,
            source,
        }
    }

    pub fn fields(&self) -> Vec<Path> {
        self.clause.fields()
    }

    pub fn to_json(&self) -> Value {
        let source = match self.source {
            ConjunctSource::Request => "request".to_string(),
            ConjunctSource::Reference(id) => format!("reference:{}", id),
        };
        json!({"clause": self.clause.to_json(), "source": source})
    }
}

/// Conjuncts of a request query.
///
/// The query is rewritten first (see [`rewrite_query`]), then an
/// `elemMatch` over a reference field is unfolded so its nested clauses
/// become conjuncts over the referenced entity.
pub fn request_conjuncts(query: &QueryExpr, composite: &CompositeMetadata) -> Vec<Conjunct> {
    rewrite_query(query)
        .unfold_elem_match(&|p| composite.is_reference_field(p))
        .conjuncts()
        .into_iter()
        .map(|clause| Conjunct::new(clause, composite, ConjunctSource::Request))
        .collect()
}

/// The join conjunct of every non-root entity in `entities`
pub fn reference_conjuncts(composite: &CompositeMetadata, entities: &BTreeSet<EntityId>) -> Vec<Conjunct> {
    entities
        .iter()
        .filter_map(|&id| {
            let entity = composite.entity(id);
            let join = entity.join_query.as_ref()?;
            Some(
                join.conjuncts()
                    .into_iter()
                    .map(move |clause| Conjunct::new(clause, composite, ConjunctSource::Reference(id))),
            )
        })
        .flatten()
        .collect()
}
