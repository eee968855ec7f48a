//! Bound queries
//!
//! The query a plan node sends to its backend is built once per node from
//! the conjuncts attached to the node and to its incoming edges. Clauses
//! over the node's own entity become entity-relative. Clauses that read a
//! field of a source entity get a placeholder instead; for every tuple of
//! source documents the placeholders are filled with the values found in
//! those documents.

use serde_json::Value;

use crate::metadata::{CompositeMetadata, EntityId};
use crate::planner::NodeId;
use crate::query::path::leaf_values;
use crate::query::{CmpOp, ContainsOp, Path, QueryExpr};

/// A source-document field feeding a placeholder
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub source: NodeId,
    /// Field path relative to the source document
    pub field: Path,
}

/// One source document of a tuple
#[derive(Debug, Clone, Copy)]
pub struct SourceDoc<'a> {
    pub node: NodeId,
    pub body: &'a Value,
    /// Concrete container of the reference slot, for entity-parent sources
    pub container: Option<&'a Path>,
}

#[derive(Debug, Clone, PartialEq)]
enum Template {
    Fixed(QueryExpr),
    /// `field op <bound value>`
    Compare { field: Path, op: CmpOp, binding: usize },
    /// `field` in (or not in) the bound values
    CompareIn { field: Path, binding: usize, negate: bool },
    /// The array at `array` contains any (or none) of the bound values
    ContainsBound { array: Path, binding: usize, negate: bool },
    /// Clause over the source document only, decided per tuple
    Eval { source: NodeId, clause: QueryExpr },
    And(Vec<Template>),
    Or(Vec<Template>),
    Not(Box<Template>),
}

/// Query template of one plan node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundQuery {
    templates: Vec<Template>,
    bindings: Vec<Binding>,
}

impl BoundQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Adds a clause over the node's own entity
    pub fn add_local(&mut self, clause: &QueryExpr, composite: &CompositeMetadata, local: EntityId) {
        self.templates
            .push(Template::Fixed(clause.map_fields(&|p| composite.to_relative(local, p))));
    }

    /// Adds a clause relating the node's entity to a source node's entity
    pub fn add_bound(
        &mut self,
        clause: &QueryExpr,
        composite: &CompositeMetadata,
        local: EntityId,
        source: NodeId,
        source_entity: EntityId,
    ) {
        let sides = Sides {
            composite,
            local,
            source,
            source_entity,
        };
        let template = self.template(clause, &sides);
        self.templates.push(template);
    }

    fn bind(&mut self, source: NodeId, field: Path) -> usize {
        if let Some(i) = self
            .bindings
            .iter()
            .position(|b| b.source == source && b.field == field)
        {
            return i;
        }
        self.bindings.push(Binding { source, field });
        self.bindings.len() - 1
    }

    fn template(&mut self, clause: &QueryExpr, sides: &Sides<'_>) -> Template {
        match clause {
            QueryExpr::And(items) => Template::And(items.iter().map(|c| self.template(c, sides)).collect()),
            QueryExpr::Or(items) => Template::Or(items.iter().map(|c| self.template(c, sides)).collect()),
            QueryExpr::Not(inner) => Template::Not(Box::new(self.template(inner, sides))),
            QueryExpr::Field { field, op, rfield } => match (sides.is_local(field), sides.is_local(rfield)) {
                (true, false) => Template::Compare {
                    field: sides.local_path(field),
                    op: *op,
                    binding: self.bind(sides.source, sides.source_path(rfield)),
                },
                (false, true) => Template::Compare {
                    field: sides.local_path(rfield),
                    op: op.swapped(),
                    binding: self.bind(sides.source, sides.source_path(field)),
                },
                _ => self.whole(clause, sides),
            },
            QueryExpr::FieldIn { field, rfield, negate } => match (sides.is_local(field), sides.is_local(rfield)) {
                (true, false) => Template::CompareIn {
                    field: sides.local_path(field),
                    binding: self.bind(sides.source, sides.source_path(rfield)),
                    negate: *negate,
                },
                (false, true) => Template::ContainsBound {
                    array: sides.local_path(rfield),
                    binding: self.bind(sides.source, sides.source_path(field)),
                    negate: *negate,
                },
                _ => self.whole(clause, sides),
            },
            _ => self.whole(clause, sides),
        }
    }

    /// A clause entirely on one side
    fn whole(&mut self, clause: &QueryExpr, sides: &Sides<'_>) -> Template {
        if clause.fields().iter().all(|f| sides.is_local(f)) {
            Template::Fixed(clause.map_fields(&|p| sides.local_path(p)))
        } else {
            Template::Eval {
                source: sides.source,
                clause: clause.map_fields(&|p| sides.source_path(p)),
            }
        }
    }

    /// The query for one tuple of source documents; `None` when the node
    /// has no clause at all
    pub fn instantiate(&self, sources: &[SourceDoc<'_>]) -> Option<QueryExpr> {
        let clauses = self
            .templates
            .iter()
            .map(|t| self.fill(t, sources))
            .collect();
        QueryExpr::and_all(clauses)
    }

    fn fill(&self, template: &Template, sources: &[SourceDoc<'_>]) -> QueryExpr {
        match template {
            Template::Fixed(q) => q.clone(),
            Template::Compare { field, op, binding } => {
                let mut values = self.values(*binding, sources);
                match (values.len(), op) {
                    (0, _) => QueryExpr::Const(*op == CmpOp::Ne),
                    (1, _) => QueryExpr::Value {
                        field: field.clone(),
                        op: *op,
                        value: values.remove(0),
                    },
                    (_, CmpOp::Eq) => QueryExpr::In {
                        field: field.clone(),
                        values,
                        negate: false,
                    },
                    (_, CmpOp::Ne) => QueryExpr::In {
                        field: field.clone(),
                        values,
                        negate: true,
                    },
                    _ => QueryExpr::Or(
                        values
                            .into_iter()
                            .map(|value| QueryExpr::Value {
                                field: field.clone(),
                                op: *op,
                                value,
                            })
                            .collect(),
                    ),
                }
            }
            Template::CompareIn { field, binding, negate } => QueryExpr::In {
                field: field.clone(),
                values: self.values(*binding, sources),
                negate: *negate,
            },
            Template::ContainsBound { array, binding, negate } => QueryExpr::Contains {
                array: array.clone(),
                op: if *negate { ContainsOp::None } else { ContainsOp::Any },
                values: self.values(*binding, sources),
            },
            Template::Eval { source, clause } => match sources.iter().find(|s| s.node == *source) {
                Some(doc) => QueryExpr::Const(clause.map_fields(&|p| pin(p, doc.container)).evaluate(doc.body)),
                None => QueryExpr::Const(false),
            },
            Template::And(items) => QueryExpr::And(items.iter().map(|t| self.fill(t, sources)).collect()),
            Template::Or(items) => QueryExpr::Or(items.iter().map(|t| self.fill(t, sources)).collect()),
            Template::Not(inner) => QueryExpr::Not(Box::new(self.fill(inner, sources))),
        }
    }

    fn values(&self, binding: usize, sources: &[SourceDoc<'_>]) -> Vec<Value> {
        let binding = &self.bindings[binding];
        match sources.iter().find(|s| s.node == binding.source) {
            Some(doc) => leaf_values(doc.body, &pin(&binding.field, doc.container)),
            None => vec![Value::Null],
        }
    }
}

/// Pins the wildcards of `path` that lead to the slot container
fn pin(path: &Path, container: Option<&Path>) -> Path {
    match container {
        Some(c) if !c.is_empty() && path.matches_prefix(c) => path.with_prefix(c),
        _ => path.clone(),
    }
}

struct Sides<'a> {
    composite: &'a CompositeMetadata,
    local: EntityId,
    source: NodeId,
    source_entity: EntityId,
}

impl Sides<'_> {
    fn is_local(&self, path: &Path) -> bool {
        self.composite.owner(path) == self.local
    }

    fn local_path(&self, path: &Path) -> Path {
        self.composite.to_relative(self.local, path)
    }

    fn source_path(&self, path: &Path) -> Path {
        self.composite.to_relative(self.source_entity, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ROOT;
    use crate::schema::{EntitySchema, ReferenceDef};
    use serde_json::json;
    use std::sync::Arc;

    fn q(v: Value) -> QueryExpr {
        QueryExpr::from_json(&v).unwrap()
    }

    /// A.b -> B with B._id = A.b_ref; B.arr.*.c -> C with C._id = $parent.c_ref
    fn composite() -> CompositeMetadata {
        let mut cm = CompositeMetadata::new(Arc::new(EntitySchema::new("A", "1")));
        let b = cm.add_child(
            ROOT,
            ReferenceDef::new("b", "B", q(json!({"field": "_id", "op": "=", "rfield": "$parent.b_ref"}))),
            Arc::new(EntitySchema::new("B", "1")),
        );
        cm.add_child(
            b,
            ReferenceDef::new("arr.*.c", "C", q(json!({"field": "_id", "op": "=", "rfield": "$parent.c_ref"}))),
            Arc::new(EntitySchema::new("C", "1")),
        );
        cm
    }

    #[test]
    fn test_parent_to_child_binding() {
        let cm = composite();
        let join = cm.entity(1).join_query.clone().unwrap();
        let mut bound = BoundQuery::new();
        bound.add_bound(&join, &cm, 1, 0, ROOT);
        assert_eq!(bound.bindings(), &[Binding { source: 0, field: "b_ref".into() }]);

        let parent = json!({"_id": "A01", "b_ref": ["B01", "B02"]});
        let query = bound.instantiate(&[SourceDoc { node: 0, body: &parent, container: None }]);
        assert_eq!(query, Some(QueryExpr::in_values("_id", vec![json!("B01"), json!("B02")])));

        let single = json!({"_id": "A02", "b_ref": "B03"});
        let query = bound.instantiate(&[SourceDoc { node: 0, body: &single, container: None }]);
        assert_eq!(query, Some(QueryExpr::eq("_id", json!("B03"))));
    }

    #[test]
    fn test_child_to_parent_binding() {
        let cm = composite();
        let join = cm.entity(1).join_query.clone().unwrap();
        let mut bound = BoundQuery::new();
        bound.add_local(&QueryExpr::eq("name", json!("x")), &cm, ROOT);
        bound.add_bound(&join, &cm, ROOT, 1, 1);

        let child = json!({"_id": "B01"});
        let query = bound.instantiate(&[SourceDoc { node: 1, body: &child, container: None }]);
        assert_eq!(
            query,
            Some(QueryExpr::And(vec![
                QueryExpr::eq("name", json!("x")),
                QueryExpr::eq("b_ref", json!("B01")),
            ]))
        );
    }

    #[test]
    fn test_slot_container_pins_wildcards() {
        let cm = composite();
        let join = cm.entity(2).join_query.clone().unwrap();
        let mut bound = BoundQuery::new();
        bound.add_bound(&join, &cm, 2, 1, 1);
        assert_eq!(bound.bindings()[0].field, Path::parse("arr.*.c_ref"));

        let parent = json!({"_id": "B01", "arr": [{"c_ref": "C01"}, {"c_ref": "C02"}]});
        let container = Path::parse("arr.1");
        let query = bound.instantiate(&[SourceDoc {
            node: 1,
            body: &parent,
            container: Some(&container),
        }]);
        assert_eq!(query, Some(QueryExpr::eq("_id", json!("C02"))));
    }

    #[test]
    fn test_source_only_clause_is_decided_per_tuple() {
        let cm = composite();
        let clause = q(json!({"$or": [
            {"field": "_id", "op": "=", "rvalue": "A01"},
            {"field": "b.*.x", "op": "=", "rvalue": 1}
        ]}));
        let mut bound = BoundQuery::new();
        bound.add_bound(&clause, &cm, 1, 0, ROOT);

        let a01 = json!({"_id": "A01"});
        let query = bound.instantiate(&[SourceDoc { node: 0, body: &a01, container: None }]).unwrap();
        assert_eq!(
            query,
            QueryExpr::Or(vec![QueryExpr::Const(true), QueryExpr::eq("x", json!(1))])
        );
        assert!(query.evaluate(&json!({"x": 5})));

        let a02 = json!({"_id": "A02"});
        let query = bound.instantiate(&[SourceDoc { node: 0, body: &a02, container: None }]).unwrap();
        assert!(!query.evaluate(&json!({"x": 5})));
        assert!(query.evaluate(&json!({"x": 1})));
    }

    #[test]
    fn test_empty_bound_array_and_range_ops() {
        let cm = composite();
        let mut bound = BoundQuery::new();
        bound.add_bound(&q(json!({"field": "b.*.n", "op": "<", "rfield": "limits"})), &cm, 1, 0, ROOT);

        let none = json!({"limits": []});
        let query = bound.instantiate(&[SourceDoc { node: 0, body: &none, container: None }]);
        assert_eq!(query, Some(QueryExpr::Const(false)));

        let two = json!({"limits": [3, 7]});
        let query = bound.instantiate(&[SourceDoc { node: 0, body: &two, container: None }]).unwrap();
        assert!(query.evaluate(&json!({"n": 5})));
        assert!(!query.evaluate(&json!({"n": 9})));
    }

    #[test]
    fn test_no_clauses() {
        assert_eq!(BoundQuery::new().instantiate(&[]), None);
        assert!(BoundQuery::new().is_empty());
    }
}
