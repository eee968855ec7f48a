//! Query plan graph
//!
//! A plan has one node per included entity and one edge per included
//! entity-parent/entity-child pair, so it is a tree shaped like a sub-tree
//! of the composite entity tree. Edge direction is what the planner decides:
//! an edge `from -> to` means documents of `from` are fetched first and
//! their values bound into the query for `to`. The canonical plan points
//! every edge away from the root.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use serde_json::{json, Value};

use super::conjunct::Conjunct;
use crate::metadata::{CompositeMetadata, EntityId, ROOT};

/// Index of a node in a plan
pub type NodeId = usize;

/// Index of an edge in a plan
pub type EdgeId = usize;

/// Plan node: one entity
#[derive(Debug, Clone, PartialEq)]
pub struct PlanNode {
    pub id: NodeId,
    pub entity: EntityId,
    /// Conjuncts attached to this node (indexes into the plan conjuncts)
    pub conjuncts: Vec<usize>,
    name: String,
}

impl PlanNode {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Plan edge between an entity parent and its entity child
#[derive(Debug, Clone, PartialEq)]
pub struct PlanEdge {
    pub id: EdgeId,
    /// Node of the entity parent
    pub parent: NodeId,
    /// Node of the entity child
    pub child: NodeId,
    /// True when the edge points from the child to the parent
    pub reversed: bool,
    /// Conjuncts attached to this edge (indexes into the plan conjuncts)
    pub conjuncts: Vec<usize>,
}

impl PlanEdge {
    /// Node evaluated first
    pub fn from(&self) -> NodeId {
        if self.reversed {
            self.child
        } else {
            self.parent
        }
    }

    /// Node evaluated second
    pub fn to(&self) -> NodeId {
        if self.reversed {
            self.parent
        } else {
            self.child
        }
    }
}

/// A query plan
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    nodes: Vec<PlanNode>,
    edges: Vec<PlanEdge>,
    conjuncts: Arc<Vec<Conjunct>>,
}

impl QueryPlan {
    /// Canonical plan over the entities in `restrict` (all entities when
    /// `None`). Entities whose parent is excluded are excluded as well.
    pub fn new(composite: &CompositeMetadata, restrict: Option<&BTreeSet<EntityId>>) -> Self {
        let mut plan = QueryPlan {
            nodes: Vec::new(),
            edges: Vec::new(),
            conjuncts: Arc::new(Vec::new()),
        };
        let included = |id: EntityId| restrict.map(|r| r.contains(&id)).unwrap_or(true);
        if !included(ROOT) {
            return plan;
        }

        // Depth-first pre-order, children in declaration order
        let mut stack: Vec<(EntityId, Option<NodeId>)> = vec![(ROOT, None)];
        while let Some((entity, parent_node)) = stack.pop() {
            let id = plan.nodes.len();
            plan.nodes.push(PlanNode {
                id,
                entity,
                conjuncts: Vec::new(),
                name: format!("{}_{}", composite.entity(entity).name(), id),
            });
            if let Some(parent) = parent_node {
                let edge = plan.edges.len();
                plan.edges.push(PlanEdge {
                    id: edge,
                    parent,
                    child: id,
                    reversed: false,
                    conjuncts: Vec::new(),
                });
            }
            for &child in composite.entity(entity).children.iter().rev() {
                if included(child) {
                    stack.push((child, Some(id)));
                }
            }
        }
        plan
    }

    pub fn nodes(&self) -> &[PlanNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[PlanEdge] {
        &self.edges
    }

    pub fn node(&self, id: NodeId) -> &PlanNode {
        &self.nodes[id]
    }

    pub fn edge(&self, id: EdgeId) -> &PlanEdge {
        &self.edges[id]
    }

    pub fn conjuncts(&self) -> &[Conjunct] {
        &self.conjuncts
    }

    pub fn node_for_entity(&self, entity: EntityId) -> Option<NodeId> {
        self.nodes.iter().find(|n| n.entity == entity).map(|n| n.id)
    }

    /// Edge joining two nodes, in either direction
    pub fn edge_between(&self, a: NodeId, b: NodeId) -> Option<EdgeId> {
        self.edges
            .iter()
            .find(|e| (e.parent == a && e.child == b) || (e.parent == b && e.child == a))
            .map(|e| e.id)
    }

    /// Nodes with no incoming edge
    pub fn sources(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .map(|n| n.id)
            .filter(|&n| !self.edges.iter().any(|e| e.to() == n))
            .collect()
    }

    /// Edges pointing into `node`, in edge order
    pub fn incoming(&self, node: NodeId) -> Vec<&PlanEdge> {
        self.edges.iter().filter(|e| e.to() == node).collect()
    }

    /// Nodes with an edge into `node`
    pub fn sources_of(&self, node: NodeId) -> Vec<NodeId> {
        self.incoming(node).iter().map(|e| e.from()).collect()
    }

    /// Nodes `node` has an edge into
    pub fn destinations_of(&self, node: NodeId) -> Vec<NodeId> {
        self.edges.iter().filter(|e| e.from() == node).map(|e| e.to()).collect()
    }

    pub fn flip(&mut self, edge: EdgeId) {
        self.edges[edge].reversed = !self.edges[edge].reversed;
    }

    /// Sets every edge direction; `reversed[i]` applies to edge `i`
    pub fn set_orientation(&mut self, reversed: &[bool]) {
        for (edge, &r) in self.edges.iter_mut().zip(reversed) {
            edge.reversed = r;
        }
    }

    /// Attaches conjuncts: `node_attach[n]` / `edge_attach[e]` list the
    /// conjunct indexes for node `n` / edge `e`
    pub fn attach(&mut self, conjuncts: Vec<Conjunct>, node_attach: Vec<Vec<usize>>, edge_attach: Vec<Vec<usize>>) {
        for (node, attached) in self.nodes.iter_mut().zip(node_attach) {
            node.conjuncts = attached;
        }
        for (edge, attached) in self.edges.iter_mut().zip(edge_attach) {
            edge.conjuncts = attached;
        }
        self.conjuncts = Arc::new(conjuncts);
    }

    /// Every node after all of its sources. Among nodes that are ready at
    /// the same time, lower node ids come first.
    pub fn breadth_first_order(&self) -> Vec<NodeId> {
        let mut pending: Vec<usize> = self.nodes.iter().map(|n| self.incoming(n.id).len()).collect();
        let mut ready: VecDeque<NodeId> = self.sources().into_iter().collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(node) = ready.pop_front() {
            order.push(node);
            let mut next = self.destinations_of(node);
            next.sort_unstable();
            for dest in next {
                pending[dest] -= 1;
                if pending[dest] == 0 {
                    ready.push_back(dest);
                }
            }
        }
        order
    }

    /// One line per edge (`A_0 -> B_1`), or the lone node name
    pub fn tree_string(&self) -> String {
        if self.edges.is_empty() {
            return self.nodes.first().map(|n| n.name.clone()).unwrap_or_default();
        }
        self.edges
            .iter()
            .map(|e| format!("{} -> {}", self.nodes[e.from()].name, self.nodes[e.to()].name))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn to_json(&self) -> Value {
        let conjuncts = |ids: &[usize]| -> Vec<Value> { ids.iter().map(|&i| self.conjuncts[i].clause.to_json()).collect() };
        json!({
            "sources": self.sources().iter().map(|&n| self.nodes[n].name.clone()).collect::<Vec<_>>(),
            "order": self.breadth_first_order().iter().map(|&n| self.nodes[n].name.clone()).collect::<Vec<_>>(),
            "nodes": self.nodes.iter().map(|n| json!({
                "name": n.name,
                "conjuncts": conjuncts(&n.conjuncts),
            })).collect::<Vec<_>>(),
            "edges": self.edges.iter().map(|e| json!({
                "from": self.nodes[e.from()].name,
                "to": self.nodes[e.to()].name,
                "conjuncts": conjuncts(&e.conjuncts),
            })).collect::<Vec<_>>(),
        })
    }
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tree_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryExpr;
    use crate::schema::{EntitySchema, ReferenceDef};

    /// A -> {B -> D, C}
    fn composite() -> CompositeMetadata {
        let schema = |n: &str| Arc::new(EntitySchema::new(n, "1"));
        let mut cm = CompositeMetadata::new(schema("A"));
        let b = cm.add_child(ROOT, ReferenceDef::new("b", "B", QueryExpr::Const(true)), schema("B"));
        cm.add_child(ROOT, ReferenceDef::new("c", "C", QueryExpr::Const(true)), schema("C"));
        cm.add_child(b, ReferenceDef::new("d", "D", QueryExpr::Const(true)), schema("D"));
        cm
    }

    #[test]
    fn test_canonical_plan() {
        let plan = QueryPlan::new(&composite(), None);
        let names: Vec<&str> = plan.nodes().iter().map(|n| n.name()).collect();
        assert_eq!(names, vec!["A_0", "B_1", "D_2", "C_3"]);
        assert_eq!(plan.sources(), vec![0]);
        assert_eq!(plan.breadth_first_order(), vec![0, 1, 3, 2]);
        assert_eq!(plan.tree_string(), "A_0 -> B_1\nB_1 -> D_2\nA_0 -> C_3");
    }

    #[test]
    fn test_restricted_plan() {
        let cm = composite();
        let plan = QueryPlan::new(&cm, Some(&BTreeSet::from([ROOT, 1])));
        assert_eq!(plan.nodes().len(), 2);
        assert_eq!(plan.edges().len(), 1);
        assert_eq!(plan.node_for_entity(3), None);
    }

    #[test]
    fn test_flip_changes_sources_and_order() {
        let mut plan = QueryPlan::new(&composite(), None);
        // D -> B, B -> A, A -> C
        plan.flip(0);
        plan.flip(1);
        assert_eq!(plan.sources(), vec![2]);
        assert_eq!(plan.sources_of(0), vec![1]);
        assert_eq!(plan.destinations_of(0), vec![3]);
        assert_eq!(plan.breadth_first_order(), vec![2, 1, 0, 3]);
    }

    #[test]
    fn test_multiple_sources() {
        let mut plan = QueryPlan::new(&composite(), None);
        // B -> A <- C, B -> D
        plan.set_orientation(&[true, false, true]);
        assert_eq!(plan.sources(), vec![1, 3]);
        assert_eq!(plan.sources_of(0), vec![1, 3]);
        let order = plan.breadth_first_order();
        assert_eq!(order, vec![1, 3, 2, 0]);
        assert_eq!(plan.to_json()["sources"], json!(["B_1", "C_3"]));
    }
}
