//! Plan selection
//!
//! Builds the canonical plan, attaches every conjunct to exactly one node
//! or edge, then scores every candidate the enumerator yields and keeps the
//! best. Ties go to the earliest candidate.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use super::conjunct::{reference_conjuncts, request_conjuncts, Conjunct};
use super::enumerator::PlanEnumerator;
use super::errors::{PlannerError, PlannerResult};
use super::plan::QueryPlan;
use super::scorer::{PlanScore, PlanScorer};
use crate::metadata::{CompositeMetadata, EntityId, ROOT};
use crate::query::QueryExpr;

/// Default cap on the number of edges brute-force enumeration accepts
pub const DEFAULT_MAX_ENUMERATED_EDGES: usize = 12;

/// Chooses a query plan for a composite query
pub struct QueryPlanChooser<'a> {
    composite: &'a CompositeMetadata,
    enumerator: &'a dyn PlanEnumerator,
    scorer: &'a dyn PlanScorer,
    query: Option<&'a QueryExpr>,
    restrict: Option<&'a BTreeSet<EntityId>>,
    max_edges: usize,
}

impl<'a> QueryPlanChooser<'a> {
    pub fn new(
        composite: &'a CompositeMetadata,
        enumerator: &'a dyn PlanEnumerator,
        scorer: &'a dyn PlanScorer,
        query: Option<&'a QueryExpr>,
    ) -> Self {
        Self {
            composite,
            enumerator,
            scorer,
            query,
            restrict: None,
            max_edges: DEFAULT_MAX_ENUMERATED_EDGES,
        }
    }

    /// Plans over a subset of the entities only
    pub fn with_restriction(mut self, entities: &'a BTreeSet<EntityId>) -> Self {
        self.restrict = Some(entities);
        self
    }

    pub fn with_max_edges(mut self, max_edges: usize) -> Self {
        self.max_edges = max_edges;
        self
    }

    pub fn choose(&self) -> PlannerResult<QueryPlan> {
        let mut base = QueryPlan::new(self.composite, self.restrict);
        self.attach_conjuncts(&mut base)?;

        let edges = base.edges().len();
        if edges > self.max_edges {
            warn!(
                edges,
                max = self.max_edges,
                enumerator = self.enumerator.name(),
                "too many edges to enumerate, using the canonical plan"
            );
            return Ok(base);
        }

        let mut best: Option<(PlanScore, QueryPlan)> = None;
        for candidate in self.enumerator.candidates(&base)? {
            let score = self.scorer.score(&candidate, self.composite);
            debug!(plan = %candidate.tree_string(), score = ?score, "scored candidate plan");
            let better = match &best {
                Some((best_score, _)) => score > *best_score,
                None => true,
            };
            if better {
                best = Some((score, candidate));
            }
        }
        let plan = best.map(|(_, plan)| plan).unwrap_or(base);
        debug!(
            plan = %plan.tree_string(),
            enumerator = self.enumerator.name(),
            scorer = self.scorer.name(),
            "query plan chosen"
        );
        Ok(plan)
    }

    /// Attaches request conjuncts and the join conjuncts of every edge
    fn attach_conjuncts(&self, plan: &mut QueryPlan) -> PlannerResult<()> {
        let included: BTreeSet<EntityId> = plan.nodes().iter().map(|n| n.entity).collect();
        let mut conjuncts: Vec<Conjunct> = match self.query {
            Some(q) => request_conjuncts(q, self.composite),
            None => Vec::new(),
        };
        conjuncts.extend(reference_conjuncts(self.composite, &included));

        let mut node_attach = vec![Vec::new(); plan.nodes().len()];
        let mut edge_attach = vec![Vec::new(); plan.edges().len()];

        for (i, conjunct) in conjuncts.iter().enumerate() {
            if let Some(outside) = conjunct.entities.iter().find(|e| !included.contains(e)) {
                return Err(PlannerError::unattachable(
                    &conjunct.clause,
                    format!("entity {} is not part of the plan", self.composite.entity(*outside).name()),
                ));
            }
            let nodes: Vec<usize> = conjunct
                .entities
                .iter()
                .filter_map(|&e| plan.node_for_entity(e))
                .collect();
            match nodes.as_slice() {
                [] => match plan.node_for_entity(ROOT) {
                    Some(root) => node_attach[root].push(i),
                    None => return Err(PlannerError::unattachable(&conjunct.clause, "the plan has no root node")),
                },
                [node] => node_attach[*node].push(i),
                [a, b] => match plan.edge_between(*a, *b) {
                    Some(edge) => edge_attach[edge].push(i),
                    None => {
                        return Err(PlannerError::unattachable(
                            &conjunct.clause,
                            "it relates entities that are not directly linked",
                        ))
                    }
                },
                _ => {
                    return Err(PlannerError::unattachable(
                        &conjunct.clause,
                        "it relates more than two entities",
                    ))
                }
            }
        }

        plan.attach(conjuncts, node_attach, edge_attach);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{BruteForceEnumerator, FirstEnumerator, IndexedFieldScorer, SimpleScorer};
    use crate::schema::{EntitySchema, ReferenceDef};
    use serde_json::json;
    use std::sync::Arc;

    fn q(v: serde_json::Value) -> QueryExpr {
        QueryExpr::from_json(&v).unwrap()
    }

    /// A.b -> B (B._id = A.b_ref), A.c -> C, C.d -> D
    fn composite() -> CompositeMetadata {
        let mut cm = CompositeMetadata::new(Arc::new(EntitySchema::new("A", "1")));
        let b = EntitySchema::new("B", "1").with_index(&["code"]);
        cm.add_child(
            ROOT,
            ReferenceDef::new("b", "B", q(json!({"field": "_id", "op": "=", "rfield": "$parent.b_ref"}))),
            Arc::new(b),
        );
        let c = cm.add_child(
            ROOT,
            ReferenceDef::new("c", "C", q(json!({"field": "_id", "op": "=", "rfield": "$parent.c_ref"}))),
            Arc::new(EntitySchema::new("C", "1")),
        );
        cm.add_child(
            c,
            ReferenceDef::new("d", "D", q(json!({"field": "_id", "op": "=", "rfield": "$parent.d_ref"}))),
            Arc::new(EntitySchema::new("D", "1")),
        );
        cm
    }

    #[test]
    fn test_child_constraint_makes_child_the_source() {
        let cm = composite();
        let query = q(json!({"field": "b.*.field1", "op": "=", "rvalue": "x"}));
        let set = cm.minimal_entity_set(Some(&query));
        let plan = QueryPlanChooser::new(&cm, &BruteForceEnumerator, &IndexedFieldScorer, Some(&query))
            .with_restriction(&set)
            .choose()
            .unwrap();
        assert_eq!(plan.tree_string(), "B_1 -> A_0");
        assert_eq!(plan.node(1).conjuncts.len(), 1);
        assert_eq!(plan.edge(0).conjuncts.len(), 1);
    }

    #[test]
    fn test_indexed_root_constraint_keeps_root_first() {
        let cm = composite();
        let query = q(json!({"$and": [
            {"field": "_id", "op": "=", "rvalue": "A01"},
            {"field": "b.*.field1", "op": "=", "rvalue": "x"}
        ]}));
        let set = cm.minimal_entity_set(Some(&query));
        let plan = QueryPlanChooser::new(&cm, &BruteForceEnumerator, &IndexedFieldScorer, Some(&query))
            .with_restriction(&set)
            .choose()
            .unwrap();
        assert_eq!(plan.tree_string(), "A_0 -> B_1");
    }

    #[test]
    fn test_first_and_simple_keep_canonical() {
        let cm = composite();
        let query = q(json!({"field": "c.*.d.*.x", "op": "=", "rvalue": 1}));
        let plan = QueryPlanChooser::new(&cm, &FirstEnumerator, &SimpleScorer, Some(&query))
            .choose()
            .unwrap();
        assert_eq!(plan.sources(), vec![0]);
        assert_eq!(plan.nodes().len(), 4);
        let d = plan.node_for_entity(3).unwrap();
        assert_eq!(plan.node(d).conjuncts.len(), 1);
    }

    #[test]
    fn test_conjunct_outside_restriction_is_unattachable() {
        let cm = composite();
        let query = q(json!({"field": "b.*.field1", "op": "=", "rvalue": "x"}));
        let set = BTreeSet::from([ROOT]);
        let err = QueryPlanChooser::new(&cm, &BruteForceEnumerator, &IndexedFieldScorer, Some(&query))
            .with_restriction(&set)
            .choose()
            .unwrap_err();
        assert_eq!(err.code(), "COMPOSITE_UNATTACHABLE_CONJUNCT");
    }

    #[test]
    fn test_non_adjacent_conjunct_is_unattachable() {
        let cm = composite();
        let query = q(json!({"field": "b.*.x", "op": "=", "rfield": "c.*.y"}));
        let err = QueryPlanChooser::new(&cm, &BruteForceEnumerator, &IndexedFieldScorer, Some(&query))
            .choose()
            .unwrap_err();
        assert!(matches!(err, PlannerError::UnattachableConjunct { .. }));
    }

    #[test]
    fn test_edge_cap_falls_back_to_canonical() {
        let cm = composite();
        let query = q(json!({"field": "c.*.d.*.x", "op": "=", "rvalue": 1}));
        let plan = QueryPlanChooser::new(&cm, &BruteForceEnumerator, &IndexedFieldScorer, Some(&query))
            .with_max_edges(1)
            .choose()
            .unwrap();
        assert_eq!(plan.sources(), vec![0]);
    }

    #[test]
    fn test_constant_conjunct_goes_to_root() {
        let cm = composite();
        let query = QueryExpr::Const(true);
        let plan = QueryPlanChooser::new(&cm, &FirstEnumerator, &SimpleScorer, Some(&query))
            .choose()
            .unwrap();
        assert_eq!(plan.node(0).conjuncts, vec![0]);
    }
}
