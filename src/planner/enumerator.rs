//! Plan enumerators
//!
//! An enumerator turns a canonical plan into the candidate plans the
//! chooser scores. Candidates differ only in edge directions.

use super::errors::{PlannerError, PlannerResult};
use super::plan::QueryPlan;

/// Largest edge count a bitmask enumeration can represent
const MAX_MASK_EDGES: usize = 63;

/// Produces candidate plans from a canonical plan
pub trait PlanEnumerator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Candidate plans, the canonical plan first
    fn candidates<'a>(&self, base: &'a QueryPlan) -> PlannerResult<Box<dyn Iterator<Item = QueryPlan> + 'a>>;
}

/// Every orientation of every edge: 2^E plans. The last edge flips
/// fastest.
#[derive(Debug, Default, Clone, Copy)]
pub struct BruteForceEnumerator;

impl PlanEnumerator for BruteForceEnumerator {
    fn name(&self) -> &'static str {
        "brute_force"
    }

    fn candidates<'a>(&self, base: &'a QueryPlan) -> PlannerResult<Box<dyn Iterator<Item = QueryPlan> + 'a>> {
        let edges = base.edges().len();
        if edges > MAX_MASK_EDGES {
            return Err(PlannerError::TooManyEdges {
                edges,
                max: MAX_MASK_EDGES,
            });
        }
        Ok(Box::new((0..(1u64 << edges)).map(move |mask| {
            let reversed: Vec<bool> = (0..edges).map(|i| mask & (1 << (edges - 1 - i)) != 0).collect();
            let mut plan = base.clone();
            plan.set_orientation(&reversed);
            plan
        })))
    }
}

/// Only the canonical plan
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstEnumerator;

impl PlanEnumerator for FirstEnumerator {
    fn name(&self) -> &'static str {
        "first"
    }

    fn candidates<'a>(&self, base: &'a QueryPlan) -> PlannerResult<Box<dyn Iterator<Item = QueryPlan> + 'a>> {
        Ok(Box::new(std::iter::once(base.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{CompositeMetadata, ROOT};
    use crate::query::QueryExpr;
    use crate::schema::{EntitySchema, ReferenceDef};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn chain(n: usize) -> QueryPlan {
        let mut cm = CompositeMetadata::new(Arc::new(EntitySchema::new("E0", "1")));
        let mut parent = ROOT;
        for i in 1..n {
            let name = format!("E{}", i);
            parent = cm.add_child(
                parent,
                ReferenceDef::new("r", name.as_str(), QueryExpr::Const(true)),
                Arc::new(EntitySchema::new(name.as_str(), "1")),
            );
        }
        QueryPlan::new(&cm, None)
    }

    #[test]
    fn test_brute_force_yields_every_orientation_once() {
        let base = chain(4);
        let plans: Vec<QueryPlan> = BruteForceEnumerator.candidates(&base).unwrap().collect();
        assert_eq!(plans.len(), 8);
        assert_eq!(plans[0], base);
        assert!(plans[1].edge(2).reversed);
        assert!(!plans[1].edge(0).reversed);
        let distinct: HashSet<Vec<bool>> = plans
            .iter()
            .map(|p| p.edges().iter().map(|e| e.reversed).collect())
            .collect();
        assert_eq!(distinct.len(), 8);
    }

    #[test]
    fn test_single_node_plan() {
        let base = chain(1);
        assert_eq!(BruteForceEnumerator.candidates(&base).unwrap().count(), 1);
        assert_eq!(FirstEnumerator.candidates(&base).unwrap().count(), 1);
    }

    #[test]
    fn test_first_yields_canonical() {
        let base = chain(3);
        let plans: Vec<QueryPlan> = FirstEnumerator.candidates(&base).unwrap().collect();
        assert_eq!(plans, vec![base]);
    }
}
