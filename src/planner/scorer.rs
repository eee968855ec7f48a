//! Plan scorers
//!
//! A scorer maps a candidate plan to a [`PlanScore`]; the chooser keeps the
//! greatest. The indexed-field scorer is a static heuristic over the entity
//! schemas, not a cost model.

use std::cmp::Ordering;
use std::collections::VecDeque;

use super::plan::{NodeId, QueryPlan};
use crate::metadata::CompositeMetadata;

/// Score of a candidate plan. Greater is better.
///
/// Compared in field order: fewer unconstrained sources, then indexed node
/// conjuncts closer to the sources, then unindexed node conjuncts closer to
/// the sources, then more edges whose join is indexed on the side being
/// searched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanScore {
    /// Sources without any conjunct: full scans
    pub unconstrained_sources: usize,
    /// Distance from the nearest source of each node conjunct on an
    /// indexed field, ascending
    pub indexed_distances: Vec<usize>,
    /// Same for every other node conjunct
    pub unindexed_distances: Vec<usize>,
    /// Edges whose destination join field is indexed
    pub indexed_joins: usize,
}

impl Ord for PlanScore {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .unconstrained_sources
            .cmp(&self.unconstrained_sources)
            .then_with(|| compare_distances(&self.indexed_distances, &other.indexed_distances))
            .then_with(|| compare_distances(&self.unindexed_distances, &other.unindexed_distances))
            .then_with(|| self.indexed_joins.cmp(&other.indexed_joins))
    }
}

impl PartialOrd for PlanScore {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Smaller distances are better. When one list is a prefix of the other,
/// the longer list wins: more conjuncts are evaluated early.
fn compare_distances(a: &[usize], b: &[usize]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        match y.cmp(x) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

/// Scores candidate plans
pub trait PlanScorer: Send + Sync {
    fn name(&self) -> &'static str;

    fn score(&self, plan: &QueryPlan, composite: &CompositeMetadata) -> PlanScore;
}

/// Constant score: the first candidate wins
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleScorer;

impl PlanScorer for SimpleScorer {
    fn name(&self) -> &'static str {
        "simple"
    }

    fn score(&self, _plan: &QueryPlan, _composite: &CompositeMetadata) -> PlanScore {
        PlanScore::default()
    }
}

/// Prefers plans that start from constrained, indexed entities
#[derive(Debug, Default, Clone, Copy)]
pub struct IndexedFieldScorer;

impl IndexedFieldScorer {
    /// True if the conjunct names a single field that the node's entity
    /// indexes
    fn indexed_conjunct(plan: &QueryPlan, composite: &CompositeMetadata, node: NodeId, conjunct: usize) -> bool {
        let entity = plan.node(node).entity;
        let fields = plan.conjuncts()[conjunct].fields();
        match fields.as_slice() {
            [field] => composite
                .entity(entity)
                .schema
                .is_indexed(&composite.to_relative(entity, field)),
            _ => false,
        }
    }
}

impl PlanScorer for IndexedFieldScorer {
    fn name(&self) -> &'static str {
        "indexed_field"
    }

    fn score(&self, plan: &QueryPlan, composite: &CompositeMetadata) -> PlanScore {
        let distances = distances_from_sources(plan);
        let mut score = PlanScore::default();

        for source in plan.sources() {
            if plan.node(source).conjuncts.is_empty() {
                score.unconstrained_sources += 1;
            }
        }

        for node in plan.nodes() {
            for &c in &node.conjuncts {
                if Self::indexed_conjunct(plan, composite, node.id, c) {
                    score.indexed_distances.push(distances[node.id]);
                } else {
                    score.unindexed_distances.push(distances[node.id]);
                }
            }
        }
        score.indexed_distances.sort_unstable();
        score.unindexed_distances.sort_unstable();

        for edge in plan.edges() {
            let dest = plan.node(edge.to());
            let schema = &composite.entity(dest.entity).schema;
            let indexed = edge.conjuncts.iter().any(|&c| {
                plan.conjuncts()[c].fields().iter().any(|f| {
                    composite.owner(f) == dest.entity && schema.is_indexed(&composite.to_relative(dest.entity, f))
                })
            });
            if indexed {
                score.indexed_joins += 1;
            }
        }
        score
    }
}

/// Hops from the nearest plan source, following edge directions
fn distances_from_sources(plan: &QueryPlan) -> Vec<usize> {
    let mut distances = vec![usize::MAX; plan.nodes().len()];
    let mut queue = VecDeque::new();
    for source in plan.sources() {
        distances[source] = 0;
        queue.push_back(source);
    }
    while let Some(node) = queue.pop_front() {
        for dest in plan.destinations_of(node) {
            if distances[dest] == usize::MAX {
                distances[dest] = distances[node] + 1;
                queue.push_back(dest);
            }
        }
    }
    distances
}
