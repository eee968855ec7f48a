//! Query planner for composite finds
//!
//! A plan is a tree over the entities a find touches; its edge directions
//! decide which entity is fetched first and whose values get bound into
//! which sub-query.
//!
//! # Design Principles
//!
//! - Deterministic: same metadata and query, same plan
//! - Every conjunct is attached to exactly one node or edge
//! - Scoring is a static heuristic over declared indexes
//!
//! # Plan Preference (indexed-field scorer, strict order)
//!
//! 1. Fewer plan sources without any conjunct
//! 2. Indexed conjuncts closer to the sources
//! 3. Unindexed conjuncts closer to the sources
//! 4. More joins indexed on the searched side
//!
//! Ties go to the first enumerated plan.

mod chooser;
mod conjunct;
mod enumerator;
mod errors;
mod explain;
mod plan;
mod rewrite;
mod scorer;

pub use chooser::{QueryPlanChooser, DEFAULT_MAX_ENUMERATED_EDGES};
pub use conjunct::{reference_conjuncts, request_conjuncts, Conjunct, ConjunctSource};
pub use enumerator::{BruteForceEnumerator, FirstEnumerator, PlanEnumerator};
pub use errors::{PlannerError, PlannerResult};
pub use explain::ExplainPlan;
pub use plan::{EdgeId, NodeId, PlanEdge, PlanNode, QueryPlan};
pub use rewrite::rewrite_query;
pub use scorer::{IndexedFieldScorer, PlanScore, PlanScorer, SimpleScorer};
