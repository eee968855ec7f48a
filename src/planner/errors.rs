//! Planner error types
//!
//! Error codes:
//! - COMPOSITE_UNATTACHABLE_CONJUNCT (FATAL)
//! - COMPOSITE_PLAN_TOO_MANY_EDGES (FATAL)

use thiserror::Error;

/// Result type for planning
pub type PlannerResult<T> = Result<T, PlannerError>;

/// Planning errors. Raised before any sub-query runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlannerError {
    #[error("Cannot attach conjunct {clause} to the query plan: {reason}")]
    UnattachableConjunct { clause: String, reason: String },

    #[error("Plan has {edges} edges, more than the {max} that can be enumerated")]
    TooManyEdges { edges: usize, max: usize },
}

impl PlannerError {
    pub fn unattachable(clause: impl ToString, reason: impl Into<String>) -> Self {
        PlannerError::UnattachableConjunct {
            clause: clause.to_string(),
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            PlannerError::UnattachableConjunct { .. } => "COMPOSITE_UNATTACHABLE_CONJUNCT",
            PlannerError::TooManyEdges { .. } => "COMPOSITE_PLAN_TOO_MANY_EDGES",
        }
    }

    pub fn is_fatal(&self) -> bool {
        true
    }
}
