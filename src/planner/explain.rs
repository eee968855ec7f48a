//! Explain plan output
//!
//! Produces deterministic, human-readable explain output for a chosen plan.

use std::fmt;

use serde_json::{json, Value};

use super::plan::QueryPlan;

/// Explain plan output
#[derive(Debug, Clone, PartialEq)]
pub struct ExplainPlan {
    /// Which phase the plan served (`search` or `retrieval`)
    pub phase: String,
    /// One line per edge
    pub tree: String,
    /// Nodes executed without bindings
    pub sources: Vec<String>,
    /// Execution order
    pub order: Vec<String>,
    /// Attached conjuncts, prefixed by node or edge
    pub conjuncts: Vec<String>,
}

impl ExplainPlan {
    pub fn from_plan(phase: &str, plan: &QueryPlan) -> Self {
        let name = |n: usize| plan.node(n).name().to_string();
        let mut conjuncts = Vec::new();
        for node in plan.nodes() {
            for &c in &node.conjuncts {
                conjuncts.push(format!("{}: {}", node.name(), plan.conjuncts()[c].clause));
            }
        }
        for edge in plan.edges() {
            for &c in &edge.conjuncts {
                conjuncts.push(format!(
                    "{} -> {}: {}",
                    name(edge.from()),
                    name(edge.to()),
                    plan.conjuncts()[c].clause
                ));
            }
        }

        Self {
            phase: phase.to_string(),
            tree: plan.tree_string(),
            sources: plan.sources().into_iter().map(name).collect(),
            order: plan.breadth_first_order().into_iter().map(name).collect(),
            conjuncts,
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "phase": self.phase,
            "tree": self.tree,
            "sources": self.sources,
            "order": self.order,
            "conjuncts": self.conjuncts,
        })
    }
}

impl fmt::Display for ExplainPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== EXPLAIN PLAN ({}) ===", self.phase)?;
        writeln!(f, "Sources: {}", self.sources.join(", "))?;
        writeln!(f, "Order: {}", self.order.join(", "))?;
        writeln!(f, "Tree:")?;
        for line in self.tree.lines() {
            writeln!(f, "  {}", line)?;
        }
        if !self.conjuncts.is_empty() {
            writeln!(f, "Conjuncts:")?;
            for c in &self.conjuncts {
                writeln!(f, "  - {}", c)?;
            }
        }
        Ok(())
    }
}
