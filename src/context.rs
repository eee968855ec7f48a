//! Operation context
//!
//! Carried through one composite find: who is asking, what went wrong
//! along the way, which plans ran and what came out.

use std::collections::BTreeSet;
use std::time::Instant;

use serde_json::Value;
use uuid::Uuid;

use crate::executor::ExecutorError;
use crate::planner::QueryPlan;

/// Context of one composite find
#[derive(Debug, Clone)]
pub struct OperationContext {
    /// Request ID for tracing
    request_id: Uuid,
    /// Roles of the caller
    roles: BTreeSet<String>,
    /// Errors recorded without aborting the operation
    errors: Vec<ExecutorError>,
    /// Roles named by the access rules of the resolved composite
    metadata_roles: BTreeSet<String>,
    search_plan: Option<QueryPlan>,
    retrieval_plan: Option<QueryPlan>,
    documents: Vec<Value>,
    match_count: usize,
    /// Start time for duration tracking
    started_at: Instant,
}

impl OperationContext {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            request_id: Uuid::new_v4(),
            roles: roles.into_iter().map(Into::into).collect(),
            errors: Vec::new(),
            metadata_roles: BTreeSet::new(),
            search_plan: None,
            retrieval_plan: None,
            documents: Vec::new(),
            match_count: 0,
            started_at: Instant::now(),
        }
    }

    /// Context of a caller without roles
    pub fn anonymous() -> Self {
        Self::new(Vec::<String>::new())
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn record_error(&mut self, error: ExecutorError) {
        self.errors.push(error);
    }

    pub fn errors(&self) -> &[ExecutorError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn set_metadata_roles(&mut self, roles: BTreeSet<String>) {
        self.metadata_roles = roles;
    }

    /// Roles the composite's access rules mention, for callers that compute
    /// the caller's effective roles
    pub fn metadata_roles(&self) -> &BTreeSet<String> {
        &self.metadata_roles
    }

    pub fn set_search_plan(&mut self, plan: QueryPlan) {
        self.search_plan = Some(plan);
    }

    pub fn search_plan(&self) -> Option<&QueryPlan> {
        self.search_plan.as_ref()
    }

    pub fn set_retrieval_plan(&mut self, plan: QueryPlan) {
        self.retrieval_plan = Some(plan);
    }

    pub fn retrieval_plan(&self) -> Option<&QueryPlan> {
        self.retrieval_plan.as_ref()
    }

    /// The plan that decided which documents match: the search plan when
    /// there was one, the retrieval plan otherwise
    pub fn query_plan(&self) -> Option<&QueryPlan> {
        self.search_plan.as_ref().or(self.retrieval_plan.as_ref())
    }

    pub fn set_result(&mut self, documents: Vec<Value>, match_count: usize) {
        self.documents = documents;
        self.match_count = match_count;
    }

    pub fn documents(&self) -> &[Value] {
        &self.documents
    }

    pub fn into_documents(self) -> Vec<Value> {
        self.documents
    }

    pub fn match_count(&self) -> usize {
        self.match_count
    }

    /// Clears plans, errors and results so the context can serve another
    /// find
    pub fn reset(&mut self) {
        self.errors.clear();
        self.metadata_roles.clear();
        self.search_plan = None;
        self.retrieval_plan = None;
        self.documents.clear();
        self.match_count = 0;
    }

    /// Get elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> u128 {
        self.started_at.elapsed().as_millis()
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::anonymous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finder::FinderError;
    use serde_json::json;

    #[test]
    fn test_roles_and_errors() {
        let mut ctx = OperationContext::new(["admin", "reader"]);
        assert!(ctx.has_role("admin"));
        assert!(!ctx.has_role("writer"));
        assert!(!ctx.has_errors());
        ctx.record_error(ExecutorError::BackendFetch {
            entity: "B".into(),
            source: FinderError::Backend("down".into()),
        });
        assert_eq!(ctx.errors().len(), 1);
    }

    #[test]
    fn test_reset_clears_results() {
        let mut ctx = OperationContext::anonymous();
        ctx.set_result(vec![json!({"_id": 1})], 1);
        ctx.set_metadata_roles(BTreeSet::from(["hr".to_string()]));
        assert_eq!(ctx.match_count(), 1);
        ctx.reset();
        assert!(ctx.documents().is_empty());
        assert!(ctx.metadata_roles().is_empty());
        assert!(ctx.query_plan().is_none());
    }

    #[test]
    fn test_request_ids_are_unique() {
        assert_ne!(OperationContext::anonymous().request_id(), OperationContext::anonymous().request_id());
    }
}
