//! In-memory backend
//!
//! Holds every entity's documents in insertion order. Queries are
//! narrowed through a throwaway [`MemDocIndex`] when the query has an
//! indexable part, then evaluated document by document.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;
use tracing::debug;

use super::errors::{FinderError, FinderResult};
use super::{apply_range, FindRequest, FindResponse, Finder, FoundDocument};
use crate::context::OperationContext;
use crate::mindex::{index_specs, MemDocIndex};
use crate::query::{FieldProjector, Projector};

/// Finder over documents held in memory
#[derive(Debug)]
pub struct MemoryFinder {
    collections: HashMap<String, Vec<Value>>,
    use_index: bool,
    /// Entities whose finds fail, with the failure message
    failures: HashMap<String, String>,
    /// Per-document errors keyed by entity and `_id`
    document_errors: HashMap<(String, String), String>,
    calls: Mutex<HashMap<String, usize>>,
}

impl Default for MemoryFinder {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFinder {
    pub fn new() -> Self {
        Self {
            collections: HashMap::new(),
            use_index: true,
            failures: HashMap::new(),
            document_errors: HashMap::new(),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&mut self, entity: impl Into<String>, doc: Value) {
        self.collections.entry(entity.into()).or_default().push(doc);
    }

    pub fn with_documents(mut self, entity: impl Into<String>, docs: Vec<Value>) -> Self {
        self.collections.entry(entity.into()).or_default().extend(docs);
        self
    }

    /// Evaluates every document instead of narrowing through an index
    pub fn without_index(mut self) -> Self {
        self.use_index = false;
        self
    }

    /// Makes every find on `entity` fail
    pub fn with_failure(mut self, entity: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.insert(entity.into(), message.into());
        self
    }

    /// Reports an error alongside the document of `entity` with this `_id`
    pub fn with_document_error(mut self, entity: impl Into<String>, id: impl Into<String>, message: impl Into<String>) -> Self {
        self.document_errors.insert((entity.into(), id.into()), message.into());
        self
    }

    pub fn document_count(&self, entity: &str) -> usize {
        self.collections.get(entity).map(Vec::len).unwrap_or(0)
    }

    /// Number of finds issued against `entity` so far
    pub fn calls(&self, entity: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(entity).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn record_call(&self, entity: &str) {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(entity.to_string()).or_default() += 1;
        }
    }

    /// Positions of the documents worth evaluating, in insertion order
    fn candidates(&self, docs: &[Value], request: &FindRequest) -> Vec<usize> {
        let specs = if self.use_index {
            request.query.as_ref().and_then(index_specs)
        } else {
            None
        };
        let Some((key_spec, lookup)) = specs else {
            return (0..docs.len()).collect();
        };

        let mut index = MemDocIndex::new(key_spec);
        for (i, doc) in docs.iter().enumerate() {
            index.add(i, doc);
        }
        let mut found: Vec<usize> = index.find(&lookup).into_iter().collect();
        found.sort_unstable();
        found
    }

    fn found_document(&self, entity: &str, body: Value) -> FoundDocument {
        let id = match body.get("_id") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => return FoundDocument::ok(body),
        };
        match self.document_errors.get(&(entity.to_string(), id.clone())) {
            Some(message) => FoundDocument {
                body,
                errors: vec![FinderError::Document {
                    id,
                    message: message.clone(),
                }],
            },
            None => FoundDocument::ok(body),
        }
    }
}

impl Finder for MemoryFinder {
    fn find(&self, ctx: &OperationContext, request: &FindRequest) -> FinderResult<FindResponse> {
        self.record_call(&request.entity);
        if let Some(message) = self.failures.get(&request.entity) {
            return Err(FinderError::Backend(message.clone()));
        }

        let docs = self
            .collections
            .get(&request.entity)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let mut matched: Vec<&Value> = self
            .candidates(docs, request)
            .into_iter()
            .map(|i| &docs[i])
            .filter(|doc| request.query.as_ref().map(|q| q.evaluate(doc)).unwrap_or(true))
            .collect();
        if let Some(sort) = &request.sort {
            sort.sort_by_document(&mut matched, |doc| *doc);
        }

        let match_count = matched.len();
        let documents = apply_range(matched, request.range())
            .into_iter()
            .map(|doc| {
                let body = match &request.projection {
                    Some(projection) => FieldProjector.project(doc, projection),
                    None => doc.clone(),
                };
                self.found_document(&request.entity, body)
            })
            .collect::<Vec<_>>();

        debug!(
            request_id = %ctx.request_id(),
            entity = %request.entity,
            match_count,
            returned = documents.len(),
            "memory find"
        );
        Ok(FindResponse {
            match_count,
            documents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{QueryExpr, Sort};
    use serde_json::json;

    fn finder() -> MemoryFinder {
        MemoryFinder::new().with_documents(
            "B",
            vec![
                json!({"_id": "B01", "code": "x", "n": 3}),
                json!({"_id": "B02", "code": "y", "n": 1}),
                json!({"_id": "B03", "code": "x", "n": 2}),
            ],
        )
    }

    fn ids(response: &FindResponse) -> Vec<String> {
        response
            .documents
            .iter()
            .map(|d| d.body["_id"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn test_find_with_index_and_sort() {
        let ctx = OperationContext::anonymous();
        let request = FindRequest::new("B", "1")
            .with_query(Some(QueryExpr::eq("code", json!("x"))))
            .with_sort(Some(Sort::asc("n")));
        let response = finder().find(&ctx, &request).unwrap();
        assert_eq!(response.match_count, 2);
        assert_eq!(ids(&response), vec!["B03", "B01"]);
    }

    #[test]
    fn test_large_integer_matches_nearby_float() {
        let ctx = OperationContext::anonymous();
        let finder = MemoryFinder::new().with_documents("B", vec![json!({"_id": "B01", "n": 9_007_199_254_740_993i64})]);
        let query = QueryExpr::eq("n", json!(9_007_199_254_740_992.0));
        assert!(query.evaluate(&json!({"n": 9_007_199_254_740_993i64})));
        let request = FindRequest::new("B", "1").with_query(Some(query));
        let indexed = finder.find(&ctx, &request).unwrap();
        assert_eq!(ids(&indexed), vec!["B01"]);
        let scanned = finder.without_index().find(&ctx, &request).unwrap();
        assert_eq!(ids(&scanned), ids(&indexed));
    }

    #[test]
    fn test_index_and_scan_agree() {
        let ctx = OperationContext::anonymous();
        let query = QueryExpr::in_values("_id", vec![json!("B01"), json!("B02")]);
        let request = FindRequest::new("B", "1").with_query(Some(query));
        let indexed = finder().find(&ctx, &request).unwrap();
        let scanned = finder().without_index().find(&ctx, &request).unwrap();
        assert_eq!(ids(&indexed), ids(&scanned));
        assert_eq!(ids(&indexed), vec!["B01", "B02"]);
    }

    #[test]
    fn test_range_after_count() {
        let ctx = OperationContext::anonymous();
        let request = FindRequest::new("B", "1")
            .with_sort(Some(Sort::desc("n")))
            .with_range(Some(1), Some(5));
        let response = finder().find(&ctx, &request).unwrap();
        assert_eq!(response.match_count, 3);
        assert_eq!(ids(&response), vec!["B03", "B02"]);
    }

    #[test]
    fn test_failures_and_document_errors() {
        let ctx = OperationContext::anonymous();
        let failing = finder().with_failure("B", "offline");
        let err = failing.find(&ctx, &FindRequest::new("B", "1")).unwrap_err();
        assert_eq!(err, FinderError::Backend("offline".into()));
        assert_eq!(failing.calls("B"), 1);

        let flagged = finder().with_document_error("B", "B02", "corrupt");
        let response = flagged.find(&ctx, &FindRequest::new("B", "1")).unwrap();
        assert!(response.documents[0].errors.is_empty());
        assert_eq!(response.documents[1].errors.len(), 1);
    }

    #[test]
    fn test_unknown_entity_is_empty() {
        let ctx = OperationContext::anonymous();
        let response = finder().find(&ctx, &FindRequest::new("Z", "1")).unwrap();
        assert_eq!(response.match_count, 0);
        assert!(response.documents.is_empty());
    }
}
