//! Document cache
//!
//! Lives for one composite find. The first body fetched for an
//! `(entity, DocId)` pair is kept; later fetches of the same document
//! share it.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::result::DocId;

#[derive(Debug, Default)]
pub struct DocumentCache {
    docs: HashMap<(String, DocId), Arc<Value>>,
    hits: usize,
    misses: usize,
}

impl DocumentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached body for the document, caching `body` first if absent
    pub fn intern(&mut self, entity: &str, id: &DocId, body: Value) -> Arc<Value> {
        let key = (entity.to_string(), id.clone());
        if let Some(cached) = self.docs.get(&key) {
            self.hits += 1;
            return Arc::clone(cached);
        }
        self.misses += 1;
        let body = Arc::new(body);
        self.docs.insert(key, Arc::clone(&body));
        body
    }

    pub fn get(&self, entity: &str, id: &DocId) -> Option<Arc<Value>> {
        self.docs.get(&(entity.to_string(), id.clone())).cloned()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }
}
