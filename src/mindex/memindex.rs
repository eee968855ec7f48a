//! In-memory multi-key document index
//!
//! Maps every key a document yields to the set of document handles. The
//! index lives for one invocation and is never persisted.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use serde_json::Value;

use super::key::{Key, KeySpec};
use super::lookup::LookupSpec;

/// Hash index over document handles `D`
#[derive(Debug)]
pub struct MemDocIndex<D> {
    key_spec: KeySpec,
    entries: HashMap<Key, HashSet<D>>,
}

impl<D: Clone + Eq + Hash> MemDocIndex<D> {
    pub fn new(key_spec: KeySpec) -> Self {
        Self {
            key_spec,
            entries: HashMap::new(),
        }
    }

    pub fn key_spec(&self) -> &KeySpec {
        &self.key_spec
    }

    /// Indexes a document under every key it yields
    pub fn add(&mut self, handle: D, doc: &Value) {
        for key in self.key_spec.extract(doc) {
            self.entries.entry(key).or_default().insert(handle.clone());
        }
    }

    /// Handles of every document with a key selected by the lookup
    pub fn find(&self, lookup: &LookupSpec) -> HashSet<D> {
        if lookup.multi_valued() {
            return lookup
                .alternatives()
                .iter()
                .flat_map(|alt| self.find(alt))
                .collect();
        }
        if lookup.needs_scan() {
            return self
                .entries
                .iter()
                .filter(|(key, _)| lookup.matches(key))
                .flat_map(|(_, handles)| handles.iter().cloned())
                .collect();
        }
        match lookup.build_key() {
            Ok(key) => self.entries.get(&key).cloned().unwrap_or_default(),
            // A multi-value lookup over no values selects nothing
            Err(_) => HashSet::new(),
        }
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
