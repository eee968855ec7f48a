//! Finder contract
//!
//! A finder runs a single-entity query against the backend storing that
//! entity. The composite engine only ever talks to backends through this
//! trait; finders are registered per backend identifier in a
//! [`FinderRegistry`].

mod errors;
mod memory;
mod registry;

pub use errors::{FinderError, FinderResult};
pub use memory::MemoryFinder;
pub use registry::FinderRegistry;

use serde_json::Value;

use crate::context::OperationContext;
use crate::query::{Projection, QueryExpr, Sort};

/// Single-entity find request
#[derive(Debug, Clone, PartialEq)]
pub struct FindRequest {
    pub entity: String,
    pub version: String,
    pub query: Option<QueryExpr>,
    pub projection: Option<Projection>,
    pub sort: Option<Sort>,
    /// First result position, inclusive. Honoured only together with `to`.
    pub from: Option<u64>,
    /// Last result position, inclusive. Honoured only together with `from`.
    pub to: Option<u64>,
}

impl FindRequest {
    pub fn new(entity: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            version: version.into(),
            query: None,
            projection: None,
            sort: None,
            from: None,
            to: None,
        }
    }

    pub fn with_query(mut self, query: Option<QueryExpr>) -> Self {
        self.query = query;
        self
    }

    pub fn with_sort(mut self, sort: Option<Sort>) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_range(mut self, from: Option<u64>, to: Option<u64>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    /// The requested range when both bounds are present
    pub fn range(&self) -> Option<(u64, u64)> {
        match (self.from, self.to) {
            (Some(from), Some(to)) => Some((from, to)),
            _ => None,
        }
    }
}

/// A document returned by a backend, with any errors specific to it
#[derive(Debug, Clone, PartialEq)]
pub struct FoundDocument {
    pub body: Value,
    pub errors: Vec<FinderError>,
}

impl FoundDocument {
    pub fn ok(body: Value) -> Self {
        Self {
            body,
            errors: Vec::new(),
        }
    }
}

/// Backend find result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindResponse {
    /// Matching documents before the range is applied
    pub match_count: usize,
    pub documents: Vec<FoundDocument>,
}

/// Runs single-entity queries against one backend
pub trait Finder: Send + Sync {
    fn find(&self, ctx: &OperationContext, request: &FindRequest) -> FinderResult<FindResponse>;
}

/// Applies an inclusive `[from, to]` window to a result list
pub fn apply_range<T>(items: Vec<T>, range: Option<(u64, u64)>) -> Vec<T> {
    match range {
        Some((from, to)) if from <= to => items
            .into_iter()
            .skip(from as usize)
            .take((to - from + 1) as usize)
            .collect(),
        Some(_) => Vec::new(),
        None => items,
    }
}
