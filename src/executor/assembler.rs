//! Composite assembler
//!
//! Top level of a composite find:
//!
//! 1. Resolve the composite metadata for the request
//! 2. Compute the minimal entity set the query needs
//! 3. With more than one entity, choose and run a search plan over that
//!    set to find the matching root documents
//! 4. Choose a root-first retrieval plan over the whole composite. Its root
//!    is seeded with the search results, or queried directly
//! 5. Run the retrieval plan and splice child documents into their parents
//! 6. Project with the requested projection plus authorization exclusions
//!
//! Resolution and planning errors abort before any backend call. Fetch
//! errors are recorded on the [`OperationContext`] and partial results are
//! kept.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::cache::DocumentCache;
use super::errors::ExecutorError;
use super::node::PlanExecution;
use super::result::DocId;
use crate::auth::{AccessEvaluator, AllowAll};
use crate::config::FinderConfig;
use crate::context::OperationContext;
use crate::finder::{apply_range, FinderRegistry};
use crate::metadata::{CompositeMetadata, EntityId, MetadataError, MetadataResolver, ResolvedComposite, ROOT};
use crate::observability::{Event, ObservationScope};
use crate::planner::{ExplainPlan, FirstEnumerator, PlannerError, QueryPlan, QueryPlanChooser, SimpleScorer};
use crate::query::{FieldProjector, Projection, Projector, QueryError, QueryExpr, Sort};
use crate::schema::MetadataStore;

/// Errors that abort a composite find
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompositeError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

impl CompositeError {
    pub fn code(&self) -> &'static str {
        match self {
            CompositeError::Metadata(e) => e.code(),
            CompositeError::Planner(e) => e.code(),
            CompositeError::Executor(e) => e.code(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        match self {
            CompositeError::Metadata(e) => e.is_fatal(),
            CompositeError::Planner(e) => e.is_fatal(),
            CompositeError::Executor(e) => e.is_fatal(),
        }
    }
}

pub type CompositeResult<T> = Result<T, CompositeError>;

/// A composite find request
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeFindRequest {
    pub entity: String,
    /// `None` selects the store's default version
    pub version: Option<String>,
    pub query: Option<QueryExpr>,
    pub projection: Option<Projection>,
    pub sort: Option<Sort>,
    pub from: Option<u64>,
    pub to: Option<u64>,
}

impl CompositeFindRequest {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            version: None,
            query: None,
            projection: None,
            sort: None,
            from: None,
            to: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_query(mut self, query: QueryExpr) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_range(mut self, from: u64, to: u64) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    /// Parses `{"entity", "version"?, "query"?, "projection"?, "sort"?,
    /// "from"?, "to"?}`
    pub fn from_json(value: &Value) -> Result<Self, QueryError> {
        let entity = value
            .get("entity")
            .and_then(Value::as_str)
            .ok_or_else(|| QueryError::MalformedQuery("request needs an entity name".into()))?;
        let mut request = Self::new(entity);
        request.version = value.get("version").and_then(Value::as_str).map(str::to_string);
        request.query = value.get("query").map(QueryExpr::from_json).transpose()?;
        request.projection = value.get("projection").map(Projection::from_json).transpose()?;
        request.sort = value.get("sort").map(Sort::from_json).transpose()?;
        request.from = bound(value, "from")?;
        request.to = bound(value, "to")?;
        Ok(request)
    }

    fn range(&self) -> Option<(u64, u64)> {
        self.from.zip(self.to)
    }
}

fn bound(value: &Value, key: &str) -> Result<Option<u64>, QueryError> {
    match value.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(Some)
            .ok_or_else(|| QueryError::MalformedQuery(format!("{} must be a non-negative integer", key))),
    }
}

static ALLOW_ALL: AllowAll = AllowAll;
static FIELD_PROJECTOR: FieldProjector = FieldProjector;

/// Finds composite documents
pub struct CompositeFinder<'a> {
    store: &'a dyn MetadataStore,
    finders: &'a FinderRegistry,
    access: &'a dyn AccessEvaluator,
    projector: &'a dyn Projector,
    config: FinderConfig,
}

impl<'a> CompositeFinder<'a> {
    pub fn new(store: &'a dyn MetadataStore, finders: &'a FinderRegistry) -> Self {
        Self {
            store,
            finders,
            access: &ALLOW_ALL,
            projector: &FIELD_PROJECTOR,
            config: FinderConfig::default(),
        }
    }

    pub fn with_access(mut self, access: &'a dyn AccessEvaluator) -> Self {
        self.access = access;
        self
    }

    pub fn with_projector(mut self, projector: &'a dyn Projector) -> Self {
        self.projector = projector;
        self
    }

    pub fn with_config(mut self, config: FinderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    /// Runs a composite find. Results, plans and recorded fetch errors end
    /// up on `ctx`.
    pub fn find(&self, ctx: &mut OperationContext, request: &CompositeFindRequest) -> CompositeResult<()> {
        let request_id = ctx.request_id().to_string();
        let scope = ObservationScope::new("COMPOSITE_FIND")
            .with_field("entity", &request.entity)
            .with_field("request_id", &request_id);
        ctx.reset();

        let resolved = self.resolve(request).inspect_err(|e| reject(request, e))?;
        ctx.set_metadata_roles(resolved.roles.clone());
        let composite = &resolved.metadata;
        let query = request.query.as_ref();
        let mut cache = DocumentCache::new();

        let minimal = composite.minimal_entity_set(query);
        let seeds = if minimal.len() > 1 {
            let search = self.search_plan(composite, query, &minimal).inspect_err(|e| reject(request, e))?;
            let seeds = self.run_search(ctx, &mut cache, composite, &search);
            ctx.set_search_plan(search);
            Some(seeds)
        } else {
            None
        };

        let retrieval = QueryPlanChooser::new(composite, &FirstEnumerator, &SimpleScorer, query)
            .choose()
            .inspect_err(|e| reject(request, &CompositeError::from(e.clone())))?;
        Event::RetrievalPlanChosen.log(&[("entity", &request.entity), ("plan", &retrieval.tree_string())]);

        let mut execution = PlanExecution::new(&retrieval, composite);
        let root = execution.root_node().unwrap_or(ROOT);
        let seeded = seeds.is_some();
        match seeds {
            Some(seeds) => {
                Event::RetrievalSeeded.log(&[("entity", &request.entity), ("documents", &seeds.len().to_string())]);
                execution.seed(root, seeds);
            }
            None => {
                execution.set_sort(root, request.sort.clone());
                execution.set_range(root, request.from, request.to)?;
            }
        }
        let errors_before = ctx.errors().len();
        execution.execute(ctx, &mut cache, self.finders);
        let retrieval_failed = ctx.errors().len() > errors_before;

        let mut documents: Vec<Value> = execution
            .node_docs(root)
            .iter()
            .map(|&doc| execution.assemble(doc))
            .collect();
        if seeded {
            // A failed child fetch leaves holes the query would read as
            // misses. The search plan already proved these roots match.
            if let Some(query) = query.filter(|_| !retrieval_failed) {
                documents.retain(|doc| query.evaluate(doc));
            }
            if let Some(sort) = &request.sort {
                sort.sort_by_document(&mut documents, |doc| doc);
            }
            documents = apply_range(documents, request.range());
        }

        let projection = self.projection(request, composite, ctx);
        let documents: Vec<Value> = documents
            .iter()
            .map(|doc| self.projector.project(doc, &projection))
            .collect();

        let match_count = documents.len();
        debug!(
            request_id = %request_id,
            match_count,
            errors = ctx.errors().len(),
            cached = cache.len(),
            "composite find assembled"
        );
        ctx.set_retrieval_plan(retrieval);
        ctx.set_result(documents, match_count);
        scope.complete_with_fields(&[
            ("match_count", &match_count.to_string()),
            ("errors", &ctx.errors().len().to_string()),
        ]);
        Ok(())
    }

    /// The search and retrieval plans a find would use, without running
    /// anything
    pub fn explain(&self, request: &CompositeFindRequest) -> CompositeResult<Vec<ExplainPlan>> {
        let resolved = self.resolve(request)?;
        let composite = &resolved.metadata;
        let query = request.query.as_ref();

        let mut plans = Vec::new();
        let minimal = composite.minimal_entity_set(query);
        if minimal.len() > 1 {
            let search = self.search_plan(composite, query, &minimal)?;
            plans.push(ExplainPlan::from_plan("search", &search));
        }
        let retrieval = QueryPlanChooser::new(composite, &FirstEnumerator, &SimpleScorer, query).choose()?;
        plans.push(ExplainPlan::from_plan("retrieval", &retrieval));

        Event::ExplainComplete.log(&[("entity", &request.entity), ("plans", &plans.len().to_string())]);
        Ok(plans)
    }

    fn resolve(&self, request: &CompositeFindRequest) -> CompositeResult<ResolvedComposite> {
        let resolved = MetadataResolver::new(self.store).resolve(
            &request.entity,
            request.version.as_deref(),
            request.query.as_ref(),
            request.projection.as_ref(),
        )?;
        for entity in resolved.metadata.entities() {
            if !self.finders.contains(&entity.schema.backend) {
                return Err(MetadataError::UnknownBackend {
                    name: entity.name().to_string(),
                    backend: entity.schema.backend.clone(),
                }
                .into());
            }
        }
        Event::MetadataResolved.log(&[
            ("entity", &request.entity),
            ("entities", &resolved.metadata.len().to_string()),
        ]);
        Ok(resolved)
    }

    fn search_plan(
        &self,
        composite: &CompositeMetadata,
        query: Option<&QueryExpr>,
        minimal: &BTreeSet<EntityId>,
    ) -> CompositeResult<QueryPlan> {
        let enumerator = self.config.enumerator();
        let scorer = self.config.scorer();
        let plan = QueryPlanChooser::new(composite, enumerator.as_ref(), scorer.as_ref(), query)
            .with_restriction(minimal)
            .with_max_edges(self.config.max_enumerated_edges)
            .choose()?;
        Event::SearchPlanChosen.log(&[
            ("plan", &plan.tree_string()),
            ("enumerator", enumerator.name()),
            ("scorer", scorer.name()),
        ]);
        Ok(plan)
    }

    /// Runs the search plan and returns the distinct root documents found
    fn run_search(
        &self,
        ctx: &mut OperationContext,
        cache: &mut DocumentCache,
        composite: &CompositeMetadata,
        plan: &QueryPlan,
    ) -> Vec<(Option<DocId>, Arc<Value>)> {
        let mut execution = PlanExecution::new(plan, composite);
        execution.execute(ctx, cache, self.finders);
        let Some(root) = execution.root_node() else {
            return Vec::new();
        };
        let mut seen = BTreeSet::new();
        execution
            .documents_of(root)
            .into_iter()
            .filter(|(id, _)| id.as_ref().map(|id| seen.insert(id.clone())).unwrap_or(true))
            .collect()
    }

    fn projection(&self, request: &CompositeFindRequest, composite: &CompositeMetadata, ctx: &OperationContext) -> Projection {
        let roles: BTreeSet<String> = if ctx.roles().is_empty() {
            self.config.default_roles.iter().cloned().collect()
        } else {
            ctx.roles().clone()
        };
        let excluded = self.access.excluded_fields(composite, &roles);
        request
            .projection
            .clone()
            .unwrap_or_else(Projection::all)
            .with_exclusions(&excluded)
    }
}

fn reject(request: &CompositeFindRequest, error: &CompositeError) {
    Event::FindRejected.log(&[
        ("entity", &request.entity),
        ("code", error.code()),
        ("reason", &error.to_string()),
    ]);
}
