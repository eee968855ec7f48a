//! Node execution
//!
//! A [`PlanExecution`] runs one query plan. It keeps one [`NodeExecutor`]
//! per plan node, indexed by node id, and an arena of every document the
//! nodes produced.
//!
//! A node without sources is queried once. A node with sources is queried
//! once per tuple of the Cartesian product of its source candidates: for an
//! entity-parent source, one candidate per reference slot of each parent
//! document; for an entity-child source, one candidate per document.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::binding::{BoundQuery, SourceDoc};
use super::cache::DocumentCache;
use super::errors::{ExecutorError, ExecutorResult};
use super::result::{DocId, DocRef, RefSlot, ResultDoc};
use crate::context::OperationContext;
use crate::finder::{FindRequest, Finder, FinderError, FinderRegistry};
use crate::metadata::{CompositeMetadata, EntityId, ROOT};
use crate::observability::Event;
use crate::planner::{NodeId, QueryPlan};
use crate::query::path::{set_at, values_at};
use crate::query::Sort;
use crate::tuples::Tuples;

/// Execution state of one plan node
#[derive(Debug, Clone)]
pub struct NodeExecutor {
    pub node: NodeId,
    pub entity: EntityId,
    query: BoundQuery,
    sort: Option<Sort>,
    from: Option<u64>,
    to: Option<u64>,
    docs: Vec<DocRef>,
    by_id: HashMap<DocId, DocRef>,
    executed: bool,
}

impl NodeExecutor {
    /// Builds the node's query from its own conjuncts and those of its
    /// incoming edges. Non-root entities sort by their reference's default
    /// sort.
    pub fn init(plan: &QueryPlan, composite: &CompositeMetadata, node: NodeId) -> Self {
        let plan_node = plan.node(node);
        let entity = plan_node.entity;
        let mut query = BoundQuery::new();
        for &c in &plan_node.conjuncts {
            query.add_local(&plan.conjuncts()[c].clause, composite, entity);
        }
        for edge in plan.incoming(node) {
            let source = edge.from();
            let source_entity = plan.node(source).entity;
            for &c in &edge.conjuncts {
                query.add_bound(&plan.conjuncts()[c].clause, composite, entity, source, source_entity);
            }
        }
        let sort = composite
            .entity(entity)
            .reference
            .as_ref()
            .and_then(|r| r.sort.clone());

        Self {
            node,
            entity,
            query,
            sort,
            from: None,
            to: None,
            docs: Vec::new(),
            by_id: HashMap::new(),
            executed: false,
        }
    }

    pub fn docs(&self) -> &[DocRef] {
        &self.docs
    }

    pub fn is_executed(&self) -> bool {
        self.executed
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    doc: DocRef,
    slot: Option<usize>,
}

/// Execution of one query plan
pub struct PlanExecution<'p> {
    plan: &'p QueryPlan,
    composite: &'p CompositeMetadata,
    nodes: Vec<NodeExecutor>,
    docs: Vec<ResultDoc>,
}

impl<'p> PlanExecution<'p> {
    pub fn new(plan: &'p QueryPlan, composite: &'p CompositeMetadata) -> Self {
        let nodes = plan
            .nodes()
            .iter()
            .map(|n| NodeExecutor::init(plan, composite, n.id))
            .collect();
        Self {
            plan,
            composite,
            nodes,
            docs: Vec::new(),
        }
    }

    pub fn plan(&self) -> &QueryPlan {
        self.plan
    }

    pub fn executor(&self, node: NodeId) -> &NodeExecutor {
        &self.nodes[node]
    }

    /// Node of the root entity, if the plan includes it
    pub fn root_node(&self) -> Option<NodeId> {
        self.plan.node_for_entity(ROOT)
    }

    /// Sets the result window. Only the root entity's node accepts one.
    pub fn set_range(&mut self, node: NodeId, from: Option<u64>, to: Option<u64>) -> ExecutorResult<()> {
        let executor = &mut self.nodes[node];
        if executor.entity != ROOT {
            return Err(ExecutorError::RangeOnNonRoot {
                entity: self.composite.entity(executor.entity).name().to_string(),
            });
        }
        executor.from = from;
        executor.to = to;
        Ok(())
    }

    /// Replaces the node's sort; `None` keeps the current one
    pub fn set_sort(&mut self, node: NodeId, sort: Option<Sort>) {
        if sort.is_some() {
            self.nodes[node].sort = sort;
        }
    }

    /// Fills a node with documents found elsewhere instead of querying it
    pub fn seed(&mut self, node: NodeId, docs: Vec<(Option<DocId>, Arc<Value>)>) {
        for (id, body) in docs {
            self.push_doc(node, id, body);
        }
        self.nodes[node].executed = true;
        debug!(node = %self.plan.node(node).name(), docs = self.nodes[node].docs.len(), "node seeded");
    }

    /// Runs every node not yet executed, sources before destinations
    pub fn execute(&mut self, ctx: &mut OperationContext, cache: &mut DocumentCache, finders: &FinderRegistry) {
        for node in self.plan.breadth_first_order() {
            if !self.nodes[node].executed {
                self.execute_node(node, ctx, cache, finders);
            }
        }
    }

    /// Runs one node. Its sources must have run already.
    pub fn execute_node(
        &mut self,
        node: NodeId,
        ctx: &mut OperationContext,
        cache: &mut DocumentCache,
        finders: &FinderRegistry,
    ) {
        self.nodes[node].executed = true;
        let composite = self.composite;
        let entity = composite.entity(self.nodes[node].entity);
        let Some(finder) = finders.get(&entity.schema.backend) else {
            record_failure(
                ctx,
                entity.name(),
                FinderError::Unsupported(format!("no finder for backend {}", entity.schema.backend)),
            );
            return;
        };

        let request = FindRequest::new(entity.name(), entity.schema.version.clone()).with_sort(self.nodes[node].sort.clone());
        let sources = self.plan.sources_of(node);
        if sources.is_empty() {
            let executor = &self.nodes[node];
            let request = request
                .with_query(executor.query.instantiate(&[]))
                .with_range(executor.from, executor.to);
            self.run(node, &request, &[], ctx, cache, finder.as_ref());
            return;
        }

        let candidates: Vec<Vec<Candidate>> = sources.iter().map(|&s| self.candidates(s, node)).collect();
        let mut tuples = Tuples::new();
        for list in &candidates {
            tuples.add(list);
        }
        let mut queries = 0usize;
        for tuple in tuples.iter() {
            let tuple: Vec<Candidate> = tuple.into_iter().copied().collect();
            let query = {
                let docs: Vec<SourceDoc<'_>> = sources
                    .iter()
                    .zip(&tuple)
                    .map(|(&source, c)| {
                        let doc = &self.docs[c.doc];
                        SourceDoc {
                            node: source,
                            body: &doc.body,
                            container: c.slot.map(|s| &doc.slots[s].container),
                        }
                    })
                    .collect();
                self.nodes[node].query.instantiate(&docs)
            };
            let request = request.clone().with_query(query);
            self.run(node, &request, &tuple, ctx, cache, finder.as_ref());
            queries += 1;
        }
        debug!(
            node = %self.plan.node(node).name(),
            sources = sources.len(),
            queries,
            docs = self.nodes[node].docs.len(),
            "node executed"
        );
    }

    /// Candidates a source node offers to `node`
    fn candidates(&mut self, source: NodeId, node: NodeId) -> Vec<Candidate> {
        let child = self.nodes[node].entity;
        let source_docs = self.nodes[source].docs.clone();
        if self.composite.entity(child).parent == Some(self.nodes[source].entity) {
            let mut out = Vec::new();
            for doc in source_docs {
                for slot in self.ensure_slots(doc, child) {
                    out.push(Candidate { doc, slot: Some(slot) });
                }
            }
            out
        } else {
            source_docs.into_iter().map(|doc| Candidate { doc, slot: None }).collect()
        }
    }

    /// Creates the document's reference slots for `child` on first use:
    /// one per object holding the reference field
    fn ensure_slots(&mut self, doc: DocRef, child: EntityId) -> Vec<usize> {
        let existing = self.docs[doc].slots_for(child);
        if !existing.is_empty() {
            return existing;
        }
        let composite = self.composite;
        let entity = composite.entity(child);
        let parent = entity.parent.unwrap_or(ROOT);
        let reference_field = composite.to_relative(parent, &entity.reference_field);
        let Some(field_name) = reference_field.last() else {
            return Vec::new();
        };
        let container_pattern = reference_field.parent();

        let body = Arc::clone(&self.docs[doc].body);
        let containers: Vec<_> = values_at(&body, &container_pattern)
            .into_iter()
            .filter(|(_, v)| v.is_object())
            .map(|(path, _)| path)
            .collect();
        let target = &mut self.docs[doc];
        let first = target.slots.len();
        for container in containers {
            target.slots.push(RefSlot {
                child_entity: child,
                field: container.push(field_name),
                container,
                children: Vec::new(),
            });
        }
        (first..target.slots.len()).collect()
    }

    fn run(
        &mut self,
        node: NodeId,
        request: &FindRequest,
        tuple: &[Candidate],
        ctx: &mut OperationContext,
        cache: &mut DocumentCache,
        finder: &dyn Finder,
    ) {
        let response = match finder.find(ctx, request) {
            Ok(response) => response,
            Err(source) => {
                record_failure(ctx, &request.entity, source);
                return;
            }
        };
        for found in response.documents {
            if !found.errors.is_empty() {
                for source in found.errors {
                    record_failure(ctx, &request.entity, source);
                }
                continue;
            }
            let doc = self.add_doc(node, found.body, cache);
            for candidate in tuple {
                self.link(*candidate, doc);
            }
        }
    }

    fn add_doc(&mut self, node: NodeId, body: Value, cache: &mut DocumentCache) -> DocRef {
        let composite = self.composite;
        let schema = &composite.entity(self.nodes[node].entity).schema;
        let id = DocId::extract(schema, &body);
        if let Some(&existing) = id.as_ref().and_then(|id| self.nodes[node].by_id.get(id)) {
            return existing;
        }
        let body = match &id {
            Some(id) => cache.intern(&schema.name, id, body),
            None => Arc::new(body),
        };
        self.push_doc(node, id, body)
    }

    fn push_doc(&mut self, node: NodeId, id: Option<DocId>, body: Arc<Value>) -> DocRef {
        if let Some(&existing) = id.as_ref().and_then(|id| self.nodes[node].by_id.get(id)) {
            return existing;
        }
        let doc = self.docs.len();
        self.docs
            .push(ResultDoc::new(id.clone(), node, self.nodes[node].entity, body));
        self.nodes[node].docs.push(doc);
        if let Some(id) = id {
            self.nodes[node].by_id.insert(id, doc);
        }
        doc
    }

    fn link(&mut self, candidate: Candidate, doc: DocRef) {
        if let Some(slot) = candidate.slot {
            let children = &mut self.docs[candidate.doc].slots[slot].children;
            if !children.contains(&doc) {
                children.push(doc);
            }
        }
        let parents = &mut self.docs[doc].plan_parents;
        if !parents.contains(&candidate.doc) {
            parents.push(candidate.doc);
        }
    }

    /// Documents a node produced, in production order
    pub fn node_docs(&self, node: NodeId) -> &[DocRef] {
        &self.nodes[node].docs
    }

    pub fn doc(&self, doc: DocRef) -> &ResultDoc {
        &self.docs[doc]
    }

    /// Identity and shared body of every document of a node
    pub fn documents_of(&self, node: NodeId) -> Vec<(Option<DocId>, Arc<Value>)> {
        self.nodes[node]
            .docs
            .iter()
            .map(|&d| (self.docs[d].id.clone(), Arc::clone(&self.docs[d].body)))
            .collect()
    }

    /// The document with its reference slots filled, children assembled
    /// first. Every call returns a fresh tree, so a child linked under
    /// several parents is copied into each.
    pub fn assemble(&self, doc: DocRef) -> Value {
        let result = &self.docs[doc];
        let mut body = (*result.body).clone();
        for slot in &result.slots {
            let children: Vec<Value> = slot.children.iter().map(|&c| self.assemble(c)).collect();
            if !set_at(&mut body, &slot.field, Value::Array(children)) {
                warn!(field = %slot.field, "reference slot has no container");
            }
        }
        body
    }
}

fn record_failure(ctx: &mut OperationContext, entity: &str, source: FinderError) {
    Event::FetchFailed.log(&[("entity", entity), ("code", source.code()), ("reason", &source.to_string())]);
    ctx.record_error(ExecutorError::BackendFetch {
        entity: entity.to_string(),
        source,
    });
}
