//! End-to-end composite finds over the memory backend

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use compositedb::auth::RoleFieldAccess;
use compositedb::context::OperationContext;
use compositedb::executor::{CompositeFindRequest, CompositeFinder, DocumentCache, ExecutorError, PlanExecution};
use compositedb::finder::{FindRequest, FindResponse, Finder, FinderError, FinderRegistry, FinderResult, MemoryFinder};
use compositedb::metadata::MetadataResolver;
use compositedb::planner::{FirstEnumerator, QueryPlan, QueryPlanChooser, SimpleScorer};
use compositedb::query::{Projection, QueryExpr, Sort};
use compositedb::schema::{EntitySchema, EntityStatus, InMemoryMetadataStore, SchemaLoader};
use serde_json::{json, Value};

fn schemas() -> Value {
    json!([
        {
            "name": "A",
            "version": "1",
            "references": [
                {"field": "b", "entity": "B", "version": "1", "query": {"field": "_id", "op": "$in", "rfield": "$parent.b_ref"}},
                {"field": "c", "entity": "C", "query": {"field": "_id", "op": "=", "rfield": "$parent.c_ref"}}
            ],
            "access": {"fields": {"salary": ["hr"]}}
        },
        {"name": "B", "version": "1", "indexes": [{"fields": ["field1"]}]},
        {"name": "C", "version": "1"}
    ])
}

fn store() -> InMemoryMetadataStore {
    let mut loader = SchemaLoader::new();
    loader.load_value("test", &schemas()).unwrap();
    loader.into_store()
}

fn memory() -> MemoryFinder {
    MemoryFinder::new()
        .with_documents(
            "A",
            vec![
                json!({"_id": "A01", "b_ref": ["B01", "B02"], "c_ref": "C01", "salary": 10}),
                json!({"_id": "A02", "b_ref": ["B03"], "c_ref": "C02", "salary": 20}),
                json!({"_id": "A03", "b_ref": []}),
            ],
        )
        .with_documents(
            "B",
            vec![
                json!({"_id": "B01", "field1": "x"}),
                json!({"_id": "B02", "field1": "y"}),
                json!({"_id": "B03", "field1": "x"}),
            ],
        )
        .with_documents("C", vec![json!({"_id": "C01", "n": 1}), json!({"_id": "C02", "n": 2})])
}

fn registry(finder: Arc<MemoryFinder>) -> FinderRegistry {
    FinderRegistry::new().with("memory", finder)
}

fn q(value: Value) -> QueryExpr {
    QueryExpr::from_json(&value).unwrap()
}

fn projection(fields: &[&str]) -> Projection {
    let items: Vec<Value> = fields
        .iter()
        .map(|f| json!({"field": f, "include": true, "recursive": true}))
        .collect();
    Projection::from_json(&Value::Array(items)).unwrap()
}

fn ids(docs: &[Value]) -> Vec<&str> {
    docs.iter().map(|d| d["_id"].as_str().unwrap_or_default()).collect()
}

/// Entity names of the plan's source nodes
fn source_entities(plan: &QueryPlan) -> Vec<String> {
    plan.sources()
        .into_iter()
        .map(|n| plan.node(n).name().rsplit_once('_').map(|(e, _)| e.to_string()).unwrap_or_default())
        .collect()
}

fn run(store: &InMemoryMetadataStore, finders: &FinderRegistry, request: &CompositeFindRequest) -> OperationContext {
    let finder = CompositeFinder::new(store, finders);
    let mut ctx = OperationContext::anonymous();
    finder.find(&mut ctx, request).unwrap();
    ctx
}

#[test]
fn root_predicate_searches_root_first() {
    let store = store();
    let finders = registry(Arc::new(memory()));
    let request = CompositeFindRequest::new("A")
        .with_query(q(json!({"field": "_id", "op": "=", "rvalue": "A01"})))
        .with_projection(projection(&["*", "b"]));

    let ctx = run(&store, &finders, &request);
    assert_eq!(ctx.match_count(), 1);
    let doc = &ctx.documents()[0];
    assert_eq!(doc["_id"], json!("A01"));
    assert_eq!(ids(doc["b"].as_array().unwrap()), vec!["B01", "B02"]);
    assert!(doc.get("c").is_none());
    assert_eq!(source_entities(ctx.query_plan().unwrap()), vec!["A"]);
    assert!(!ctx.has_errors());
}

#[test]
fn child_predicate_searches_child_first() {
    let store = store();
    let finders = registry(Arc::new(memory()));
    let request = CompositeFindRequest::new("A")
        .with_query(q(json!({"field": "b.*.field1", "op": "=", "rvalue": "x"})))
        .with_projection(projection(&["*", "b"]));

    let ctx = run(&store, &finders, &request);
    assert_eq!(source_entities(ctx.search_plan().unwrap()), vec!["B"]);
    assert_eq!(ctx.match_count(), 2);
    assert_eq!(ids(ctx.documents()), vec!["A01", "A02"]);
    assert_eq!(ctx.documents()[0]["b"], json!([{"_id": "B01", "field1": "x"}]));
    assert_eq!(ctx.documents()[1]["b"], json!([{"_id": "B03", "field1": "x"}]));
}

#[test]
fn no_matching_child_yields_empty_result() {
    let store = store();
    let finders = registry(Arc::new(memory()));
    let request = CompositeFindRequest::new("A").with_query(q(json!({"field": "b.*.field1", "op": "=", "rvalue": "zzz"})));

    let ctx = run(&store, &finders, &request);
    assert!(ctx.documents().is_empty());
    assert_eq!(ctx.match_count(), 0);
    assert!(!ctx.has_errors());
}

#[test]
fn projection_only_entity_is_retrieved() {
    let store = store();
    let finders = registry(Arc::new(memory()));
    let request = CompositeFindRequest::new("A")
        .with_query(q(json!({"field": "b.*.field1", "op": "=", "rvalue": "x"})))
        .with_projection(projection(&["*", "b", "c"]));

    let ctx = run(&store, &finders, &request);
    assert_eq!(ctx.search_plan().unwrap().nodes().len(), 2);
    assert_eq!(ctx.retrieval_plan().unwrap().nodes().len(), 3);
    assert_eq!(ctx.documents()[0]["c"], json!([{"_id": "C01", "n": 1}]));
    assert_eq!(ctx.documents()[1]["c"], json!([{"_id": "C02", "n": 2}]));
}

#[test]
fn repeated_find_is_identical() {
    let store = store();
    let finders = registry(Arc::new(memory()));
    let request = CompositeFindRequest::new("A")
        .with_query(q(json!({"$or": [
            {"field": "_id", "op": "=", "rvalue": "A03"},
            {"field": "b.*.field1", "op": "=", "rvalue": "y"}
        ]})))
        .with_projection(projection(&["*", "b", "c"]));

    let first = run(&store, &finders, &request);
    let second = run(&store, &finders, &request);
    assert_eq!(first.documents(), second.documents());
    assert_eq!(first.match_count(), second.match_count());
    assert_eq!(ids(first.documents()), vec!["A01", "A03"]);
}

#[test]
fn root_sort_and_range_apply_without_search() {
    let store = store();
    let finders = registry(Arc::new(memory()));
    let request = CompositeFindRequest::new("A").with_sort(Sort::desc("_id")).with_range(0, 1);

    let ctx = run(&store, &finders, &request);
    assert_eq!(ids(ctx.documents()), vec!["A03", "A02"]);
    assert_eq!(ctx.match_count(), 2);
}

#[test]
fn seeded_root_is_sorted_and_ranged_after_assembly() {
    let store = store();
    let finders = registry(Arc::new(memory()));
    let request = CompositeFindRequest::new("A")
        .with_query(q(json!({"field": "b.*.field1", "op": "=", "rvalue": "x"})))
        .with_sort(Sort::desc("_id"))
        .with_range(0, 0);

    let ctx = run(&store, &finders, &request);
    assert_eq!(ids(ctx.documents()), vec!["A02"]);
}

#[test]
fn metadata_errors_abort_before_any_fetch() {
    let memory = Arc::new(memory());
    let finders = registry(memory.clone());
    let mut ctx = OperationContext::anonymous();

    // Unknown entity
    let store = store();
    let err = CompositeFinder::new(&store, &finders)
        .find(&mut ctx, &CompositeFindRequest::new("Z"))
        .unwrap_err();
    assert_eq!(err.code(), "COMPOSITE_UNKNOWN_ENTITY");

    // Disabled root
    let disabled = InMemoryMetadataStore::new()
        .with(EntitySchema::new("A", "1").with_status(EntityStatus::Disabled))
        .unwrap();
    let err = CompositeFinder::new(&disabled, &finders)
        .find(&mut ctx, &CompositeFindRequest::new("A"))
        .unwrap_err();
    assert_eq!(err.code(), "COMPOSITE_DISABLED_METADATA");

    // Two explicit versions of the same entity
    let mut loader = SchemaLoader::new();
    loader
        .load_value(
            "conflict",
            &json!([
                {
                    "name": "A",
                    "version": "1",
                    "references": [
                        {"field": "b", "entity": "B", "version": "1", "query": {"field": "_id", "op": "$in", "rfield": "$parent.b_ref"}},
                        {"field": "old_b", "entity": "B", "version": "2", "query": {"field": "_id", "op": "$in", "rfield": "$parent.b_ref"}}
                    ]
                },
                {"name": "B", "version": "1"},
                {"name": "B", "version": "2"}
            ]),
        )
        .unwrap();
    let conflict = loader.into_store();
    let request = CompositeFindRequest::new("A").with_projection(projection(&["*", "b", "old_b"]));
    let err = CompositeFinder::new(&conflict, &finders).find(&mut ctx, &request).unwrap_err();
    assert_eq!(err.code(), "COMPOSITE_METADATA_VERSION_CONFLICT");
    assert!(err.is_fatal());

    assert_eq!(memory.calls("A"), 0);
    assert_eq!(memory.calls("B"), 0);
    assert!(ctx.documents().is_empty());
}

#[test]
fn backend_failures_are_recorded_with_partial_results() {
    let store = store();
    let finders = registry(Arc::new(memory().with_failure("C", "offline")));
    let request = CompositeFindRequest::new("A")
        .with_query(q(json!({"field": "_id", "op": "=", "rvalue": "A01"})))
        .with_projection(projection(&["*", "c"]));

    let ctx = run(&store, &finders, &request);
    assert_eq!(ctx.match_count(), 1);
    assert_eq!(ctx.documents()[0]["c"], json!([]));
    assert_eq!(ctx.errors().len(), 1);
    assert_eq!(ctx.errors()[0].code(), "COMPOSITE_BACKEND_FETCH");
    assert_eq!(ctx.errors()[0].entity(), "C");
}

#[test]
fn failing_document_does_not_discard_siblings() {
    let store = store();
    let finders = registry(Arc::new(memory().with_document_error("B", "B01", "corrupt")));
    let request = CompositeFindRequest::new("A")
        .with_query(q(json!({"field": "_id", "op": "$in", "values": ["A01", "A02"]})))
        .with_projection(projection(&["*", "b"]));

    let ctx = run(&store, &finders, &request);
    assert_eq!(ctx.errors().len(), 1);
    assert_eq!(ctx.documents()[0]["b"], json!([{"_id": "B02", "field1": "y"}]));
    assert_eq!(ctx.documents()[1]["b"], json!([{"_id": "B03", "field1": "x"}]));
}

#[test]
fn range_on_non_root_node_fails() {
    let store = store();
    let resolved = MetadataResolver::new(&store)
        .resolve("A", None, None, Some(&projection(&["*", "b"])))
        .unwrap();
    let plan = QueryPlanChooser::new(&resolved.metadata, &FirstEnumerator, &SimpleScorer, None)
        .choose()
        .unwrap();
    let mut execution = PlanExecution::new(&plan, &resolved.metadata);
    let child = plan.nodes().iter().find(|n| n.entity != 0).unwrap().id;

    let err = execution.set_range(child, Some(0), Some(1)).unwrap_err();
    assert!(matches!(err, ExecutorError::RangeOnNonRoot { .. }));
    assert_eq!(err.code(), "COMPOSITE_RANGE_ON_NON_ROOT");

    // The execution itself is still usable
    let finders = registry(Arc::new(memory()));
    let mut ctx = OperationContext::anonymous();
    execution.execute(&mut ctx, &mut DocumentCache::new(), &finders);
    assert_eq!(execution.node_docs(0).len(), 3);
}

#[test]
fn access_rules_remove_fields() {
    let store = store();
    let finders = registry(Arc::new(memory()));
    let request = CompositeFindRequest::new("A").with_query(q(json!({"field": "_id", "op": "=", "rvalue": "A01"})));

    let finder = CompositeFinder::new(&store, &finders).with_access(&RoleFieldAccess);
    let mut reader = OperationContext::new(["reader"]);
    finder.find(&mut reader, &request).unwrap();
    assert!(reader.documents()[0].get("salary").is_none());
    assert_eq!(reader.documents()[0]["_id"], json!("A01"));

    let mut hr = OperationContext::new(["hr"]);
    finder.find(&mut hr, &request).unwrap();
    assert_eq!(hr.documents()[0]["salary"], json!(10));
}

#[test]
fn shared_child_is_copied_into_each_parent() {
    let store = store();
    let finders = registry(Arc::new(
        MemoryFinder::new()
            .with_documents(
                "A",
                vec![json!({"_id": "A01", "b_ref": ["B01"]}), json!({"_id": "A02", "b_ref": ["B01"]})],
            )
            .with_documents("B", vec![json!({"_id": "B01", "field1": "x"})]),
    ));
    let request = CompositeFindRequest::new("A").with_projection(projection(&["*", "b"]));

    let ctx = run(&store, &finders, &request);
    let mut documents = ctx.into_documents();
    assert_eq!(documents[0]["b"], documents[1]["b"]);

    documents[0]["b"][0]["field1"] = json!("changed");
    assert_eq!(documents[1]["b"][0]["field1"], json!("x"));

    // A second find sees the original body
    let again = run(&store, &finders, &request);
    assert_eq!(again.documents()[0]["b"][0]["field1"], json!("x"));
}

#[test]
fn predicates_on_two_children_search_from_both() {
    let store = store();
    let finders = registry(Arc::new(memory()));
    let request = CompositeFindRequest::new("A")
        .with_query(q(json!({"$and": [
            {"field": "b.*.field1", "op": "=", "rvalue": "x"},
            {"field": "c.*.n", "op": "=", "rvalue": 2}
        ]})))
        .with_projection(projection(&["*", "b", "c"]));

    let ctx = run(&store, &finders, &request);
    let search = ctx.search_plan().unwrap();
    let mut sources = source_entities(search);
    sources.sort();
    assert_eq!(sources, vec!["B", "C"]);
    assert_eq!(search.incoming(0).len(), 2);

    assert_eq!(ids(ctx.documents()), vec!["A02"]);
    assert_eq!(ctx.match_count(), 1);
    assert_eq!(ctx.documents()[0]["c"], json!([{"_id": "C02", "n": 2}]));
    assert!(!ctx.has_errors());
}

/// Serves the first find of `entity` and fails every later one
struct FailsAfterFirstCall {
    inner: MemoryFinder,
    entity: &'static str,
    calls: AtomicUsize,
}

impl Finder for FailsAfterFirstCall {
    fn find(&self, ctx: &OperationContext, request: &FindRequest) -> FinderResult<FindResponse> {
        if request.entity == self.entity && self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
            return Err(FinderError::Backend("connection reset".into()));
        }
        self.inner.find(ctx, request)
    }
}

#[test]
fn searched_roots_survive_failed_child_retrieval() {
    let store = store();
    let finders = FinderRegistry::new().with(
        "memory",
        Arc::new(FailsAfterFirstCall {
            inner: memory(),
            entity: "B",
            calls: AtomicUsize::new(0),
        }),
    );
    let request = CompositeFindRequest::new("A")
        .with_query(q(json!({"field": "b.*.field1", "op": "=", "rvalue": "x"})))
        .with_projection(projection(&["*", "b"]));

    let ctx = run(&store, &finders, &request);
    assert_eq!(ids(ctx.documents()), vec!["A01", "A02"]);
    assert_eq!(ctx.match_count(), 2);
    assert_eq!(ctx.documents()[0]["b"], json!([]));
    assert_eq!(ctx.errors().len(), 2);
    assert!(ctx.errors().iter().all(|e| e.entity() == "B"));
}

#[test]
fn metadata_roles_are_reported() {
    let mut loader = SchemaLoader::new();
    loader
        .load_value(
            "roles",
            &json!([
                {
                    "name": "A",
                    "version": "1",
                    "references": [
                        {"field": "b", "entity": "B", "query": {"field": "_id", "op": "$in", "rfield": "$parent.b_ref"}}
                    ],
                    "access": {"find": ["reader"], "fields": {"salary": ["hr"]}}
                },
                {"name": "B", "version": "1", "access": {"update": ["editor"]}}
            ]),
        )
        .unwrap();
    let store = loader.into_store();
    let finders = registry(Arc::new(memory()));

    let ctx = run(&store, &finders, &CompositeFindRequest::new("A"));
    let expected: BTreeSet<String> = ["hr", "reader"].iter().map(|r| r.to_string()).collect();
    assert_eq!(ctx.metadata_roles(), &expected);

    let request = CompositeFindRequest::new("A").with_projection(projection(&["*", "b"]));
    let ctx = run(&store, &finders, &request);
    let expected: BTreeSet<String> = ["editor", "hr", "reader"].iter().map(|r| r.to_string()).collect();
    assert_eq!(ctx.metadata_roles(), &expected);
}

#[test]
fn explicit_version_deeper_in_the_tree_wins_over_default() {
    let mut loader = SchemaLoader::new();
    loader
        .load_value(
            "versions",
            &json!([
                {
                    "name": "A",
                    "version": "1",
                    "references": [
                        {"field": "c", "entity": "C", "query": {"field": "_id", "op": "=", "rfield": "$parent.c_ref"}},
                        {"field": "b", "entity": "B", "query": {"field": "_id", "op": "$in", "rfield": "$parent.b_ref"}}
                    ]
                },
                {
                    "name": "B",
                    "version": "1",
                    "references": [
                        {"field": "c", "entity": "C", "version": "2", "query": {"field": "_id", "op": "=", "rfield": "$parent.c_ref"}}
                    ]
                },
                {"name": "C", "version": "1"},
                {"name": "C", "version": "2"}
            ]),
        )
        .unwrap();
    let store = loader.into_store();
    let finders = registry(Arc::new(memory()));
    let request = CompositeFindRequest::new("A")
        .with_query(q(json!({"field": "_id", "op": "=", "rvalue": "A01"})))
        .with_projection(projection(&["*", "c", "b", "b.*.c"]));

    let resolved = MetadataResolver::new(&store)
        .resolve("A", None, request.query.as_ref(), request.projection.as_ref())
        .unwrap();
    let versions: Vec<(&str, &str)> = resolved
        .metadata
        .entities()
        .iter()
        .map(|e| (e.name(), e.schema.version.as_str()))
        .collect();
    assert_eq!(versions, vec![("A", "1"), ("C", "2"), ("B", "1"), ("C", "2")]);

    let ctx = run(&store, &finders, &request);
    assert_eq!(ctx.retrieval_plan().unwrap().nodes().len(), 4);
    assert_eq!(ctx.documents()[0]["c"], json!([{"_id": "C01", "n": 1}]));
    assert!(!ctx.has_errors());
}
