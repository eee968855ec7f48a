//! CLI command implementations
//!
//! Both commands load a fixture, build an in-memory metadata store and a
//! memory finder from it, and run one request against them.
//!
//! Fixture format:
//!
//! ```json
//! {
//!   "schemas": [ { "name": "A", "version": "1", ... } ],
//!   "data": { "A": [ { "_id": "A01" } ] },
//!   "roles": ["reader"]
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::RoleFieldAccess;
use crate::config::FinderConfig;
use crate::context::OperationContext;
use crate::executor::{CompositeFindRequest, CompositeFinder};
use crate::finder::{FinderRegistry, MemoryFinder};
use crate::observability::Event;
use crate::schema::{InMemoryMetadataStore, SchemaLoader};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{read_json_file, read_request, write_error, write_response};

/// Schemas, documents per entity and the caller's roles
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub schemas: Vec<Value>,

    #[serde(default)]
    pub data: BTreeMap<String, Vec<Value>>,

    #[serde(default)]
    pub roles: Vec<String>,
}

impl Fixture {
    pub fn load(path: &Path) -> CliResult<Self> {
        let value = read_json_file(path)?;
        let fixture: Fixture = serde_json::from_value(value)
            .map_err(|e| CliError::fixture_error(format!("{}: {}", path.display(), e)))?;
        if fixture.schemas.is_empty() {
            return Err(CliError::fixture_error(format!("{}: no schemas", path.display())));
        }
        Ok(fixture)
    }

    /// Metadata store holding every fixture schema
    pub fn store(&self) -> CliResult<InMemoryMetadataStore> {
        let mut loader = SchemaLoader::new();
        loader.load_value("fixture", &Value::Array(self.schemas.clone()))?;
        Event::SchemasLoaded.log(&[("schemas", &loader.schema_count().to_string())]);
        Ok(loader.into_store())
    }

    /// One memory finder holding every document, registered for every
    /// backend the schemas name
    pub fn finders(&self, store: &InMemoryMetadataStore, config: &FinderConfig) -> FinderRegistry {
        let mut finder = MemoryFinder::new();
        for (entity, docs) in &self.data {
            finder = finder.with_documents(entity.clone(), docs.clone());
        }
        if !config.use_memory_index {
            finder = finder.without_index();
        }
        let finder = Arc::new(finder);

        let backends: BTreeSet<&str> = store.all_schemas().map(|s| s.backend.as_str()).collect();
        let mut registry = FinderRegistry::new();
        for backend in backends {
            registry.register(backend, finder.clone());
        }
        registry
    }
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Find {
            fixture,
            request,
            config,
        } => find(&fixture, request.as_deref(), config.as_deref()),
        Command::Explain {
            fixture,
            request,
            config,
        } => explain(&fixture, request.as_deref(), config.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> CliResult<FinderConfig> {
    let config = match path {
        Some(path) => {
            let config = FinderConfig::load(path)?;
            Event::ConfigLoaded.log(&[("path", &path.display().to_string())]);
            config
        }
        None => FinderConfig::default(),
    };
    Ok(config)
}

fn load_request(path: Option<&Path>) -> CliResult<CompositeFindRequest> {
    let value = match path {
        Some(path) => read_json_file(path)?,
        None => read_request()?,
    };
    Ok(CompositeFindRequest::from_json(&value)?)
}

/// Everything a command needs, loaded from disk
struct Session {
    fixture: Fixture,
    store: InMemoryMetadataStore,
    finders: FinderRegistry,
    config: FinderConfig,
    request: CompositeFindRequest,
}

impl Session {
    fn open(fixture_path: &Path, request: Option<&Path>, config: Option<&Path>) -> CliResult<Self> {
        let config = load_config(config)?;
        let fixture = Fixture::load(fixture_path)?;
        let store = fixture.store()?;
        let finders = fixture.finders(&store, &config);
        Event::FixtureLoaded.log(&[
            ("path", &fixture_path.display().to_string()),
            ("entities", &fixture.data.len().to_string()),
        ]);
        let request = load_request(request)?;
        Ok(Self {
            fixture,
            store,
            finders,
            config,
            request,
        })
    }
}

/// Run a composite find and print the response
pub fn find(fixture: &Path, request: Option<&Path>, config: Option<&Path>) -> CliResult<()> {
    let session = Session::open(fixture, request, config)?;
    let finder = CompositeFinder::new(&session.store, &session.finders)
        .with_access(&RoleFieldAccess)
        .with_config(session.config.clone());
    let mut ctx = OperationContext::new(session.fixture.roles.clone());

    if let Err(e) = finder.find(&mut ctx, &session.request) {
        write_error(e.code(), &e.to_string())?;
        return Err(e.into());
    }
    write_response(find_response(&ctx))
}

/// The response body of a completed find
pub(crate) fn find_response(ctx: &OperationContext) -> Value {
    let errors: Vec<Value> = ctx
        .errors()
        .iter()
        .map(|e| {
            json!({
                "code": e.code(),
                "entity": e.entity(),
                "message": e.to_string(),
            })
        })
        .collect();
    json!({
        "request_id": ctx.request_id().to_string(),
        "match_count": ctx.match_count(),
        "documents": ctx.documents(),
        "errors": errors,
        "metadata_roles": ctx.metadata_roles(),
        "plans": {
            "search": ctx.search_plan().map(|p| p.tree_string()),
            "retrieval": ctx.retrieval_plan().map(|p| p.tree_string()),
        },
    })
}

/// Print the plans a find would use
pub fn explain(fixture: &Path, request: Option<&Path>, config: Option<&Path>) -> CliResult<()> {
    let session = Session::open(fixture, request, config)?;
    let finder = CompositeFinder::new(&session.store, &session.finders).with_config(session.config.clone());

    let plans = match finder.explain(&session.request) {
        Ok(plans) => plans,
        Err(e) => {
            write_error(e.code(), &e.to_string())?;
            return Err(e.into());
        }
    };
    let plans: Vec<Value> = plans.iter().map(|p| p.to_json()).collect();
    write_response(json!({ "plans": plans }))
}
