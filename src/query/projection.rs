//! Projections and the field projector
//!
//! JSON form: one item or an array of items,
//! `{"field": "a.b", "include": true, "recursive": false}`. `include`
//! defaults to true and `recursive` to false. Items are evaluated in order
//! and the last item matching a field decides whether it is included.

use serde::de::Deserializer;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Map, Value};

use super::errors::{QueryError, QueryResult};
use super::path::{is_index, Path, ANY};

/// One projection item
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionItem {
    pub field: Path,
    pub include: bool,
    pub recursive: bool,
}

impl ProjectionItem {
    pub fn include(field: impl Into<Path>, recursive: bool) -> Self {
        Self {
            field: field.into(),
            include: true,
            recursive,
        }
    }

    pub fn exclude(field: impl Into<Path>) -> Self {
        Self {
            field: field.into(),
            include: false,
            recursive: true,
        }
    }

    fn matches(&self, path: &Path) -> bool {
        if self.recursive {
            path.matches_prefix(&self.field)
        } else {
            path.matches(&self.field)
        }
    }

    /// True if this item names `path` (or something under it) without a
    /// wildcard standing in for one of the named segments of `path`.
    fn names(&self, path: &Path) -> bool {
        if !self.include || self.field.len() < path.len() {
            return false;
        }
        path.segments()
            .iter()
            .zip(self.field.segments())
            .all(|(p, f)| if p == ANY || is_index(p) { f == ANY || is_index(f) } else { p == f })
    }
}

/// Ordered list of projection items
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Projection {
    pub items: Vec<ProjectionItem>,
}

impl Projection {
    pub fn new(items: Vec<ProjectionItem>) -> Self {
        Self { items }
    }

    /// Every field, recursively
    pub fn all() -> Self {
        Self::new(vec![ProjectionItem::include(ANY, true)])
    }

    /// This projection followed by a recursive exclusion of each path
    pub fn with_exclusions(&self, paths: &[Path]) -> Self {
        let mut items = self.items.clone();
        items.extend(paths.iter().cloned().map(ProjectionItem::exclude));
        Self { items }
    }

    /// Inclusion decision for a concrete field path, `None` if no item
    /// matches it.
    pub fn field_inclusion(&self, path: &Path) -> Option<bool> {
        self.items.iter().rev().find(|item| item.matches(path)).map(|item| item.include)
    }

    /// True if some inclusion item names `path` explicitly (not through a
    /// wildcard that happens to match it)
    pub fn explicitly_includes(&self, path: &Path) -> bool {
        self.items.iter().any(|item| item.names(path))
    }

    pub fn from_json(value: &Value) -> QueryResult<Self> {
        let items = match value {
            Value::Array(items) => items.iter().map(parse_item).collect::<QueryResult<Vec<_>>>()?,
            other => vec![parse_item(other)?],
        };
        Ok(Self { items })
    }

    pub fn to_json(&self) -> Value {
        Value::Array(
            self.items
                .iter()
                .map(|i| json!({"field": i.field.to_string(), "include": i.include, "recursive": i.recursive}))
                .collect(),
        )
    }
}

fn parse_item(value: &Value) -> QueryResult<ProjectionItem> {
    let obj = value
        .as_object()
        .ok_or_else(|| QueryError::MalformedProjection(format!("expected an object, got {}", value)))?;
    let field = obj
        .get("field")
        .and_then(Value::as_str)
        .ok_or_else(|| QueryError::MalformedProjection(format!("missing field in {}", value)))?;
    Ok(ProjectionItem {
        field: Path::parse(field),
        include: flag(obj.get("include"), true)?,
        recursive: flag(obj.get("recursive"), false)?,
    })
}

/// Booleans, with 0/1 accepted as well
fn flag(value: Option<&Value>, default: bool) -> QueryResult<bool> {
    match value {
        None => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::Number(n)) if n.as_i64() == Some(0) => Ok(false),
        Some(Value::Number(n)) if n.as_i64() == Some(1) => Ok(true),
        Some(other) => Err(QueryError::MalformedProjection(format!("expected a boolean, got {}", other))),
    }
}

impl Serialize for Projection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Projection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Projection::from_json(&value).map_err(serde::de::Error::custom)
    }
}

/// Applies a projection to an assembled document
pub trait Projector: Send + Sync {
    fn project(&self, doc: &Value, projection: &Projection) -> Value;
}

/// Projector keeping exactly the fields the projection includes.
///
/// A container is kept when it is included itself or when any of its
/// descendants is. An array element without a decision of its own follows
/// the array.
#[derive(Debug, Default, Clone, Copy)]
pub struct FieldProjector;

impl FieldProjector {
    fn project_value(&self, value: &Value, path: &Path, inherited: Option<bool>, projection: &Projection) -> Option<Value> {
        let decision = projection.field_inclusion(path).or(inherited);
        match value {
            Value::Object(map) => {
                let mut out = Map::new();
                for (key, child) in map {
                    if let Some(v) = self.project_value(child, &path.push(key.as_str()), None, projection) {
                        out.insert(key.clone(), v);
                    }
                }
                if !out.is_empty() || decision == Some(true) {
                    Some(Value::Object(out))
                } else {
                    None
                }
            }
            Value::Array(items) => {
                let out: Vec<Value> = items
                    .iter()
                    .enumerate()
                    .filter_map(|(i, child)| self.project_value(child, &path.push(i.to_string()), decision, projection))
                    .collect();
                if !out.is_empty() || decision == Some(true) {
                    Some(Value::Array(out))
                } else {
                    None
                }
            }
            scalar => (decision == Some(true)).then(|| scalar.clone()),
        }
    }
}

impl Projector for FieldProjector {
    fn project(&self, doc: &Value, projection: &Projection) -> Value {
        match doc {
            Value::Object(_) => self
                .project_value(doc, &Path::empty(), None, projection)
                .unwrap_or_else(|| Value::Object(Map::new())),
            other => other.clone(),
        }
    }
}
