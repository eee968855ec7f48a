//! Sort specifications
//!
//! JSON form: `{"field": "$asc"}` or an array of such objects, most
//! significant key first.

use std::cmp::Ordering;

use serde::de::Deserializer;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use super::errors::{QueryError, QueryResult};
use super::eval::sort_order;
use super::path::{values_at, Path};

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One sort key
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub field: Path,
    pub direction: SortDirection,
}

/// Ordered list of sort keys
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sort {
    pub keys: Vec<SortKey>,
}

impl Sort {
    pub fn asc(field: impl Into<Path>) -> Self {
        Self {
            keys: vec![SortKey {
                field: field.into(),
                direction: SortDirection::Asc,
            }],
        }
    }

    pub fn desc(field: impl Into<Path>) -> Self {
        Self {
            keys: vec![SortKey {
                field: field.into(),
                direction: SortDirection::Desc,
            }],
        }
    }

    /// Adds a less significant key
    pub fn then(mut self, field: impl Into<Path>, direction: SortDirection) -> Self {
        self.keys.push(SortKey {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn from_json(value: &Value) -> QueryResult<Self> {
        let mut keys = Vec::new();
        match value {
            Value::Array(items) => {
                for item in items {
                    parse_keys(item, &mut keys)?;
                }
            }
            other => parse_keys(other, &mut keys)?,
        }
        Ok(Self { keys })
    }

    pub fn to_json(&self) -> Value {
        Value::Array(
            self.keys
                .iter()
                .map(|k| {
                    let dir = match k.direction {
                        SortDirection::Asc => "$asc",
                        SortDirection::Desc => "$desc",
                    };
                    let mut obj = Map::new();
                    obj.insert(k.field.to_string(), Value::String(dir.to_string()));
                    Value::Object(obj)
                })
                .collect(),
        )
    }

    /// Compares two documents. A missing field sorts before any value.
    ///
    /// When a path reaches several values, the smallest one is used for an
    /// ascending key and the largest for a descending key.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        for key in &self.keys {
            let ordering = match key.direction {
                SortDirection::Asc => compare_opt(sort_value(a, key), sort_value(b, key)),
                SortDirection::Desc => compare_opt(sort_value(a, key), sort_value(b, key)).reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Stable sort of arbitrary items by the document each one carries
    pub fn sort_by_document<T>(&self, items: &mut [T], body: impl Fn(&T) -> &Value) {
        if self.keys.is_empty() {
            return;
        }
        items.sort_by(|x, y| self.compare(body(x), body(y)));
    }
}

fn parse_keys(item: &Value, keys: &mut Vec<SortKey>) -> QueryResult<()> {
    let obj = item
        .as_object()
        .ok_or_else(|| QueryError::MalformedSort(format!("expected an object, got {}", item)))?;
    for (field, dir) in obj {
        let direction = match dir.as_str() {
            Some("$asc") | Some("asc") => SortDirection::Asc,
            Some("$desc") | Some("desc") => SortDirection::Desc,
            _ => return Err(QueryError::MalformedSort(format!("bad direction for {}: {}", field, dir))),
        };
        keys.push(SortKey {
            field: Path::parse(field),
            direction,
        });
    }
    Ok(())
}

fn sort_value<'a>(doc: &'a Value, key: &SortKey) -> Option<&'a Value> {
    let mut found = values_at(doc, &key.field).into_iter().map(|(_, v)| v);
    let first = found.next()?;
    Some(found.fold(first, |best, v| {
        let ord = sort_order(v, best);
        match key.direction {
            SortDirection::Asc if ord == Ordering::Less => v,
            SortDirection::Desc if ord == Ordering::Greater => v,
            _ => best,
        }
    }))
}

fn compare_opt(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => sort_order(x, y),
    }
}

impl Serialize for Sort {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Sort {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Sort::from_json(&value).map_err(serde::de::Error::custom)
    }
}
