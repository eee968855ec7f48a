//! Index keys and key specifications
//!
//! A `Key` is a hashable image of a field value. Floats are stored as
//! order-preserving bits; integral floats are normalized to `Int` so that
//! `1` and `1.0` produce the same key.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde_json::Value;

use super::errors::{IndexError, IndexResult};
use crate::query::path::{values_at, Path};
use crate::tuples::Tuples;

/// 2^53: beyond this magnitude integers and floats stop comparing exactly
const EXACT_INT_LIMIT: f64 = 9_007_199_254_740_992.0;

/// Index key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// Absent or null field
    Null,
    Bool(bool),
    Int(i64),
    /// Float value (stored as bits for total ordering)
    Float(u64),
    String(String),
    /// Positional key of a composite or array key spec
    Tuple(Vec<Key>),
}

impl Key {
    /// Create a key from a float
    ///
    /// Uses bit representation for total ordering.
    pub fn from_float(v: f64) -> Self {
        if v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 {
            return Key::Int(v as i64);
        }
        let bits = v.to_bits();
        // Negative: flip all bits. Positive: flip sign bit.
        let ordered = if (bits >> 63) == 1 { !bits } else { bits ^ (1 << 63) };
        Key::Float(ordered)
    }

    /// Key for a query literal. Numbers at or beyond 2^53 have none: query
    /// evaluation compares them through `f64`, which keys cannot mirror.
    pub fn from_query_value(value: &Value) -> Option<Self> {
        if let Value::Number(n) = value {
            if n.as_f64()?.abs() >= EXACT_INT_LIMIT {
                return None;
            }
        }
        Self::from_json(value)
    }

    /// Key for a scalar JSON value; arrays and objects have none
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Key::Null),
            Value::Bool(b) => Some(Key::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Key::Int(i))
                } else {
                    n.as_f64().map(Key::from_float)
                }
            }
            Value::String(s) => Some(Key::String(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    fn float_value(&self) -> Option<f64> {
        match self {
            Key::Int(i) => Some(*i as f64),
            Key::Float(ordered) => {
                let bits = if (ordered >> 63) == 1 { ordered ^ (1 << 63) } else { !ordered };
                Some(f64::from_bits(bits))
            }
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Key::Null => "null",
            Key::Bool(_) => "bool",
            Key::Int(_) => "int",
            Key::Float(_) => "float",
            Key::String(_) => "string",
            Key::Tuple(_) => "tuple",
        }
    }

    /// Ordering of two non-tuple keys. Null sorts before everything;
    /// integers and floats compare numerically; other type pairs have no
    /// ordering.
    pub fn compare_scalar(&self, other: &Key) -> Option<Ordering> {
        match (self, other) {
            (Key::Null, Key::Null) => Some(Ordering::Equal),
            (Key::Null, Key::Tuple(_)) | (Key::Tuple(_), Key::Null) => None,
            (Key::Null, _) => Some(Ordering::Less),
            (_, Key::Null) => Some(Ordering::Greater),
            (Key::Bool(a), Key::Bool(b)) => Some(a.cmp(b)),
            (Key::Int(a), Key::Int(b)) => Some(a.cmp(b)),
            (Key::Float(a), Key::Float(b)) => Some(a.cmp(b)),
            (Key::Int(_), Key::Float(_)) | (Key::Float(_), Key::Int(_)) => {
                self.float_value()?.partial_cmp(&other.float_value()?)
            }
            (Key::String(a), Key::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// Which part of a document an index keys on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeySpec {
    /// One field
    Simple(Path),
    /// Several fields; keys are tuples in child order
    Composite(Vec<KeySpec>),
    /// Fields inside the elements of an array, children relative to the
    /// element. One tuple per element.
    Array { array: Path, fields: Vec<KeySpec> },
}

impl KeySpec {
    /// Every key the document yields. An absent field yields `Null`.
    pub fn extract(&self, doc: &Value) -> HashSet<Key> {
        let mut keys = HashSet::new();
        self.extract_into(doc, &mut keys);
        if keys.is_empty() {
            keys.insert(Key::Null);
        }
        keys
    }

    fn extract_into(&self, doc: &Value, out: &mut HashSet<Key>) {
        match self {
            KeySpec::Simple(path) => {
                let found = values_at(doc, path);
                if found.is_empty() {
                    out.insert(Key::Null);
                }
                for (_, value) in found {
                    match value {
                        Value::Array(items) => out.extend(items.iter().filter_map(Key::from_json)),
                        other => out.extend(Key::from_json(other)),
                    }
                }
            }
            KeySpec::Composite(children) => out.extend(cross_product(children, doc)),
            KeySpec::Array { array, fields } => {
                for (_, value) in values_at(doc, array) {
                    if let Value::Array(items) = value {
                        for item in items {
                            out.extend(cross_product(fields, item));
                        }
                    }
                }
            }
        }
    }

    /// Compares two keys produced by this spec.
    ///
    /// Tuples compare positionally with the child specs and stop at the
    /// first unequal position.
    pub fn compare(&self, a: &Key, b: &Key) -> IndexResult<Ordering> {
        let children = match self {
            KeySpec::Simple(_) => {
                return a.compare_scalar(b).ok_or_else(|| mismatch(a, b));
            }
            KeySpec::Composite(children) => children,
            KeySpec::Array { fields, .. } => fields,
        };
        match (a, b) {
            (Key::Null, Key::Null) => Ok(Ordering::Equal),
            (Key::Null, Key::Tuple(_)) => Ok(Ordering::Less),
            (Key::Tuple(_), Key::Null) => Ok(Ordering::Greater),
            (Key::Tuple(xs), Key::Tuple(ys)) if xs.len() == children.len() && ys.len() == children.len() => {
                for ((spec, x), y) in children.iter().zip(xs).zip(ys) {
                    let ordering = spec.compare(x, y)?;
                    if ordering != Ordering::Equal {
                        return Ok(ordering);
                    }
                }
                Ok(Ordering::Equal)
            }
            _ => Err(mismatch(a, b)),
        }
    }
}

fn mismatch(a: &Key, b: &Key) -> IndexError {
    IndexError::KeyTypeMismatch {
        left: a.type_name().to_string(),
        right: b.type_name().to_string(),
    }
}

/// One tuple key per combination of child keys
fn cross_product(children: &[KeySpec], doc: &Value) -> Vec<Key> {
    let per_child: Vec<Vec<Key>> = children.iter().map(|c| c.extract(doc).into_iter().collect()).collect();
    let mut tuples = Tuples::new();
    for keys in &per_child {
        tuples.add(keys.as_slice());
    }
    tuples
        .iter()
        .map(|tuple| Key::Tuple(tuple.into_iter().cloned().collect()))
        .collect()
}
