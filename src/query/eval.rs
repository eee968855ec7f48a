//! Query evaluation against JSON documents
//!
//! Evaluation is existential: a comparison holds if it holds for any value
//! reached by the field path, arrays at the leaf included element-wise. An
//! absent field compares as `null`. Values of different types never
//! compare, so a type mismatch never matches (except for `!=`).

use std::cmp::Ordering;

use regex::RegexBuilder;
use serde_json::Value;

use super::ast::{CmpOp, ContainsOp, QueryExpr};
use super::path::{leaf_values, values_at};

impl QueryExpr {
    /// True if the document satisfies the expression
    pub fn evaluate(&self, doc: &Value) -> bool {
        match self {
            QueryExpr::Value { field, op, value } => {
                let found = leaf_values(doc, field);
                match op {
                    CmpOp::Ne => !found.iter().any(|v| values_equal(v, value)),
                    _ => found.iter().any(|v| compare(v, *op, value)),
                }
            }
            QueryExpr::Field { field, op, rfield } => {
                let left = leaf_values(doc, field);
                let right = leaf_values(doc, rfield);
                match op {
                    CmpOp::Ne => !left.iter().any(|l| right.iter().any(|r| values_equal(l, r))),
                    _ => left.iter().any(|l| right.iter().any(|r| compare(l, *op, r))),
                }
            }
            QueryExpr::Regex {
                field,
                pattern,
                case_insensitive,
            } => {
                let Ok(re) = RegexBuilder::new(pattern).case_insensitive(*case_insensitive).build() else {
                    return false;
                };
                leaf_values(doc, field)
                    .iter()
                    .any(|v| v.as_str().map(|s| re.is_match(s)).unwrap_or(false))
            }
            QueryExpr::In {
                field,
                values,
                negate,
            } => {
                let hit = leaf_values(doc, field)
                    .iter()
                    .any(|v| values.iter().any(|c| values_equal(v, c)));
                hit != *negate
            }
            QueryExpr::FieldIn {
                field,
                rfield,
                negate,
            } => {
                let candidates = array_elements(doc, rfield);
                let hit = leaf_values(doc, field)
                    .iter()
                    .any(|v| candidates.iter().any(|c| values_equal(v, c)));
                hit != *negate
            }
            QueryExpr::Contains { array, op, values } => {
                let elements = array_elements(doc, array);
                let contains = |v: &Value| elements.iter().any(|e| values_equal(e, v));
                match op {
                    ContainsOp::Any => values.iter().any(contains),
                    ContainsOp::All => values.iter().all(contains),
                    ContainsOp::None => !values.iter().any(contains),
                }
            }
            QueryExpr::ElemMatch { array, query } => values_at(doc, array).iter().any(|(_, v)| match v {
                Value::Array(items) => items.iter().any(|item| query.evaluate(item)),
                _ => false,
            }),
            QueryExpr::And(items) => items.iter().all(|q| q.evaluate(doc)),
            QueryExpr::Or(items) => items.iter().any(|q| q.evaluate(doc)),
            QueryExpr::Not(q) => !q.evaluate(doc),
            QueryExpr::Const(b) => *b,
        }
    }
}

/// Elements of every array found at `path`
fn array_elements(doc: &Value, path: &super::path::Path) -> Vec<Value> {
    values_at(doc, path)
        .into_iter()
        .flat_map(|(_, v)| match v {
            Value::Array(items) => items.clone(),
            _ => Vec::new(),
        })
        .collect()
}

fn compare(left: &Value, op: CmpOp, right: &Value) -> bool {
    match compare_values(left, right) {
        Some(ordering) => op.test(ordering),
        None => false,
    }
}

/// Equality with numeric values compared by magnitude (`1 == 1.0`)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// Ordering of two scalar values of the same type. `null` equals `null`.
/// Anything else (mixed types, arrays, objects) has no ordering.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(i), Some(j)) => Some(i.cmp(&j)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Total ordering used for sorting: null < bool < number < string < array
/// < object, natural order within a type.
pub fn sort_order(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    rank(a)
        .cmp(&rank(b))
        .then_with(|| compare_values(a, b).unwrap_or(Ordering::Equal))
}
