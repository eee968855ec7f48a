//! Index specs derived from query expressions
//!
//! Given a query, picks the key spec worth indexing documents by and the
//! lookup that selects the candidates for that query. The lookup returns a
//! superset of the matching documents; callers still evaluate the query.

use serde_json::Value;

use super::key::{Key, KeySpec};
use super::lookup::LookupSpec;
use crate::query::{CmpOp, ContainsOp, Path, QueryExpr};

/// Key spec and lookup for a query, or `None` when the query has no
/// indexable part
pub fn index_specs(query: &QueryExpr) -> Option<(KeySpec, LookupSpec)> {
    match query {
        QueryExpr::Value { field, op, value } => value_specs(field, *op, value),
        QueryExpr::Regex {
            field,
            pattern,
            case_insensitive,
        } => {
            let prefix = regex_prefix(pattern)?;
            Some((
                KeySpec::Simple(field.clone()),
                LookupSpec::Prefix {
                    prefix,
                    case_insensitive: *case_insensitive,
                },
            ))
        }
        QueryExpr::In {
            field,
            values,
            negate: false,
        } => Some((KeySpec::Simple(field.clone()), LookupSpec::MultiValue(scalar_keys(values)?))),
        QueryExpr::Contains {
            array,
            op: ContainsOp::Any,
            values,
        } => Some((KeySpec::Simple(array.clone()), LookupSpec::MultiValue(scalar_keys(values)?))),
        QueryExpr::Or(items) => same_field_values(items),
        QueryExpr::And(items) => {
            let mut specs: Vec<(KeySpec, LookupSpec)> = items.iter().filter_map(index_specs).collect();
            match specs.len() {
                0 => None,
                1 => specs.pop(),
                _ => {
                    let (keys, lookups) = specs.into_iter().unzip();
                    Some((KeySpec::Composite(keys), LookupSpec::Composite(lookups)))
                }
            }
        }
        QueryExpr::ElemMatch { array, query } => {
            let (key, lookup) = index_specs(query)?;
            let (fields, lookups) = match (key, lookup) {
                (KeySpec::Composite(keys), LookupSpec::Composite(lookups)) => (keys, lookups),
                (key, lookup) => (vec![key], vec![lookup]),
            };
            Some((
                KeySpec::Array {
                    array: array.clone(),
                    fields,
                },
                LookupSpec::Array(lookups),
            ))
        }
        _ => None,
    }
}

fn value_specs(field: &Path, op: CmpOp, value: &Value) -> Option<(KeySpec, LookupSpec)> {
    let key = Key::from_query_value(value)?;
    let lookup = match op {
        CmpOp::Eq => LookupSpec::Value(key),
        CmpOp::Ne => return None,
        _ if key == Key::Null => return None,
        CmpOp::Lt | CmpOp::Lte => LookupSpec::Range { min: None, max: Some(key) },
        CmpOp::Gt | CmpOp::Gte => LookupSpec::Range { min: Some(key), max: None },
    };
    Some((KeySpec::Simple(field.clone()), lookup))
}

fn scalar_keys(values: &[Value]) -> Option<Vec<Key>> {
    values.iter().map(Key::from_query_value).collect()
}

/// `$or` of equalities and `$in`s over one field is a multi-value lookup
fn same_field_values(items: &[QueryExpr]) -> Option<(KeySpec, LookupSpec)> {
    let mut field: Option<&Path> = None;
    let mut keys: Vec<Key> = Vec::new();
    for item in items {
        let (f, values): (&Path, Vec<Key>) = match item {
            QueryExpr::Value {
                field,
                op: CmpOp::Eq,
                value,
            } => (field, vec![Key::from_query_value(value)?]),
            QueryExpr::In {
                field,
                values,
                negate: false,
            } => (field, scalar_keys(values)?),
            _ => return None,
        };
        match field {
            Some(existing) if existing != f => return None,
            _ => field = Some(f),
        }
        for key in values {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }
    Some((KeySpec::Simple(field?.clone()), LookupSpec::MultiValue(keys)))
}

/// Literal prefix of an anchored regex, `None` if the pattern is not
/// anchored or starts with a metacharacter
pub fn regex_prefix(pattern: &str) -> Option<String> {
    let body = pattern.strip_prefix('^').or_else(|| pattern.strip_prefix("\\A"))?;
    // An alternation may escape the anchor
    if body.contains('|') {
        return None;
    }
    let mut prefix = String::new();
    let mut chars = body.chars().peekable();
    while let Some(&c) = chars.peek() {
        if "\\^$.|?*+()[]{}".contains(c) {
            // A quantifier makes the preceding literal optional
            if matches!(c, '?' | '*' | '{') {
                prefix.pop();
            }
            break;
        }
        prefix.push(c);
        chars.next();
    }
    if prefix.is_empty() {
        None
    } else {
        Some(prefix)
    }
}
