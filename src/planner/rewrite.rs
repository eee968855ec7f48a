//! Query rewriting ahead of conjunct attribution
//!
//! Turns a request query into an equivalent one whose top-level `$and`
//! splits into more, narrower clauses. Rules run bottom-up, repeatedly,
//! until the query stops changing:
//!
//! - `$not $not q` is `q`
//! - `$not $or [a, b]` is `$and [$not a, $not b]`
//! - `$not` of an equality, `$in`, or `$any`/`$none` test is the negated test
//! - nested `$and`s are promoted into their parent
//! - an `$and` or `$or` of one clause is that clause
//! - equalities and `$in`s on one field inside an `$or` merge into one `$in`
//! - inequalities and `$nin`s on one field inside an `$and` merge into one
//!   `$nin`
//! - `$elemMatch` over a single comparison is the comparison on
//!   `array.*.field`
//!
//! Every rule preserves [`QueryExpr::evaluate`] exactly. Rules that would
//! not (negating an ordering, comparisons against `null`, arrays or
//! objects) are left out.

use serde_json::Value;
use tracing::debug;

use crate::query::path::ANY;
use crate::query::{values_equal, CmpOp, ContainsOp, Path, QueryExpr};

type Rule = fn(QueryExpr) -> QueryExpr;

const RULES: &[Rule] = &[
    eliminate_not_not,
    eliminate_not_or,
    eliminate_not,
    promote_nested_and,
    eliminate_single_and_or,
    combine_in_or,
    combine_nin_in_and,
    simple_elem_match,
];

/// Rewrites `query` until no rule applies
pub fn rewrite_query(query: &QueryExpr) -> QueryExpr {
    let mut current = query.clone();
    loop {
        let next = rewrite_pass(&current);
        if next == current {
            break;
        }
        current = next;
    }
    if &current != query {
        debug!(before = %query, after = %current, "query rewritten");
    }
    current
}

fn rewrite_pass(query: &QueryExpr) -> QueryExpr {
    let query = match query {
        QueryExpr::And(items) => QueryExpr::And(items.iter().map(rewrite_pass).collect()),
        QueryExpr::Or(items) => QueryExpr::Or(items.iter().map(rewrite_pass).collect()),
        QueryExpr::Not(inner) => QueryExpr::Not(Box::new(rewrite_pass(inner))),
        QueryExpr::ElemMatch { array, query } => QueryExpr::ElemMatch {
            array: array.clone(),
            query: Box::new(rewrite_pass(query)),
        },
        other => other.clone(),
    };
    RULES.iter().fold(query, |q, rule| rule(q))
}

fn eliminate_not_not(query: QueryExpr) -> QueryExpr {
    match query {
        QueryExpr::Not(inner) => match *inner {
            QueryExpr::Not(q) => *q,
            other => QueryExpr::Not(Box::new(other)),
        },
        other => other,
    }
}

fn eliminate_not_or(query: QueryExpr) -> QueryExpr {
    match query {
        QueryExpr::Not(inner) => match *inner {
            QueryExpr::Or(items) => QueryExpr::And(items.into_iter().map(|q| QueryExpr::Not(Box::new(q))).collect()),
            other => QueryExpr::Not(Box::new(other)),
        },
        other => other,
    }
}

fn eliminate_not(query: QueryExpr) -> QueryExpr {
    match query {
        QueryExpr::Not(inner) => negate(&inner).unwrap_or(QueryExpr::Not(inner)),
        other => other,
    }
}

/// The test matching exactly the documents `query` rejects, if there is one
fn negate(query: &QueryExpr) -> Option<QueryExpr> {
    let negated = match query {
        QueryExpr::Value { field, op, value } if is_scalar(value) => {
            let op = match op {
                CmpOp::Eq => CmpOp::Ne,
                CmpOp::Ne => CmpOp::Eq,
                _ => return None,
            };
            QueryExpr::Value {
                field: field.clone(),
                op,
                value: value.clone(),
            }
        }
        QueryExpr::In { field, values, negate } => QueryExpr::In {
            field: field.clone(),
            values: values.clone(),
            negate: !negate,
        },
        QueryExpr::FieldIn { field, rfield, negate } => QueryExpr::FieldIn {
            field: field.clone(),
            rfield: rfield.clone(),
            negate: !negate,
        },
        QueryExpr::Contains { array, op, values } => {
            let op = match op {
                ContainsOp::Any => ContainsOp::None,
                ContainsOp::None => ContainsOp::Any,
                ContainsOp::All => return None,
            };
            QueryExpr::Contains {
                array: array.clone(),
                op,
                values: values.clone(),
            }
        }
        QueryExpr::Const(b) => QueryExpr::Const(!b),
        _ => return None,
    };
    Some(negated)
}

fn promote_nested_and(query: QueryExpr) -> QueryExpr {
    match query {
        QueryExpr::And(items) if items.iter().any(|q| matches!(q, QueryExpr::And(_))) => QueryExpr::And(
            items
                .into_iter()
                .flat_map(|q| match q {
                    QueryExpr::And(nested) => nested,
                    other => vec![other],
                })
                .collect(),
        ),
        other => other,
    }
}

fn eliminate_single_and_or(query: QueryExpr) -> QueryExpr {
    match query {
        QueryExpr::And(mut items) | QueryExpr::Or(mut items) if items.len() == 1 => items.remove(0),
        other => other,
    }
}

fn combine_in_or(query: QueryExpr) -> QueryExpr {
    match query {
        QueryExpr::Or(items) => QueryExpr::Or(merge_by_field(items, included_values, false)),
        other => other,
    }
}

fn combine_nin_in_and(query: QueryExpr) -> QueryExpr {
    match query {
        QueryExpr::And(items) => QueryExpr::And(merge_by_field(items, excluded_values, true)),
        other => other,
    }
}

fn simple_elem_match(query: QueryExpr) -> QueryExpr {
    match query {
        QueryExpr::ElemMatch { array, query } => match *query {
            QueryExpr::Value { field, op, value } if op != CmpOp::Ne && is_scalar(&value) && !value.is_null() => {
                QueryExpr::Value {
                    field: array.push(ANY).join(&field),
                    op,
                    value,
                }
            }
            other => QueryExpr::ElemMatch {
                array,
                query: Box::new(other),
            },
        },
        other => other,
    }
}

type ValuesOf = fn(&QueryExpr) -> Option<(&Path, Vec<Value>)>;

/// `field = v` or `field $in [..]`
fn included_values(query: &QueryExpr) -> Option<(&Path, Vec<Value>)> {
    match query {
        QueryExpr::Value {
            field,
            op: CmpOp::Eq,
            value,
        } if is_scalar(value) => Some((field, vec![value.clone()])),
        QueryExpr::In {
            field,
            values,
            negate: false,
        } => Some((field, values.clone())),
        _ => None,
    }
}

/// `field != v` or `field $nin [..]`
fn excluded_values(query: &QueryExpr) -> Option<(&Path, Vec<Value>)> {
    match query {
        QueryExpr::Value {
            field,
            op: CmpOp::Ne,
            value,
        } => Some((field, vec![value.clone()])),
        QueryExpr::In {
            field,
            values,
            negate: true,
        } => Some((field, values.clone())),
        _ => None,
    }
}

/// Merges the clauses `values_of` recognizes into one `$in`/`$nin` per field,
/// placed where the field's first clause was. Fields seen once are left
/// alone.
fn merge_by_field(items: Vec<QueryExpr>, values_of: ValuesOf, negate: bool) -> Vec<QueryExpr> {
    let mut counts: Vec<(Path, usize)> = Vec::new();
    for item in &items {
        if let Some((field, _)) = values_of(item) {
            match counts.iter_mut().find(|(f, _)| f == field) {
                Some((_, n)) => *n += 1,
                None => counts.push((field.clone(), 1)),
            }
        }
    }
    let repeated: Vec<Path> = counts.into_iter().filter(|(_, n)| *n > 1).map(|(f, _)| f).collect();
    if repeated.is_empty() {
        return items;
    }

    let mut out: Vec<QueryExpr> = Vec::with_capacity(items.len());
    let mut merged_at: Vec<(Path, usize)> = Vec::new();
    for item in items {
        let merge = values_of(&item)
            .filter(|(field, _)| repeated.contains(*field))
            .map(|(field, values)| (field.clone(), values));
        let Some((field, values)) = merge else {
            out.push(item);
            continue;
        };
        let at = merged_at.iter().find(|(f, _)| *f == field).map(|(_, at)| *at);
        match at {
            Some(at) => {
                if let QueryExpr::In { values: existing, .. } = &mut out[at] {
                    push_distinct(existing, values);
                }
            }
            None => {
                merged_at.push((field.clone(), out.len()));
                let mut distinct = Vec::new();
                push_distinct(&mut distinct, values);
                out.push(QueryExpr::In {
                    field,
                    values: distinct,
                    negate,
                });
            }
        }
    }
    out
}

fn push_distinct(into: &mut Vec<Value>, values: Vec<Value>) {
    for value in values {
        if !into.iter().any(|v| values_equal(v, &value)) {
            into.push(value);
        }
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}
