//! JSON form of query expressions
//!
//! ```text
//! {"field": "a", "op": "=", "rvalue": 1}
//! {"field": "a", "op": "<", "rfield": "b"}
//! {"field": "a", "regex": "^x", "caseInsensitive": true}
//! {"field": "a", "op": "$in", "values": [1, 2]}
//! {"field": "a", "op": "$nin", "rfield": "arr"}
//! {"array": "arr", "contains": "$any", "values": [1]}
//! {"array": "arr", "elemMatch": {...}}
//! {"$and": [...]}  {"$or": [...]}  {"$not": {...}}
//! ```

use serde::de::Deserializer;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Map, Value};

use super::ast::{CmpOp, ContainsOp, QueryExpr};
use super::errors::{QueryError, QueryResult};
use super::path::Path;

impl QueryExpr {
    /// Parses the JSON form of a query expression
    pub fn from_json(value: &Value) -> QueryResult<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| QueryError::MalformedQuery(format!("expected an object, got {}", value)))?;

        if let Some(items) = obj.get("$and") {
            return Ok(QueryExpr::And(parse_list(items)?));
        }
        if let Some(items) = obj.get("$or") {
            return Ok(QueryExpr::Or(parse_list(items)?));
        }
        if let Some(inner) = obj.get("$not") {
            return Ok(QueryExpr::Not(Box::new(QueryExpr::from_json(inner)?)));
        }
        if let Some(b) = obj.get("$const") {
            return b
                .as_bool()
                .map(QueryExpr::Const)
                .ok_or_else(|| QueryError::MalformedQuery("$const must be a boolean".into()));
        }
        if let Some(array) = obj.get("array") {
            let array = path_of(array, "array")?;
            if let Some(inner) = obj.get("elemMatch") {
                return Ok(QueryExpr::ElemMatch {
                    array,
                    query: Box::new(QueryExpr::from_json(inner)?),
                });
            }
            let op = obj
                .get("contains")
                .and_then(Value::as_str)
                .ok_or_else(|| QueryError::MalformedQuery("array expression needs contains or elemMatch".into()))?;
            let op = ContainsOp::parse(op).ok_or_else(|| QueryError::UnknownOperator(op.to_string()))?;
            return Ok(QueryExpr::Contains {
                array,
                op,
                values: values_of(obj)?,
            });
        }

        let field = path_of(
            obj.get("field")
                .ok_or_else(|| QueryError::MalformedQuery(format!("missing field in {}", value)))?,
            "field",
        )?;

        if let Some(pattern) = obj.get("regex") {
            let pattern = pattern
                .as_str()
                .ok_or_else(|| QueryError::MalformedQuery("regex must be a string".into()))?
                .to_string();
            let case_insensitive = obj.get("caseInsensitive").and_then(Value::as_bool).unwrap_or(false);
            regex::RegexBuilder::new(&pattern)
                .case_insensitive(case_insensitive)
                .build()
                .map_err(|e| QueryError::InvalidRegex {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })?;
            return Ok(QueryExpr::Regex {
                field,
                pattern,
                case_insensitive,
            });
        }

        let op = obj
            .get("op")
            .and_then(Value::as_str)
            .ok_or_else(|| QueryError::MalformedQuery(format!("missing op in {}", value)))?;

        if let Some(negate) = list_op(op) {
            if let Some(rfield) = obj.get("rfield") {
                return Ok(QueryExpr::FieldIn {
                    field,
                    rfield: path_of(rfield, "rfield")?,
                    negate,
                });
            }
            return Ok(QueryExpr::In {
                field,
                values: values_of(obj)?,
                negate,
            });
        }

        let cmp = CmpOp::parse(op).ok_or_else(|| QueryError::UnknownOperator(op.to_string()))?;
        if let Some(rfield) = obj.get("rfield") {
            return Ok(QueryExpr::Field {
                field,
                op: cmp,
                rfield: path_of(rfield, "rfield")?,
            });
        }
        let value = obj
            .get("rvalue")
            .cloned()
            .ok_or_else(|| QueryError::MalformedQuery(format!("missing rvalue or rfield in {}", value)))?;
        Ok(QueryExpr::Value { field, op: cmp, value })
    }

    /// Renders the JSON form accepted by [`QueryExpr::from_json`]
    pub fn to_json(&self) -> Value {
        match self {
            QueryExpr::Value { field, op, value } => {
                json!({"field": field.to_string(), "op": op.as_str(), "rvalue": value})
            }
            QueryExpr::Field { field, op, rfield } => {
                json!({"field": field.to_string(), "op": op.as_str(), "rfield": rfield.to_string()})
            }
            QueryExpr::Regex {
                field,
                pattern,
                case_insensitive,
            } => {
                let mut obj = Map::new();
                obj.insert("field".into(), json!(field.to_string()));
                obj.insert("regex".into(), json!(pattern));
                if *case_insensitive {
                    obj.insert("caseInsensitive".into(), json!(true));
                }
                Value::Object(obj)
            }
            QueryExpr::In {
                field,
                values,
                negate,
            } => {
                json!({"field": field.to_string(), "op": if *negate { "$nin" } else { "$in" }, "values": values})
            }
            QueryExpr::FieldIn {
                field,
                rfield,
                negate,
            } => json!({
                "field": field.to_string(),
                "op": if *negate { "$nin" } else { "$in" },
                "rfield": rfield.to_string()
            }),
            QueryExpr::Contains { array, op, values } => {
                json!({"array": array.to_string(), "contains": op.as_str(), "values": values})
            }
            QueryExpr::ElemMatch { array, query } => {
                json!({"array": array.to_string(), "elemMatch": query.to_json()})
            }
            QueryExpr::And(items) => json!({"$and": items.iter().map(QueryExpr::to_json).collect::<Vec<_>>()}),
            QueryExpr::Or(items) => json!({"$or": items.iter().map(QueryExpr::to_json).collect::<Vec<_>>()}),
            QueryExpr::Not(q) => json!({"$not": q.to_json()}),
            QueryExpr::Const(b) => json!({"$const": b}),
        }
    }
}

fn parse_list(items: &Value) -> QueryResult<Vec<QueryExpr>> {
    items
        .as_array()
        .ok_or_else(|| QueryError::MalformedQuery("$and/$or expect an array".into()))?
        .iter()
        .map(QueryExpr::from_json)
        .collect()
}

fn path_of(value: &Value, name: &str) -> QueryResult<Path> {
    value
        .as_str()
        .map(Path::parse)
        .ok_or_else(|| QueryError::MalformedQuery(format!("{} must be a string", name)))
}

fn values_of(obj: &Map<String, Value>) -> QueryResult<Vec<Value>> {
    obj.get("values")
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| QueryError::MalformedQuery("values must be an array".into()))
}

/// `Some(negate)` for list membership operators
fn list_op(op: &str) -> Option<bool> {
    match op {
        "$in" => Some(false),
        "$nin" | "$not_in" => Some(true),
        _ => None,
    }
}

impl Serialize for QueryExpr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for QueryExpr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        QueryExpr::from_json(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value_comparison() {
        let q = QueryExpr::from_json(&json!({"field": "_id", "op": "=", "rvalue": "A01"})).unwrap();
        assert_eq!(q, QueryExpr::eq("_id", json!("A01")));
    }

    #[test]
    fn test_parse_field_comparison_and_membership() {
        let q = QueryExpr::from_json(&json!({"field": "_id", "op": "$in", "rfield": "$parent.b_refs"})).unwrap();
        assert_eq!(
            q,
            QueryExpr::FieldIn {
                field: Path::parse("_id"),
                rfield: Path::parse("$parent.b_refs"),
                negate: false
            }
        );
        let q = QueryExpr::from_json(&json!({"field": "x", "op": "$nin", "values": [1, 2]})).unwrap();
        assert!(matches!(q, QueryExpr::In { negate: true, .. }));
    }

    #[test]
    fn test_parse_nested_logical() {
        let q = QueryExpr::from_json(&json!({
            "$and": [
                {"field": "a", "op": ">=", "rvalue": 3},
                {"$or": [{"field": "b", "regex": "^ab"}, {"$not": {"array": "t", "contains": "$all", "values": ["x"]}}]}
            ]
        }))
        .unwrap();
        let QueryExpr::And(items) = &q else {
            panic!("expected $and");
        };
        assert_eq!(items.len(), 2);
        assert_eq!(QueryExpr::from_json(&q.to_json()).unwrap(), q);
    }

    #[test]
    fn test_rejects_unknown_operator_and_bad_regex() {
        let err = QueryExpr::from_json(&json!({"field": "a", "op": "~", "rvalue": 1})).unwrap_err();
        assert_eq!(err.code(), "COMPOSITE_QUERY_UNKNOWN_OPERATOR");
        let err = QueryExpr::from_json(&json!({"field": "a", "regex": "(unclosed"})).unwrap_err();
        assert!(matches!(err, QueryError::InvalidRegex { .. }));
    }

    #[test]
    fn test_rejects_non_object() {
        assert!(QueryExpr::from_json(&json!([1, 2])).is_err());
        assert!(QueryExpr::from_json(&json!({"op": "=", "rvalue": 1})).is_err());
    }

    #[test]
    fn test_deserialize_through_serde() {
        let q: QueryExpr = serde_json::from_value(json!({"field": "a", "op": "$lt", "rvalue": 5})).unwrap();
        assert_eq!(q, QueryExpr::cmp("a", CmpOp::Lt, json!(5)));
    }
}
