//! Query expression tree
//!
//! Field paths inside an expression are absolute for the document the
//! expression is evaluated against, except inside `ElemMatch`, whose nested
//! expression is relative to each array element.

use std::cmp::Ordering;
use std::fmt;

use serde_json::Value;

use super::path::{Path, ANY};

/// Binary comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CmpOp {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "=" | "$eq" => Some(CmpOp::Eq),
            "!=" | "$neq" | "$ne" => Some(CmpOp::Ne),
            "<" | "$lt" => Some(CmpOp::Lt),
            "<=" | "$lte" => Some(CmpOp::Lte),
            ">" | "$gt" => Some(CmpOp::Gt),
            ">=" | "$gte" => Some(CmpOp::Gte),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Lte => "<=",
            CmpOp::Gt => ">",
            CmpOp::Gte => ">=",
        }
    }

    /// The operator obtained by swapping the operands: `a < b` is `b > a`.
    pub fn swapped(&self) -> Self {
        match self {
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::Lte => CmpOp::Gte,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::Gte => CmpOp::Lte,
            other => *other,
        }
    }

    /// Applies the operator to the ordering of left against right
    pub fn test(&self, ordering: Ordering) -> bool {
        match self {
            CmpOp::Eq => ordering == Ordering::Equal,
            CmpOp::Ne => ordering != Ordering::Equal,
            CmpOp::Lt => ordering == Ordering::Less,
            CmpOp::Lte => ordering != Ordering::Greater,
            CmpOp::Gt => ordering == Ordering::Greater,
            CmpOp::Gte => ordering != Ordering::Less,
        }
    }
}

/// Array containment operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainsOp {
    /// At least one of the values is in the array
    Any,
    /// Every value is in the array
    All,
    /// None of the values is in the array
    None,
}

impl ContainsOp {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "$any" => Some(ContainsOp::Any),
            "$all" => Some(ContainsOp::All),
            "$none" => Some(ContainsOp::None),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainsOp::Any => "$any",
            ContainsOp::All => "$all",
            ContainsOp::None => "$none",
        }
    }
}

/// A query expression
#[derive(Debug, Clone, PartialEq)]
pub enum QueryExpr {
    /// `field op value`
    Value { field: Path, op: CmpOp, value: Value },
    /// `field op rfield`
    Field { field: Path, op: CmpOp, rfield: Path },
    /// `field` matches a regular expression
    Regex {
        field: Path,
        pattern: String,
        case_insensitive: bool,
    },
    /// `field` is (or, negated, is not) one of the values
    In {
        field: Path,
        values: Vec<Value>,
        negate: bool,
    },
    /// `field` is (or is not) one of the elements of the array at `rfield`
    FieldIn { field: Path, rfield: Path, negate: bool },
    /// The array at `array` contains any/all/none of the values
    Contains {
        array: Path,
        op: ContainsOp,
        values: Vec<Value>,
    },
    /// Some element of the array at `array` satisfies `query`
    ElemMatch { array: Path, query: Box<QueryExpr> },
    And(Vec<QueryExpr>),
    Or(Vec<QueryExpr>),
    Not(Box<QueryExpr>),
    Const(bool),
}

impl QueryExpr {
    pub fn eq(field: impl Into<Path>, value: Value) -> Self {
        QueryExpr::Value {
            field: field.into(),
            op: CmpOp::Eq,
            value,
        }
    }

    pub fn cmp(field: impl Into<Path>, op: CmpOp, value: Value) -> Self {
        QueryExpr::Value {
            field: field.into(),
            op,
            value,
        }
    }

    pub fn field_cmp(field: impl Into<Path>, op: CmpOp, rfield: impl Into<Path>) -> Self {
        QueryExpr::Field {
            field: field.into(),
            op,
            rfield: rfield.into(),
        }
    }

    pub fn in_values(field: impl Into<Path>, values: Vec<Value>) -> Self {
        QueryExpr::In {
            field: field.into(),
            values,
            negate: false,
        }
    }

    /// Conjunction that collapses the trivial cases
    pub fn and_all(mut clauses: Vec<QueryExpr>) -> Option<QueryExpr> {
        match clauses.len() {
            0 => None,
            1 => clauses.pop(),
            _ => Some(QueryExpr::And(clauses)),
        }
    }

    /// Top-level conjuncts: nested `And`s are flattened, anything else is a
    /// single conjunct.
    pub fn conjuncts(&self) -> Vec<QueryExpr> {
        let mut out = Vec::new();
        self.collect_conjuncts(&mut out);
        out
    }

    fn collect_conjuncts(&self, out: &mut Vec<QueryExpr>) {
        match self {
            QueryExpr::And(items) => items.iter().for_each(|q| q.collect_conjuncts(out)),
            other => out.push(other.clone()),
        }
    }

    /// Every field referenced by the expression, as absolute paths.
    ///
    /// Fields nested in an `ElemMatch` are reported under `array.*`.
    pub fn fields(&self) -> Vec<Path> {
        let mut out = Vec::new();
        self.collect_fields(&Path::empty(), &mut out);
        out
    }

    fn collect_fields(&self, prefix: &Path, out: &mut Vec<Path>) {
        let mut add = |p: &Path| {
            let full = prefix.join(p);
            if !out.contains(&full) {
                out.push(full);
            }
        };
        match self {
            QueryExpr::Value { field, .. }
            | QueryExpr::Regex { field, .. }
            | QueryExpr::In { field, .. } => add(field),
            QueryExpr::Field { field, rfield, .. } | QueryExpr::FieldIn { field, rfield, .. } => {
                add(field);
                add(rfield);
            }
            QueryExpr::Contains { array, .. } => add(array),
            QueryExpr::ElemMatch { array, query } => {
                add(array);
                query.collect_fields(&prefix.join(array).push(ANY), out);
            }
            QueryExpr::And(items) | QueryExpr::Or(items) => {
                items.iter().for_each(|q| q.collect_fields(prefix, out))
            }
            QueryExpr::Not(q) => q.collect_fields(prefix, out),
            QueryExpr::Const(_) => {}
        }
    }

    /// Rewrites every top-level field path. Paths nested inside an
    /// `ElemMatch` stay relative to the array element and are untouched.
    pub fn map_fields(&self, f: &dyn Fn(&Path) -> Path) -> QueryExpr {
        match self {
            QueryExpr::Value { field, op, value } => QueryExpr::Value {
                field: f(field),
                op: *op,
                value: value.clone(),
            },
            QueryExpr::Field { field, op, rfield } => QueryExpr::Field {
                field: f(field),
                op: *op,
                rfield: f(rfield),
            },
            QueryExpr::Regex {
                field,
                pattern,
                case_insensitive,
            } => QueryExpr::Regex {
                field: f(field),
                pattern: pattern.clone(),
                case_insensitive: *case_insensitive,
            },
            QueryExpr::In {
                field,
                values,
                negate,
            } => QueryExpr::In {
                field: f(field),
                values: values.clone(),
                negate: *negate,
            },
            QueryExpr::FieldIn {
                field,
                rfield,
                negate,
            } => QueryExpr::FieldIn {
                field: f(field),
                rfield: f(rfield),
                negate: *negate,
            },
            QueryExpr::Contains { array, op, values } => QueryExpr::Contains {
                array: f(array),
                op: *op,
                values: values.clone(),
            },
            QueryExpr::ElemMatch { array, query } => QueryExpr::ElemMatch {
                array: f(array),
                query: query.clone(),
            },
            QueryExpr::And(items) => QueryExpr::And(items.iter().map(|q| q.map_fields(f)).collect()),
            QueryExpr::Or(items) => QueryExpr::Or(items.iter().map(|q| q.map_fields(f)).collect()),
            QueryExpr::Not(q) => QueryExpr::Not(Box::new(q.map_fields(f))),
            QueryExpr::Const(b) => QueryExpr::Const(*b),
        }
    }

    /// Replaces `ElemMatch` nodes whose array satisfies `unfold` by their
    /// nested expression prefixed with `array.*`.
    ///
    /// An element-match over a reference field is the same predicate as the
    /// nested expression over the referenced entity's fields.
    pub fn unfold_elem_match(&self, unfold: &dyn Fn(&Path) -> bool) -> QueryExpr {
        match self {
            QueryExpr::ElemMatch { array, query } if unfold(array) => {
                let prefix = array.push(ANY);
                query
                    .unfold_elem_match(&|p| unfold(&prefix.join(p)))
                    .map_fields(&|p| prefix.join(p))
            }
            QueryExpr::And(items) => {
                QueryExpr::And(items.iter().map(|q| q.unfold_elem_match(unfold)).collect())
            }
            QueryExpr::Or(items) => {
                QueryExpr::Or(items.iter().map(|q| q.unfold_elem_match(unfold)).collect())
            }
            QueryExpr::Not(q) => QueryExpr::Not(Box::new(q.unfold_elem_match(unfold))),
            other => other.clone(),
        }
    }
}

impl fmt::Display for QueryExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}
