//! Query language for composite finds
//!
//! Field paths, query expressions (parsing, evaluation), sort keys and
//! projections. Everything here is plain data over `serde_json::Value`.

mod ast;
mod errors;
mod eval;
mod parse;
pub mod path;
mod projection;
mod sort;

pub use ast::{CmpOp, ContainsOp, QueryExpr};
pub use errors::{QueryError, QueryResult};
pub use eval::{compare_values, sort_order, values_equal};
pub use path::Path;
pub use projection::{FieldProjector, Projection, ProjectionItem, Projector};
pub use sort::{Sort, SortDirection, SortKey};
