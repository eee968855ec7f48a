//! # Composite Authorization
//!
//! Field-level access control for assembled composite documents.
//!
//! Authorization never filters documents. It only decides which composite
//! fields are removed from the result before it is returned.

mod access;

pub use access::{AccessEvaluator, AllowAll, RoleFieldAccess, ANYONE};
