//! # Role-based field access
//!
//! Evaluates the access rules declared on entity schemas against the
//! caller's roles.
//!
//! ## Rules
//! - An empty role list, or one containing [`ANYONE`], allows everybody
//! - An entity the caller may not find is removed through its reference
//!   field; the root entity is never removed
//! - A field the caller may not read is removed at its composite path

use std::collections::BTreeSet;

use tracing::debug;

use crate::metadata::CompositeMetadata;
use crate::query::Path;

/// Role granted to every caller
pub const ANYONE: &str = "anyone";

/// Decides which composite fields a caller may not see
pub trait AccessEvaluator: Send + Sync {
    /// Composite paths to exclude from the result
    fn excluded_fields(&self, composite: &CompositeMetadata, roles: &BTreeSet<String>) -> Vec<Path>;
}

/// Excludes nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl AccessEvaluator for AllowAll {
    fn excluded_fields(&self, _composite: &CompositeMetadata, _roles: &BTreeSet<String>) -> Vec<Path> {
        Vec::new()
    }
}

/// Applies the `access` rules of every entity schema in the composite
#[derive(Debug, Default, Clone, Copy)]
pub struct RoleFieldAccess;

impl RoleFieldAccess {
    fn allowed(required: &[String], roles: &BTreeSet<String>) -> bool {
        required.is_empty() || required.iter().any(|r| r == ANYONE || roles.contains(r))
    }
}

impl AccessEvaluator for RoleFieldAccess {
    fn excluded_fields(&self, composite: &CompositeMetadata, roles: &BTreeSet<String>) -> Vec<Path> {
        let mut excluded = Vec::new();
        for entity in composite.entities() {
            let access = &entity.schema.access;
            if !entity.is_root() && !Self::allowed(&access.find, roles) {
                excluded.push(entity.reference_field.clone());
                continue;
            }
            for (field, required) in &access.fields {
                if !Self::allowed(required, roles) {
                    excluded.push(composite.to_absolute(entity.id, field));
                }
            }
        }
        debug!(excluded = excluded.len(), roles = roles.len(), "access evaluated");
        excluded
    }
}
