//! compositedb - deterministic composite-entity finds
//!
//! A composite entity is a root entity plus the entities its schema
//! references, each stored independently. A composite find plans the order
//! in which those entities are queried, binds values from fetched documents
//! into later sub-queries, and splices the results into one document tree
//! per matching root document.

pub mod auth;
pub mod cli;
pub mod config;
pub mod context;
pub mod executor;
pub mod finder;
pub mod metadata;
pub mod mindex;
pub mod observability;
pub mod planner;
pub mod query;
pub mod schema;
pub mod tuples;
