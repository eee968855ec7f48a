//! Composite query execution
//!
//! Runs query plans against the registered finders and assembles composite
//! documents from the fragments they return.
//!
//! # Execution Flow (strict order)
//!
//! 1. Nodes run breadth-first: every node after all of its sources
//! 2. A node with sources runs one sub-query per tuple of source candidates
//! 3. Fetched documents are deduplicated per node and shared through the
//!    per-invocation [`DocumentCache`]
//! 4. Child documents are linked into the reference slots of their parents
//! 5. Root documents are assembled bottom-up into owned trees
//!
//! # Failure Handling
//!
//! - Backend and per-document errors are recorded on the context and the
//!   remaining tuples still run
//! - A range on any node but the root fails before execution

mod assembler;
mod binding;
mod cache;
mod errors;
mod node;
mod result;

pub use assembler::{CompositeError, CompositeFindRequest, CompositeFinder, CompositeResult};
pub use binding::{Binding, BoundQuery, SourceDoc};
pub use cache::DocumentCache;
pub use errors::{ExecutorError, ExecutorResult};
pub use node::{NodeExecutor, PlanExecution};
pub use result::{DocId, DocRef, RefSlot, ResultDoc};
