//! Observability for composite finds
//!
//! Provides:
//! - Typed lifecycle events with stable names
//! - Scope-based begin/complete logging
//!
//! Everything is emitted through `tracing`; the binary decides where it
//! goes by installing a subscriber.
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on execution
//! 3. Stable event names
//!
//! # Usage
//!
//! ```ignore
//! use compositedb::observability::{Event, ObservationScope};
//!
//! Event::ConfigLoaded.log(&[("path", "finder.json")]);
//!
//! let scope = ObservationScope::new("COMPOSITE_FIND");
//! // ... do work ...
//! scope.complete();
//! ```

mod events;
mod scope;

pub use events::Event;
pub use scope::ObservationScope;
