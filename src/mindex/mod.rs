//! In-memory multi-key document index
//!
//! Indexes are ephemeral: built per invocation from the documents at hand,
//! never persisted.
//!
//! # Design Principles
//!
//! - A document yields every key its field values produce, one per array
//!   element, and `Null` when the field is absent
//! - Lookups mirror the key spec shape and may select many keys
//! - Lookups return candidates; the query itself stays the judge

mod analyze;
mod errors;
mod key;
mod lookup;
mod memindex;

pub use analyze::{index_specs, regex_prefix};
pub use errors::{IndexError, IndexResult};
pub use key::{Key, KeySpec};
pub use lookup::LookupSpec;
pub use memindex::MemDocIndex;
