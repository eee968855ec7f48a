//! Observable events of the composite find engine
//!
//! Events are explicit and typed. Each one has a stable upper-case name
//! and is emitted through `tracing` with structured fields.

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Finder configuration loaded
    ConfigLoaded,
    /// Fixture (schemas and documents) loaded
    FixtureLoaded,
    /// Entity schemas loaded
    SchemasLoaded,

    // Composite find
    /// Composite metadata resolved
    MetadataResolved,
    /// Search plan chosen
    SearchPlanChosen,
    /// Retrieval plan chosen
    RetrievalPlanChosen,
    /// Retrieval root seeded from search results
    RetrievalSeeded,
    /// A backend call or document failed
    FetchFailed,
    /// Composite find rejected before any fetch
    FindRejected,

    // Explain
    /// Explain produced
    ExplainComplete,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::FixtureLoaded => "FIXTURE_LOADED",
            Event::SchemasLoaded => "SCHEMAS_LOADED",

            Event::MetadataResolved => "METADATA_RESOLVED",
            Event::SearchPlanChosen => "SEARCH_PLAN_CHOSEN",
            Event::RetrievalPlanChosen => "RETRIEVAL_PLAN_CHOSEN",
            Event::RetrievalSeeded => "RETRIEVAL_SEEDED",
            Event::FetchFailed => "FETCH_FAILED",
            Event::FindRejected => "FIND_REJECTED",

            Event::ExplainComplete => "EXPLAIN_COMPLETE",
        }
    }

    /// Returns true if this event reports a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, Event::FetchFailed | Event::FindRejected)
    }

    /// Emits the event. Failures go out at WARN, everything else at INFO.
    pub fn log(&self, fields: &[(&str, &str)]) {
        let fields = render_fields(fields);
        if self.is_failure() {
            tracing::warn!(event = self.as_str(), fields = %fields);
        } else {
            tracing::info!(event = self.as_str(), fields = %fields);
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// `k1=v1 k2=v2`, keys sorted
pub(crate) fn render_fields(fields: &[(&str, &str)]) -> String {
    let mut sorted: Vec<&(&str, &str)> = fields.iter().collect();
    sorted.sort_by_key(|(k, _)| *k);
    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ")
}
