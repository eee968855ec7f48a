//! ObservationScope for automatic begin/complete logging
//!
//! - Logs `{name}_BEGIN` on creation
//! - Logs `{name}_COMPLETE` with the elapsed time on `complete()`
//! - Logs `{name}_ERROR` on drop if never completed

use std::cell::Cell;
use std::time::Instant;

use super::events::render_fields;

/// A scope that logs begin and complete events
///
/// ```ignore
/// let scope = ObservationScope::new("COMPOSITE_FIND").with_field("entity", "A");
/// // ... do work ...
/// scope.complete(); // logs COMPOSITE_FIND_COMPLETE
/// // if not completed, logs COMPOSITE_FIND_ERROR on drop
/// ```
pub struct ObservationScope<'a> {
    name: &'a str,
    completed: Cell<bool>,
    fields: Vec<(&'a str, String)>,
    started_at: Instant,
}

impl<'a> ObservationScope<'a> {
    /// Logs `{name}_BEGIN` immediately
    pub fn new(name: &'a str) -> Self {
        tracing::info!(event = %format!("{}_BEGIN", name));
        Self {
            name,
            completed: Cell::new(false),
            fields: Vec::new(),
            started_at: Instant::now(),
        }
    }

    /// Attaches a field reported on completion or error
    pub fn with_field(mut self, key: &'a str, value: impl ToString) -> Self {
        self.fields.push((key, value.to_string()));
        self
    }

    fn rendered(&self, extra: &[(&str, &str)]) -> String {
        let mut all: Vec<(&str, &str)> = self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        all.extend(extra.iter().copied());
        render_fields(&all)
    }

    /// Logs `{name}_COMPLETE`
    pub fn complete(self) {
        self.complete_with_fields(&[]);
    }

    /// Logs `{name}_COMPLETE` with additional fields
    pub fn complete_with_fields(self, extra: &[(&str, &str)]) {
        self.completed.set(true);
        let elapsed_ms = self.started_at.elapsed().as_millis();
        tracing::info!(
            event = %format!("{}_COMPLETE", self.name),
            elapsed_ms = elapsed_ms as u64,
            fields = %self.rendered(extra)
        );
    }

    /// Logs `{name}_FAILED` with a reason
    pub fn fail(self, reason: &str) {
        self.completed.set(true);
        tracing::error!(
            event = %format!("{}_FAILED", self.name),
            reason,
            fields = %self.rendered(&[])
        );
    }

    pub fn is_completed(&self) -> bool {
        self.completed.get()
    }
}

impl Drop for ObservationScope<'_> {
    fn drop(&mut self) {
        if !self.completed.get() {
            tracing::error!(
                event = %format!("{}_ERROR", self.name),
                reason = "scope dropped without completion",
                fields = %self.rendered(&[])
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_complete() {
        let scope = ObservationScope::new("TEST").with_field("entity", "A");
        assert!(!scope.is_completed());
        scope.complete();
    }

    #[test]
    fn test_scope_complete_with_extra_fields() {
        let scope = ObservationScope::new("TEST");
        scope.complete_with_fields(&[("documents", "3")]);
    }

    #[test]
    fn test_scope_fail() {
        ObservationScope::new("TEST").fail("something went wrong");
    }

    #[test]
    fn test_scope_drop_without_complete() {
        let scope = ObservationScope::new("TEST").with_field("n", 1);
        drop(scope);
    }
}
