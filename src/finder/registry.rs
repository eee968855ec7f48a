//! Finders by backend identifier

use std::collections::HashMap;
use std::sync::Arc;

use super::Finder;

/// Maps backend identifiers to the finder serving them
#[derive(Default, Clone)]
pub struct FinderRegistry {
    finders: HashMap<String, Arc<dyn Finder>>,
}

impl FinderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, backend: impl Into<String>, finder: Arc<dyn Finder>) {
        self.finders.insert(backend.into(), finder);
    }

    pub fn with(mut self, backend: impl Into<String>, finder: Arc<dyn Finder>) -> Self {
        self.register(backend, finder);
        self
    }

    pub fn get(&self, backend: &str) -> Option<Arc<dyn Finder>> {
        self.finders.get(backend).cloned()
    }

    pub fn contains(&self, backend: &str) -> bool {
        self.finders.contains_key(backend)
    }

    pub fn backends(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.finders.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for FinderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinderRegistry").field("backends", &self.backends()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finder::MemoryFinder;

    #[test]
    fn test_register_and_get() {
        let registry = FinderRegistry::new()
            .with("memory", Arc::new(MemoryFinder::new()))
            .with("archive", Arc::new(MemoryFinder::new()));
        assert!(registry.contains("memory"));
        assert!(registry.get("archive").is_some());
        assert!(registry.get("remote").is_none());
        assert_eq!(registry.backends(), vec!["archive", "memory"]);
    }
}
