//! Finder configuration
//!
//! Loaded from a JSON file. Every field is optional; missing fields take
//! their defaults.
//!
//! ```json
//! {
//!   "search_enumerator": "brute_force",
//!   "search_scorer": "indexed_field",
//!   "max_enumerated_edges": 12,
//!   "use_memory_index": true,
//!   "default_roles": ["reader"]
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::planner::{
    BruteForceEnumerator, FirstEnumerator, IndexedFieldScorer, PlanEnumerator, PlanScorer, SimpleScorer,
    DEFAULT_MAX_ENUMERATED_EDGES,
};

/// Upper bound accepted for `max_enumerated_edges`
pub const MAX_EDGE_LIMIT: usize = 20;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        "COMPOSITE_CONFIG_ERROR"
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Plan enumerator used for search plans
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumeratorKind {
    #[default]
    BruteForce,
    First,
}

/// Plan scorer used for search plans
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerKind {
    #[default]
    IndexedField,
    Simple,
}

/// Composite finder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinderConfig {
    #[serde(default)]
    pub search_enumerator: EnumeratorKind,

    #[serde(default)]
    pub search_scorer: ScorerKind,

    /// Plans with more edges than this skip enumeration
    #[serde(default = "default_max_enumerated_edges")]
    pub max_enumerated_edges: usize,

    /// Whether the memory backend narrows candidates through an index
    #[serde(default = "default_use_memory_index")]
    pub use_memory_index: bool,

    /// Roles assumed when a request names none
    #[serde(default)]
    pub default_roles: Vec<String>,
}

fn default_max_enumerated_edges() -> usize {
    DEFAULT_MAX_ENUMERATED_EDGES
}

fn default_use_memory_index() -> bool {
    true
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            search_enumerator: EnumeratorKind::default(),
            search_scorer: ScorerKind::default(),
            max_enumerated_edges: default_max_enumerated_edges(),
            use_memory_index: default_use_memory_index(),
            default_roles: Vec::new(),
        }
    }
}

impl FinderConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        let config: FinderConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_enumerated_edges == 0 || self.max_enumerated_edges > MAX_EDGE_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "max_enumerated_edges must be between 1 and {}, got {}",
                MAX_EDGE_LIMIT, self.max_enumerated_edges
            )));
        }
        if self.default_roles.iter().any(|r| r.trim().is_empty()) {
            return Err(ConfigError::Invalid("default_roles must not contain empty names".into()));
        }
        Ok(())
    }

    pub fn enumerator(&self) -> Box<dyn PlanEnumerator> {
        match self.search_enumerator {
            EnumeratorKind::BruteForce => Box::new(BruteForceEnumerator),
            EnumeratorKind::First => Box::new(FirstEnumerator),
        }
    }

    pub fn scorer(&self) -> Box<dyn PlanScorer> {
        match self.search_scorer {
            ScorerKind::IndexedField => Box::new(IndexedFieldScorer),
            ScorerKind::Simple => Box::new(SimpleScorer),
        }
    }
}
