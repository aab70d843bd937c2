//! Evaluation configuration
//!
//! Limits that bound the work a single evaluation may perform, and the size
//! of the engine's parsed-expression cache.

use serde::{Deserialize, Serialize};

/// Configuration for FHIRPath evaluation
///
/// ```rust
/// use fhirpath_engine::EvaluationConfig;
///
/// let config = EvaluationConfig::default()
///     .with_max_steps(Some(10_000))
///     .with_max_depth(64);
/// assert_eq!(config.max_depth, 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Ceiling on AST node visits per evaluation; `None` disables the budget
    pub max_steps: Option<usize>,

    /// Maximum nesting of the recursive tree walk
    pub max_depth: usize,

    /// Number of parsed expressions kept by [`FhirPathEngine`](crate::FhirPathEngine)
    pub cache_capacity: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            max_steps: Some(1_000_000),
            max_depth: 512,
            cache_capacity: 256,
        }
    }
}

impl EvaluationConfig {
    /// Create new configuration with all defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the node-visit budget
    pub fn with_max_steps(mut self, max_steps: Option<usize>) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Set the maximum recursion depth
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the parsed-expression cache capacity
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Load a configuration from JSON; missing fields take their defaults
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
