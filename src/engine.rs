//! FHIRPath engine - the main entry point for FHIRPath evaluation
//!
//! [`FhirPathEngine`] bundles an [`Environment`] template with a bounded
//! cache of parsed expressions, so repeated evaluation of the same
//! expression text skips the parser.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;

use crate::ast::ExpressionNode;
use crate::config::EvaluationConfig;
use crate::core::{EvaluationError, ParseError};
use crate::evaluator::{Environment, evaluate};
use crate::model::{Collection, json_to_collection};
use crate::parser::parse;
use crate::registry::FunctionRegistry;

/// Errors from [`FhirPathEngine::evaluate`]: either the text did not parse
/// or the evaluation failed
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FhirPathError {
    /// Expression text failed to parse
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Evaluation aborted
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

/// Main FHIRPath engine for parsing and evaluating expressions
///
/// ```rust
/// use fhirpath_engine::FhirPathEngine;
/// use serde_json::json;
///
/// let engine = FhirPathEngine::new();
/// let patient = json!({"resourceType": "Patient", "name": [{"given": ["Ann", "Bo"]}]});
/// let result = engine.evaluate("Patient.name.given.count()", &patient).unwrap();
/// assert_eq!(result.to_json(), json!([2]));
/// ```
pub struct FhirPathEngine {
    functions: Arc<FunctionRegistry>,
    config: EvaluationConfig,
    cache: Option<Mutex<LruCache<String, Arc<ExpressionNode>>>>,
}

impl Default for FhirPathEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FhirPathEngine {
    /// Create an engine with the built-in functions and default limits
    pub fn new() -> Self {
        Self::with_config(EvaluationConfig::default())
    }

    /// Create an engine with the given limits; a cache capacity of 0 disables caching
    pub fn with_config(config: EvaluationConfig) -> Self {
        let cache = NonZeroUsize::new(config.cache_capacity).map(|cap| Mutex::new(LruCache::new(cap)));
        Self {
            functions: FunctionRegistry::standard(),
            config,
            cache,
        }
    }

    /// Replace the function registry, e.g. with one carrying user functions
    pub fn with_functions(mut self, functions: Arc<FunctionRegistry>) -> Self {
        self.functions = functions;
        self
    }

    /// Engine configuration
    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Function registry used for new environments
    pub fn functions(&self) -> &Arc<FunctionRegistry> {
        &self.functions
    }

    /// Environment preloaded with this engine's functions and limits
    pub fn environment(&self) -> Environment {
        Environment::new()
            .with_functions(Arc::clone(&self.functions))
            .with_config(self.config.clone())
    }

    /// Parse `expression`, reusing a cached AST when the same text was seen before
    pub fn parse_cached(&self, expression: &str) -> Result<Arc<ExpressionNode>, ParseError> {
        let Some(cache) = &self.cache else {
            return parse(expression).map(Arc::new);
        };
        if let Some(ast) = cache.lock().get(expression) {
            log::debug!("reusing parsed expression '{expression}'");
            return Ok(Arc::clone(ast));
        }
        let ast = Arc::new(parse(expression)?);
        cache.lock().put(expression.to_string(), Arc::clone(&ast));
        Ok(ast)
    }

    /// Number of cached expressions
    pub fn cached_expressions(&self) -> usize {
        self.cache.as_ref().map_or(0, |cache| cache.lock().len())
    }

    /// Evaluate `expression` against a JSON resource
    pub fn evaluate(&self, expression: &str, resource: &Value) -> Result<Collection, FhirPathError> {
        let env = self.environment().with_json_resource(resource);
        self.evaluate_with_env(expression, &env)
    }

    /// Evaluate `expression` with a caller-built environment
    ///
    /// The input is `%context` when set, otherwise empty.
    pub fn evaluate_with_env(
        &self,
        expression: &str,
        env: &Environment,
    ) -> Result<Collection, FhirPathError> {
        let ast = self.parse_cached(expression)?;
        let input = env.context().cloned().unwrap_or_default();
        Ok(evaluate(&ast, &input, env)?)
    }

    /// Evaluate `expression` against an arbitrary JSON value (not necessarily a resource)
    pub fn evaluate_json(&self, expression: &str, input: &Value) -> Result<Collection, FhirPathError> {
        let input = json_to_collection(input, None);
        let env = self.environment().with_context(input);
        self.evaluate_with_env(expression, &env)
    }
}

impl std::fmt::Debug for FhirPathEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FhirPathEngine")
            .field("functions", &self.functions.len())
            .field("config", &self.config)
            .field("cached_expressions", &self.cached_expressions())
            .finish()
    }
}
