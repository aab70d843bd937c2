//! Evaluation environment
//!
//! Holds everything an evaluation may consult besides the expression and its
//! input: the `%context`/`%resource` roots, user variables, the function
//! registry and the evaluation limits. Environments are built once and shared
//! by reference across any number of evaluations.

use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::config::EvaluationConfig;
use crate::model::{Collection, json_to_collection};
use crate::registry::FunctionRegistry;

const UCUM_URL: &str = "http://unitsofmeasure.org";
const SNOMED_URL: &str = "http://snomed.info/sct";
const LOINC_URL: &str = "http://loinc.org";

/// Variables, functions and limits for an evaluation
#[derive(Debug, Clone)]
pub struct Environment {
    context: Option<Collection>,
    resource: Option<Collection>,
    root_resource: Option<Collection>,
    variables: FxHashMap<String, Collection>,
    functions: Arc<FunctionRegistry>,
    config: EvaluationConfig,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// Environment with the built-in functions and default limits
    pub fn new() -> Self {
        Self {
            context: None,
            resource: None,
            root_resource: None,
            variables: FxHashMap::default(),
            functions: FunctionRegistry::standard(),
            config: EvaluationConfig::default(),
        }
    }

    /// Use `resource` as `%context`, `%resource` and `%rootResource`
    pub fn with_resource(mut self, resource: impl Into<Collection>) -> Self {
        let resource = resource.into();
        self.context = Some(resource.clone());
        self.root_resource = Some(resource.clone());
        self.resource = Some(resource);
        self
    }

    /// Like [`Environment::with_resource`] for a JSON document
    pub fn with_json_resource(self, resource: &serde_json::Value) -> Self {
        self.with_resource(json_to_collection(resource, None))
    }

    /// Override `%context` only
    pub fn with_context(mut self, context: impl Into<Collection>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Override `%rootResource` only
    pub fn with_root_resource(mut self, root: impl Into<Collection>) -> Self {
        self.root_resource = Some(root.into());
        self
    }

    /// Define `%name`
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Collection>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Define `%name` in place
    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<Collection>) {
        self.variables.insert(name.into(), value.into());
    }

    /// Replace the function registry
    pub fn with_functions(mut self, functions: Arc<FunctionRegistry>) -> Self {
        self.functions = functions;
        self
    }

    /// Replace the evaluation limits
    pub fn with_config(mut self, config: EvaluationConfig) -> Self {
        self.config = config;
        self
    }

    /// Explicit `%context`, if one was set
    pub fn context(&self) -> Option<&Collection> {
        self.context.as_ref()
    }

    /// Resolve `%name`.
    ///
    /// User variables shadow the built-in constants. `input` stands in for
    /// `%context`, `%resource` and `%rootResource` when none was set.
    pub fn variable(&self, name: &str, input: &Collection) -> Option<Collection> {
        if let Some(value) = self.variables.get(name) {
            return Some(value.clone());
        }
        let context = || self.context.clone().unwrap_or_else(|| input.clone());
        match name {
            "context" => Some(context()),
            "resource" => Some(self.resource.clone().unwrap_or_else(context)),
            "rootResource" => Some(
                self.root_resource
                    .clone()
                    .or_else(|| self.resource.clone())
                    .unwrap_or_else(context),
            ),
            "ucum" => Some(Collection::singleton(UCUM_URL)),
            "sct" => Some(Collection::singleton(SNOMED_URL)),
            "loinc" => Some(Collection::singleton(LOINC_URL)),
            _ => None,
        }
    }

    /// Names of user-defined variables
    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    /// Function registry
    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Evaluation limits
    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_constants() {
        let env = Environment::new();
        let input = Collection::empty();
        assert_eq!(
            env.variable("ucum", &input),
            Some(Collection::singleton("http://unitsofmeasure.org"))
        );
        assert_eq!(env.variable("missing", &input), None);
    }

    #[test]
    fn test_context_falls_back_to_input() {
        let env = Environment::new();
        let input = Collection::singleton(5);
        assert_eq!(env.variable("context", &input), Some(input.clone()));
        assert_eq!(env.variable("rootResource", &input), Some(input));
    }

    #[test]
    fn test_user_variables_shadow_builtins() {
        let env = Environment::new().with_variable("ucum", Collection::singleton(1));
        assert_eq!(
            env.variable("ucum", &Collection::empty()),
            Some(Collection::singleton(1))
        );
    }

    #[test]
    fn test_json_resource_sets_roots() {
        let env = Environment::new().with_json_resource(&json!({"resourceType": "Patient"}));
        let resource = env.variable("resource", &Collection::empty()).unwrap();
        assert_eq!(resource.len(), 1);
        assert_eq!(resource.first().map(|v| v.type_name()), Some("Patient"));
    }
}
