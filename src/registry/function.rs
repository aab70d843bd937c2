// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Function trait and registry

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

use super::signature::{FunctionSignature, ParameterInfo, ParameterKind};
use crate::core::{EvaluationError, EvaluationResult};
use crate::evaluator::FunctionContext;
use crate::model::Collection;

/// Result type for function evaluation
pub type FunctionResult = EvaluationResult<Collection>;

/// How a function consumes its input collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// Expression arguments are evaluated once per input item with `$this` bound
    ElementWise,
    /// The input is consumed as a whole
    CollectionWise,
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ElementWise => write!(f, "element-wise"),
            Self::CollectionWise => write!(f, "collection-wise"),
        }
    }
}

/// Trait for implementing FHIRPath functions
pub trait FhirPathFunction: Send + Sync {
    /// Get the function name
    fn name(&self) -> &str;

    /// Get the function signature
    fn signature(&self) -> &FunctionSignature;

    /// Whether the function iterates its input element by element
    fn kind(&self) -> FunctionKind {
        FunctionKind::CollectionWise
    }

    /// Get function documentation
    fn documentation(&self) -> &str {
        ""
    }

    /// Evaluate the function
    fn evaluate(&self, ctx: &mut FunctionContext<'_, '_>) -> FunctionResult;

    /// Check the argument count against the signature
    fn validate_arity(&self, actual: usize) -> EvaluationResult<()> {
        let sig = self.signature();
        if sig.accepts(actual) {
            Ok(())
        } else {
            Err(EvaluationError::wrong_arity(
                self.name(),
                sig.min_arity,
                sig.max_arity,
                actual,
            ))
        }
    }
}

type ClosureFn = dyn Fn(&mut FunctionContext<'_, '_>) -> FunctionResult + Send + Sync;

/// Function backed by a closure
struct ClosureFunction {
    signature: FunctionSignature,
    kind: FunctionKind,
    documentation: String,
    func: Arc<ClosureFn>,
}

impl FhirPathFunction for ClosureFunction {
    fn name(&self) -> &str {
        &self.signature.name
    }

    fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    fn kind(&self) -> FunctionKind {
        self.kind
    }

    fn documentation(&self) -> &str {
        &self.documentation
    }

    fn evaluate(&self, ctx: &mut FunctionContext<'_, '_>) -> FunctionResult {
        (self.func)(ctx)
    }
}

/// Registry of FHIRPath functions keyed by name
///
/// Cloning is cheap: functions are shared behind `Arc`.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: FxHashMap<String, Arc<dyn FhirPathFunction>>,
}

static STANDARD: Lazy<Arc<FunctionRegistry>> =
    Lazy::new(|| Arc::new(FunctionRegistry::with_builtins()));

impl FunctionRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every built-in function
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        register_builtin_functions(&mut registry);
        registry
    }

    /// Shared registry of built-in functions
    pub fn standard() -> Arc<FunctionRegistry> {
        Arc::clone(&STANDARD)
    }

    /// Register a trait-based function, replacing any function of the same name
    pub fn register<F: FhirPathFunction + 'static>(&mut self, function: F) {
        let name = function.name().to_string();
        log::trace!("registering function '{name}'");
        self.functions.insert(name, Arc::new(function));
    }

    /// Register a closure-based function
    pub fn register_closure<F>(
        &mut self,
        signature: FunctionSignature,
        kind: FunctionKind,
        documentation: impl Into<String>,
        func: F,
    ) where
        F: Fn(&mut FunctionContext<'_, '_>) -> FunctionResult + Send + Sync + 'static,
    {
        self.register(ClosureFunction {
            signature,
            kind,
            documentation: documentation.into(),
            func: Arc::new(func),
        });
    }

    /// Register a collection-wise closure whose arguments are all values
    pub fn register_fn<F>(
        &mut self,
        name: impl Into<String>,
        min_arity: usize,
        max_arity: Option<usize>,
        func: F,
    ) where
        F: Fn(&mut FunctionContext<'_, '_>) -> FunctionResult + Send + Sync + 'static,
    {
        let declared = max_arity.unwrap_or(min_arity);
        let parameters = (0..declared)
            .map(|i| {
                let name = format!("arg{i}");
                if i >= min_arity {
                    ParameterInfo::optional(name, ParameterKind::Value)
                } else {
                    ParameterInfo::required(name, ParameterKind::Value)
                }
            })
            .collect();
        let signature = match max_arity {
            Some(_) => FunctionSignature::new(name, parameters),
            None => FunctionSignature::variadic(name, parameters),
        };
        self.register_closure(signature, FunctionKind::CollectionWise, "", func);
    }

    /// Look up a function by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn FhirPathFunction>> {
        self.functions.get(name)
    }

    /// Whether a function with this name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered function names, sorted
    pub fn function_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered functions
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Markdown reference of every registered function
    pub fn generate_function_docs(&self) -> String {
        let mut docs = String::from("# FHIRPath Functions\n\n");
        for name in self.function_names() {
            if let Some(function) = self.get(name) {
                docs.push_str(&format!("## `{}`\n\n", function.signature()));
                docs.push_str(&format!("*{}*\n\n", function.kind()));
                if !function.documentation().is_empty() {
                    docs.push_str(function.documentation());
                    docs.push_str("\n\n");
                }
            }
        }
        docs
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("function_count", &self.functions.len())
            .finish()
    }
}

/// Register all built-in functions
pub fn register_builtin_functions(registry: &mut FunctionRegistry) {
    use super::functions;

    functions::existence::register(registry);
    functions::filtering::register(registry);
    functions::subsetting::register(registry);
    functions::combining::register(registry);
    functions::conversion::register(registry);
    functions::string::register(registry);
    functions::math::register(registry);
    functions::tree::register(registry);
    functions::utility::register(registry);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let registry = FunctionRegistry::with_builtins();
        for name in ["count", "where", "select", "substring", "iif", "aggregate", "ofType"] {
            assert!(registry.contains(name), "missing {name}");
        }
        assert!(!registry.contains("nope"));
    }

    #[test]
    fn test_register_fn_signature() {
        let mut registry = FunctionRegistry::new();
        registry.register_fn("answer", 0, Some(1), |_| Ok(Collection::singleton(42)));
        let function = registry.get("answer").unwrap();
        assert_eq!(function.signature().min_arity, 0);
        assert_eq!(function.signature().max_arity, Some(1));
        assert!(function.validate_arity(2).is_err());
        assert_eq!(function.kind(), FunctionKind::CollectionWise);
    }

    #[test]
    fn test_docs_show_how_input_is_consumed() {
        let docs = FunctionRegistry::with_builtins().generate_function_docs();
        let section = |name: &str| {
            let start = docs.find(&format!("## `{name}(")).unwrap();
            let rest = &docs[start + 4..];
            rest[..rest.find("## ").unwrap_or(rest.len())].to_string()
        };
        assert!(section("where").contains("*element-wise*"));
        assert!(section("count").contains("*collection-wise*"));
    }

    #[test]
    fn test_function_names_sorted() {
        let registry = FunctionRegistry::with_builtins();
        let names = registry.function_names();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }
}
