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

//! Runtime capability registry
//!
//! A server backend declares, per resource type, which interactions it
//! implements by registering handlers at startup. Requests are routed by a
//! `(resource type, capability)` lookup; anything not registered is
//! reported as [`DispatchError::Unsupported`].
//!
//! Search capabilities carry a [`SearchSpec`]: the search parameters of the
//! resource type, each defined by a FHIRPath expression that is parsed once
//! when the parameter is declared.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;

use crate::ast::ExpressionNode;
use crate::core::{EvaluationError, ParseError};
use crate::evaluator::{Environment, evaluate};
use crate::model::Collection;
use crate::parser::parse;

/// Errors raised while routing a request
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// No handler registered for this resource type and capability
    #[error("resource type '{resource_type}' does not support {capability}")]
    Unsupported {
        /// Requested resource type
        resource_type: String,
        /// Requested capability
        capability: CapabilityKind,
    },

    /// Search parameter expression failed to parse
    #[error("invalid search parameter '{name}': {source}")]
    InvalidSearchParameter {
        /// Parameter name
        name: String,
        /// Parse failure of its expression
        source: ParseError,
    },

    /// Search request names a parameter the resource type does not define
    #[error("unknown search parameter '{name}' for resource type '{resource_type}'")]
    UnknownSearchParameter {
        /// Resource type searched
        resource_type: String,
        /// Offending parameter name
        name: String,
    },

    /// Search parameter expression failed to evaluate
    #[error("evaluation of search parameter '{name}' failed: {source}")]
    Extraction {
        /// Parameter name
        name: String,
        /// Evaluation failure
        source: EvaluationError,
    },

    /// Failure reported by the backend handler
    #[error("{resource_type} handler failed: {message}")]
    Backend {
        /// Resource type of the request
        resource_type: String,
        /// Backend diagnostic
        message: String,
    },
}

/// Result type for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Interaction kinds a resource type may support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CapabilityKind {
    /// Read a resource by id
    Read,
    /// Search resources by parameters
    Search,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Search => f.write_str("search"),
        }
    }
}

/// A declared capability, as listed by [`CapabilityRegistry::capabilities`]
#[derive(Debug, Clone, PartialEq)]
pub enum Capability {
    /// Read by id
    Read,
    /// Search with the given parameters
    Search(SearchSpec),
}

impl Capability {
    /// Kind of this capability
    pub fn kind(&self) -> CapabilityKind {
        match self {
            Self::Read => CapabilityKind::Read,
            Self::Search(_) => CapabilityKind::Search,
        }
    }
}

/// A search parameter defined by a FHIRPath expression
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParameter {
    /// Parameter name as used in search requests
    pub name: String,
    /// Source text of the extraction expression
    pub expression: String,
    ast: Arc<ExpressionNode>,
}

impl SearchParameter {
    /// Parsed extraction expression
    pub fn ast(&self) -> &ExpressionNode {
        &self.ast
    }
}

/// Search parameters of one resource type
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchSpec {
    parameters: Vec<SearchParameter>,
}

impl SearchSpec {
    /// Create an empty set of search parameters
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter; its expression is parsed here
    ///
    /// A parameter with the same name replaces the earlier definition.
    pub fn with_parameter(
        mut self,
        name: impl Into<String>,
        expression: impl Into<String>,
    ) -> DispatchResult<Self> {
        let name = name.into();
        let expression = expression.into();
        let ast = parse(&expression).map_err(|source| DispatchError::InvalidSearchParameter {
            name: name.clone(),
            source,
        })?;
        self.parameters.retain(|p| p.name != name);
        self.parameters.push(SearchParameter {
            name,
            expression,
            ast: Arc::new(ast),
        });
        Ok(self)
    }

    /// Look up a parameter by name
    pub fn parameter(&self, name: &str) -> Option<&SearchParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// All parameters in declaration order
    pub fn parameters(&self) -> &[SearchParameter] {
        &self.parameters
    }

    /// Evaluate parameter `name` against a JSON resource
    ///
    /// Returns `None` when the parameter is not defined.
    pub fn extract(&self, name: &str, resource: &Value) -> DispatchResult<Option<Collection>> {
        let Some(parameter) = self.parameter(name) else {
            return Ok(None);
        };
        let env = Environment::new().with_json_resource(resource);
        let input = env.context().cloned().unwrap_or_default();
        evaluate(&parameter.ast, &input, &env)
            .map(Some)
            .map_err(|source| DispatchError::Extraction {
                name: name.to_string(),
                source,
            })
    }
}

/// Backend read: resource id to resource, `None` when absent
pub type ReadHandler = Box<dyn Fn(&str) -> DispatchResult<Option<Value>> + Send + Sync>;

/// Backend search: validated parameters to matching resources
pub type SearchHandler =
    Box<dyn Fn(&SearchSpec, &[(String, String)]) -> DispatchResult<Vec<Value>> + Send + Sync>;

enum Handler {
    Read(ReadHandler),
    Search {
        spec: SearchSpec,
        handler: SearchHandler,
    },
}

/// Routes read and search requests to the handlers registered per resource type
#[derive(Default)]
pub struct CapabilityRegistry {
    handlers: FxHashMap<(String, CapabilityKind), Handler>,
}

impl CapabilityRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare read support for a resource type
    pub fn register_read<F>(&mut self, resource_type: impl Into<String>, handler: F)
    where
        F: Fn(&str) -> DispatchResult<Option<Value>> + Send + Sync + 'static,
    {
        let resource_type = resource_type.into();
        log::debug!("registering read capability for {resource_type}");
        self.handlers.insert(
            (resource_type, CapabilityKind::Read),
            Handler::Read(Box::new(handler)),
        );
    }

    /// Declare search support for a resource type
    pub fn register_search<F>(&mut self, resource_type: impl Into<String>, spec: SearchSpec, handler: F)
    where
        F: Fn(&SearchSpec, &[(String, String)]) -> DispatchResult<Vec<Value>> + Send + Sync + 'static,
    {
        let resource_type = resource_type.into();
        log::debug!(
            "registering search capability for {resource_type} with {} parameter(s)",
            spec.parameters().len()
        );
        self.handlers.insert(
            (resource_type, CapabilityKind::Search),
            Handler::Search {
                spec,
                handler: Box::new(handler),
            },
        );
    }

    /// Whether `resource_type` supports `kind`
    pub fn supports(&self, resource_type: &str, kind: CapabilityKind) -> bool {
        self.handlers.contains_key(&(resource_type.to_string(), kind))
    }

    fn handler(&self, resource_type: &str, kind: CapabilityKind) -> DispatchResult<&Handler> {
        self.handlers
            .get(&(resource_type.to_string(), kind))
            .ok_or_else(|| DispatchError::Unsupported {
                resource_type: resource_type.to_string(),
                capability: kind,
            })
    }

    /// Read a resource by id
    pub fn read(&self, resource_type: &str, id: &str) -> DispatchResult<Option<Value>> {
        match self.handler(resource_type, CapabilityKind::Read)? {
            Handler::Read(read) => {
                log::trace!("read {resource_type}/{id}");
                read(id)
            }
            Handler::Search { .. } => Err(DispatchError::Unsupported {
                resource_type: resource_type.to_string(),
                capability: CapabilityKind::Read,
            }),
        }
    }

    /// Search resources; every parameter name must be defined by the type's spec
    pub fn search(
        &self,
        resource_type: &str,
        params: &[(String, String)],
    ) -> DispatchResult<Vec<Value>> {
        let Handler::Search { spec, handler } = self.handler(resource_type, CapabilityKind::Search)?
        else {
            return Err(DispatchError::Unsupported {
                resource_type: resource_type.to_string(),
                capability: CapabilityKind::Search,
            });
        };
        if let Some((name, _)) = params.iter().find(|(name, _)| spec.parameter(name).is_none()) {
            return Err(DispatchError::UnknownSearchParameter {
                resource_type: resource_type.to_string(),
                name: name.clone(),
            });
        }
        log::trace!("search {resource_type} with {} parameter(s)", params.len());
        handler(spec, params)
    }

    /// Search parameters of a resource type, if it supports search
    pub fn search_parameters(&self, resource_type: &str) -> Option<&SearchSpec> {
        match self.handlers.get(&(resource_type.to_string(), CapabilityKind::Search)) {
            Some(Handler::Search { spec, .. }) => Some(spec),
            _ => None,
        }
    }

    /// Every declared capability, sorted by resource type then kind
    pub fn capabilities(&self) -> Vec<(String, Capability)> {
        let mut listing: Vec<(String, Capability)> = self
            .handlers
            .iter()
            .map(|((resource_type, _), handler)| {
                let capability = match handler {
                    Handler::Read(_) => Capability::Read,
                    Handler::Search { spec, .. } => Capability::Search(spec.clone()),
                };
                (resource_type.clone(), capability)
            })
            .collect();
        listing.sort_by(|(a, x), (b, y)| a.cmp(b).then(x.kind().cmp(&y.kind())));
        listing
    }
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listing: Vec<String> = self
            .capabilities()
            .into_iter()
            .map(|(resource_type, capability)| format!("{resource_type}:{}", capability.kind()))
            .collect();
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &listing)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FhirPathValue;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn patients() -> Vec<Value> {
        vec![
            json!({"resourceType": "Patient", "id": "p1", "name": [{"family": "Doe", "given": ["Jane"]}]}),
            json!({"resourceType": "Patient", "id": "p2", "name": [{"family": "Roe", "given": ["Rick"]}]}),
        ]
    }

    fn patient_spec() -> SearchSpec {
        SearchSpec::new()
            .with_parameter("family", "Patient.name.family")
            .and_then(|spec| spec.with_parameter("given", "name.given"))
            .unwrap()
    }

    fn registry() -> CapabilityRegistry {
        let mut registry = CapabilityRegistry::new();
        registry.register_read("Patient", |id| {
            Ok(patients().into_iter().find(|p| p["id"] == id))
        });
        registry.register_search("Patient", patient_spec(), |spec, params| {
            let mut found = Vec::new();
            for patient in patients() {
                let mut matched = true;
                for (name, wanted) in params {
                    let values = spec.extract(name, &patient)?.unwrap_or_default();
                    let wanted = FhirPathValue::string(wanted.as_str());
                    matched &= values.iter().any(|v| *v == wanted);
                }
                if matched {
                    found.push(patient);
                }
            }
            Ok(found)
        });
        registry.register_read("Observation", |_| Ok(None));
        registry
    }

    #[test]
    fn test_read_routes_by_resource_type() {
        let registry = registry();
        let patient = registry.read("Patient", "p2").unwrap().unwrap();
        assert_eq!(patient["id"], "p2");
        assert_eq!(registry.read("Patient", "missing").unwrap(), None);
    }

    #[test]
    fn test_unsupported_capability() {
        let registry = registry();
        assert!(registry.supports("Patient", CapabilityKind::Search));
        assert!(!registry.supports("Observation", CapabilityKind::Search));
        let err = registry.search("Observation", &[]).unwrap_err();
        assert_eq!(
            err,
            DispatchError::Unsupported {
                resource_type: "Observation".to_string(),
                capability: CapabilityKind::Search,
            }
        );
        assert!(matches!(
            registry.read("Encounter", "e1"),
            Err(DispatchError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_search_extracts_parameters() {
        let registry = registry();
        let found = registry
            .search("Patient", &[("family".to_string(), "Roe".to_string())])
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["id"], "p2");

        let err = registry
            .search("Patient", &[("birthdate".to_string(), "2000".to_string())])
            .unwrap_err();
        assert!(matches!(err, DispatchError::UnknownSearchParameter { .. }));
    }

    #[test]
    fn test_invalid_parameter_expression() {
        let err = SearchSpec::new().with_parameter("broken", "name.(").unwrap_err();
        assert!(matches!(
            err,
            DispatchError::InvalidSearchParameter { ref name, .. } if name == "broken"
        ));
    }

    #[test]
    fn test_extract() {
        let spec = patient_spec();
        let resources = patients();
        let resource = &resources[0];
        assert_eq!(
            spec.extract("given", resource).unwrap(),
            Some(Collection::singleton("Jane"))
        );
        assert_eq!(spec.extract("nope", resource).unwrap(), None);
    }

    #[test]
    fn test_capabilities_are_sorted() {
        let registry = registry();
        let listing: Vec<(String, CapabilityKind)> = registry
            .capabilities()
            .into_iter()
            .map(|(resource_type, capability)| (resource_type, capability.kind()))
            .collect();
        assert_eq!(
            listing,
            vec![
                ("Observation".to_string(), CapabilityKind::Read),
                ("Patient".to_string(), CapabilityKind::Read),
                ("Patient".to_string(), CapabilityKind::Search),
            ]
        );
        assert_eq!(
            registry.search_parameters("Patient").map(|s| s.parameters().len()),
            Some(2)
        );
        assert!(registry.search_parameters("Observation").is_none());
    }
}
