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

//! FHIRPath implementation in Rust
//!
//! Expressions go through a tokenizer and a Pratt parser into an immutable
//! AST, which a tree-walking evaluator runs against a collection of values.
//! Arithmetic is overflow-checked: a result that does not fit its type is
//! the empty collection, not an error.
//!
//! ```rust
//! use fhirpath_engine::{Collection, FhirPathEngine};
//! use serde_json::json;
//!
//! let engine = FhirPathEngine::new();
//! let obs = json!({"resourceType": "Observation", "valueQuantity": {"value": 180, "unit": "cm"}});
//! let result = engine.evaluate("2147483647 + 1", &obs).unwrap();
//! assert_eq!(result, Collection::empty());
//! ```

pub mod ast;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod engine;
pub mod evaluator;
pub mod model;
pub mod parser;
pub mod registry;

pub use config::EvaluationConfig;
pub use crate::core::{EvalErrorKind, EvaluationError, EvaluationResult, ParseError, ParseResult};
pub use dispatch::{Capability, CapabilityKind, CapabilityRegistry, DispatchError, SearchSpec};
pub use engine::{FhirPathEngine, FhirPathError};
pub use evaluator::{Environment, evaluate};
pub use model::{Collection, FhirPathValue};
pub use parser::parse;
pub use registry::{FhirPathFunction, FunctionContext, FunctionRegistry};
