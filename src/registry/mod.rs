//! Function registry for FHIRPath
//!
//! Functions are looked up by name at call time, so user code can add
//! functions next to the built-ins through [`FunctionRegistry::register`] or
//! one of the closure helpers.

#![warn(missing_docs)]

pub mod function;
pub mod functions;
pub mod signature;

pub use crate::evaluator::FunctionContext;
pub use function::{
    FhirPathFunction, FunctionKind, FunctionRegistry, FunctionResult, register_builtin_functions,
};
pub use signature::{FunctionSignature, ParameterInfo, ParameterKind};
