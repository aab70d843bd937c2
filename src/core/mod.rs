//! Error types and the overflow-checked numeric core

pub mod error;
pub mod overflow;

pub use error::{EvalErrorKind, EvaluationError, EvaluationResult, ParseError, ParseResult};
pub use overflow::{ArithmeticOp, CheckedInteger};
