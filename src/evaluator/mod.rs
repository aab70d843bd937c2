//! FHIRPath expression evaluator
//!
//! Walks an [`ExpressionNode`](crate::ast::ExpressionNode) tree against an
//! input collection within an [`Environment`].

mod context;
mod engine;
mod environment;
pub mod operators;

pub use context::{FunctionContext, Scope};
pub use engine::{Evaluator, evaluate};
pub use environment::Environment;
