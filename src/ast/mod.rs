//! Abstract Syntax Tree (AST) definitions for FHIRPath expressions

mod expression;
mod operator;

pub use expression::*;
pub use operator::*;
