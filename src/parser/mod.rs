//! FHIRPath expression parser
//!
//! Converts text into tokens and tokens into an immutable
//! [`ExpressionNode`](crate::ast::ExpressionNode) tree.

pub mod lexer;
pub mod pratt;
pub mod span;
pub mod tokenizer;

pub use crate::core::{ParseError, ParseResult};
pub use lexer::TokenStream;
pub use pratt::{PrattParser, Precedence, parse_expression, parse_tokens};
pub use span::Spanned;
pub use tokenizer::{Token, Tokenizer, tokenize};

/// Parse an FHIRPath expression string into an AST
pub fn parse(input: &str) -> ParseResult<crate::ast::ExpressionNode> {
    parse_expression(input)
}
