//! Token stream with lookahead for the parser

use std::borrow::Cow;
use std::mem::discriminant;

use super::span::Spanned;
use super::tokenizer::Token;
use crate::core::{ParseError, ParseResult};

/// Token stream with lookahead capability
#[derive(Debug)]
pub struct TokenStream<'input> {
    tokens: Vec<Spanned<Token<'input>>>,
    position: usize,
    end_offset: usize,
}

impl<'input> TokenStream<'input> {
    /// Create a new token stream; `end_offset` is reported for end-of-input errors
    pub fn new(tokens: Vec<Spanned<Token<'input>>>, end_offset: usize) -> Self {
        Self {
            tokens,
            position: 0,
            end_offset,
        }
    }

    /// Create a stream whose end offset is the end of the last token
    pub fn from_tokens(tokens: Vec<Spanned<Token<'input>>>) -> Self {
        let end_offset = tokens.last().map_or(0, |t| t.end);
        Self::new(tokens, end_offset)
    }

    /// Peek at the current token without consuming
    pub fn peek(&self) -> Option<&Spanned<Token<'input>>> {
        self.tokens.get(self.position)
    }

    /// Peek at a token n positions ahead
    pub fn peek_ahead(&self, n: usize) -> Option<&Spanned<Token<'input>>> {
        self.tokens.get(self.position + n)
    }

    /// Whether the current token has the same kind as `token`
    pub fn check(&self, token: &Token<'_>) -> bool {
        self.peek()
            .is_some_and(|t| discriminant(&t.value) == discriminant(token))
    }

    /// Consume and return the current token
    pub fn next(&mut self) -> Option<Spanned<Token<'input>>> {
        let token = self.tokens.get(self.position).copied();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    /// Check if we're at the end of the stream
    pub fn is_eof(&self) -> bool {
        self.position >= self.tokens.len()
    }

    /// Byte offset of the current token, or of the end of input
    pub fn offset(&self) -> usize {
        self.peek().map_or(self.end_offset, |t| t.start)
    }

    /// Consume a token if it matches the predicate
    pub fn consume_if<F>(&mut self, predicate: F) -> Option<Spanned<Token<'input>>>
    where
        F: FnOnce(&Token<'input>) -> bool,
    {
        match self.peek() {
            Some(token) if predicate(&token.value) => self.next(),
            _ => None,
        }
    }

    /// Consume a token of the same kind as `expected` or fail
    pub fn expect(&mut self, expected: Token<'static>) -> ParseResult<Spanned<Token<'input>>> {
        if self.check(&expected) {
            if let Some(token) = self.next() {
                return Ok(token);
            }
        }
        Err(self.error_expected(Cow::Owned(format!("'{expected}'"))))
    }

    /// Error describing the current token against `expected`
    pub fn error_expected(&self, expected: Cow<'static, str>) -> ParseError {
        match self.peek() {
            Some(token) => ParseError::UnexpectedToken {
                token: Cow::Owned(token.value.to_string()),
                position: token.start,
                expected,
            },
            None => ParseError::UnexpectedEof {
                position: self.end_offset,
                expected,
            },
        }
    }
}
