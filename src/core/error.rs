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

//! Error types shared by the parser and the evaluator
//!
//! Two failure channels exist in FHIRPath. "No result" is an empty
//! collection and never surfaces here. Everything in this module is fatal
//! and aborts the whole parse or evaluation.

use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// Result type for tokenizer and parser operations
pub type ParseResult<T> = Result<T, ParseError>;

/// Result type for evaluation operations
pub type EvaluationResult<T> = Result<T, EvaluationError>;

/// Syntax errors raised while tokenizing or parsing an expression
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Generic syntax error with a description
    #[error("Syntax error at position {position}: {message}")]
    SyntaxError {
        /// Byte offset in the source text
        position: usize,
        /// Error description
        message: Cow<'static, str>,
    },

    /// A token appeared where the grammar did not allow it
    #[error("Unexpected token '{token}' at position {position}, expected {expected}")]
    UnexpectedToken {
        /// Lexeme of the offending token
        token: Cow<'static, str>,
        /// Byte offset in the source text
        position: usize,
        /// Human readable expectation
        expected: Cow<'static, str>,
    },

    /// Input ended before the expression was complete
    #[error("Unexpected end of input at position {position}, expected {expected}")]
    UnexpectedEof {
        /// Byte offset of the end of input
        position: usize,
        /// Human readable expectation
        expected: Cow<'static, str>,
    },

    /// Malformed literal (number out of range, invalid date, unknown unit)
    #[error("Invalid {kind} literal '{value}' at position {position}")]
    InvalidLiteral {
        /// Literal category
        kind: &'static str,
        /// Raw lexeme
        value: String,
        /// Byte offset in the source text
        position: usize,
    },

    /// Unknown or malformed escape sequence
    #[error("Invalid escape sequence '{sequence}' at position {position}")]
    InvalidEscape {
        /// The escape text, including the backslash
        sequence: String,
        /// Byte offset in the source text
        position: usize,
    },

    /// String or delimited identifier without its closing quote
    #[error("Unclosed {kind} starting at position {position}")]
    Unclosed {
        /// What was left open
        kind: &'static str,
        /// Byte offset of the opening quote
        position: usize,
    },
}

impl ParseError {
    /// Byte offset in the source text at which the error was detected
    pub fn offset(&self) -> usize {
        match self {
            ParseError::SyntaxError { position, .. }
            | ParseError::UnexpectedToken { position, .. }
            | ParseError::UnexpectedEof { position, .. }
            | ParseError::InvalidLiteral { position, .. }
            | ParseError::InvalidEscape { position, .. }
            | ParseError::Unclosed { position, .. } => *position,
        }
    }

    /// Error message without the position prefix
    pub fn message(&self) -> String {
        match self {
            ParseError::SyntaxError { message, .. } => message.to_string(),
            ParseError::UnexpectedToken {
                token, expected, ..
            } => format!("unexpected token '{token}', expected {expected}"),
            ParseError::UnexpectedEof { expected, .. } => {
                format!("unexpected end of input, expected {expected}")
            }
            ParseError::InvalidLiteral { kind, value, .. } => {
                format!("invalid {kind} literal '{value}'")
            }
            ParseError::InvalidEscape { sequence, .. } => {
                format!("invalid escape sequence '{sequence}'")
            }
            ParseError::Unclosed { kind, .. } => format!("unclosed {kind}"),
        }
    }

    pub(crate) fn syntax(position: usize, message: impl Into<Cow<'static, str>>) -> Self {
        ParseError::SyntaxError {
            position,
            message: message.into(),
        }
    }
}

/// Classification of fatal evaluation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvalErrorKind {
    /// A function was called with an unsupported number of arguments
    WrongArity,
    /// An operand or argument had a type the operation does not accept
    TypeMismatch,
    /// No function with the requested name is registered
    UnknownFunction,
    /// An external constant or variable is not defined
    UnknownIdentifier,
    /// A collection with more than one item reached a singleton position
    NonSingleton,
    /// The configured step or depth budget was exhausted
    Budget,
}

impl fmt::Display for EvalErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvalErrorKind::WrongArity => "wrong arity",
            EvalErrorKind::TypeMismatch => "type mismatch",
            EvalErrorKind::UnknownFunction => "unknown function",
            EvalErrorKind::UnknownIdentifier => "unknown identifier",
            EvalErrorKind::NonSingleton => "non-singleton",
            EvalErrorKind::Budget => "budget exceeded",
        };
        f.write_str(name)
    }
}

/// Fatal evaluation error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct EvaluationError {
    /// Error classification
    pub kind: EvalErrorKind,
    /// Diagnostic naming the node or function involved
    pub message: String,
}

impl EvaluationError {
    /// Create a new evaluation error
    pub fn new(kind: EvalErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Function called with the wrong number of arguments
    pub fn wrong_arity(name: &str, min: usize, max: Option<usize>, actual: usize) -> Self {
        let expected = match max {
            Some(max) if max == min => format!("{min}"),
            Some(max) => format!("{min}..{max}"),
            None => format!("at least {min}"),
        };
        Self::new(
            EvalErrorKind::WrongArity,
            format!("function '{name}' expects {expected} argument(s), got {actual}"),
        )
    }

    /// Operand or argument of an unsupported type
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::TypeMismatch, message)
    }

    /// Call of an unregistered function
    pub fn unknown_function(name: &str) -> Self {
        Self::new(
            EvalErrorKind::UnknownFunction,
            format!("unknown function '{name}'"),
        )
    }

    /// Reference to an undefined variable or constant
    pub fn unknown_identifier(name: &str) -> Self {
        Self::new(
            EvalErrorKind::UnknownIdentifier,
            format!("unknown identifier '{name}'"),
        )
    }

    /// Multi-item collection in a singleton position
    pub fn non_singleton(context: &str, len: usize) -> Self {
        Self::new(
            EvalErrorKind::NonSingleton,
            format!("{context} requires a single item, got a collection of {len}"),
        )
    }

    /// Step or depth ceiling exceeded
    pub fn budget(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::Budget, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_offset() {
        let err = ParseError::UnexpectedToken {
            token: Cow::Borrowed(")"),
            position: 7,
            expected: Cow::Borrowed("expression"),
        };
        assert_eq!(err.offset(), 7);
        assert_eq!(err.message(), "unexpected token ')', expected expression");
    }

    #[test]
    fn test_wrong_arity_message() {
        let err = EvaluationError::wrong_arity("count", 0, Some(0), 2);
        assert_eq!(err.kind, EvalErrorKind::WrongArity);
        assert_eq!(
            err.to_string(),
            "wrong arity: function 'count' expects 0 argument(s), got 2"
        );
    }
}
