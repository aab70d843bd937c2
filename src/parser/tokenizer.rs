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

//! Tokenizer for FHIRPath expressions
//!
//! A single left-to-right pass over the input bytes. Tokens borrow their
//! lexemes from the source; literal payloads are converted to typed values
//! by the parser.

use super::span::Spanned;
use crate::core::{ParseError, ParseResult};
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use std::borrow::Cow;
use std::fmt;

/// Lexical token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'input> {
    // Literals carry their raw lexeme
    /// Integer literal (e.g., 42)
    Integer(&'input str),
    /// Long literal without the `L` suffix (e.g., 42 from `42L`)
    Long(&'input str),
    /// Decimal literal (e.g., 3.14)
    Decimal(&'input str),
    /// String literal content between the quotes, escapes unresolved
    String(&'input str),
    /// Date literal without the leading `@` (e.g., 2023-01-01)
    Date(&'input str),
    /// DateTime literal without the leading `@` (e.g., 2023-01-01T12:00)
    DateTime(&'input str),
    /// Time literal without the leading `@T` (e.g., 12:00:00)
    Time(&'input str),

    // Identifiers
    /// Plain identifier
    Identifier(&'input str),
    /// Backtick-delimited identifier content, escapes unresolved
    DelimitedIdentifier(&'input str),

    // Operators
    /// Addition operator (+)
    Plus,
    /// Subtraction operator (-)
    Minus,
    /// Multiplication operator (*)
    Multiply,
    /// Division operator (/)
    Divide,
    /// String concatenation (&)
    Ampersand,
    /// Union operator (|)
    Pipe,
    /// Equality operator (=)
    Equal,
    /// Inequality operator (!=)
    NotEqual,
    /// Equivalence operator (~)
    Equivalent,
    /// Non-equivalence operator (!~)
    NotEquivalent,
    /// Less than operator (<)
    LessThan,
    /// Less than or equal operator (<=)
    LessThanOrEqual,
    /// Greater than operator (>)
    GreaterThan,
    /// Greater than or equal operator (>=)
    GreaterThanOrEqual,

    // Punctuation
    /// Member access (.)
    Dot,
    /// Argument separator (,)
    Comma,
    /// Left parenthesis
    LeftParen,
    /// Right parenthesis
    RightParen,
    /// Left bracket
    LeftBracket,
    /// Right bracket
    RightBracket,
    /// Left brace
    LeftBrace,
    /// Right brace
    RightBrace,
    /// External constant prefix (%)
    Percent,

    // Special variables
    /// `$this`
    DollarThis,
    /// `$index`
    DollarIndex,
    /// `$total`
    DollarTotal,

    // Keywords
    /// `true`
    True,
    /// `false`
    False,
    /// `and`
    And,
    /// `or`
    Or,
    /// `xor`
    Xor,
    /// `implies`
    Implies,
    /// `div`
    Div,
    /// `mod`
    Mod,
    /// `in`
    In,
    /// `contains`
    Contains,
    /// `is`
    Is,
    /// `as`
    As,
}

static KEYWORDS: Lazy<FxHashMap<&'static str, Token<'static>>> = Lazy::new(|| {
    let mut map = FxHashMap::default();
    map.insert("true", Token::True);
    map.insert("false", Token::False);
    map.insert("and", Token::And);
    map.insert("or", Token::Or);
    map.insert("xor", Token::Xor);
    map.insert("implies", Token::Implies);
    map.insert("div", Token::Div);
    map.insert("mod", Token::Mod);
    map.insert("in", Token::In);
    map.insert("contains", Token::Contains);
    map.insert("is", Token::Is);
    map.insert("as", Token::As);
    map
});

impl<'input> Token<'input> {
    /// Keyword token for `word`, if it is reserved
    pub fn keyword(word: &str) -> Option<Token<'static>> {
        KEYWORDS.get(word).copied()
    }

    /// Keywords that may also name a function or member (`x.contains('a')`)
    pub fn as_member_name(&self) -> Option<&'input str> {
        match self {
            Token::Identifier(name) | Token::DelimitedIdentifier(name) => Some(name),
            Token::Contains => Some("contains"),
            Token::In => Some("in"),
            Token::Is => Some("is"),
            Token::As => Some("as"),
            Token::Div => Some("div"),
            Token::Mod => Some("mod"),
            _ => None,
        }
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Integer(s) | Token::Decimal(s) | Token::Identifier(s) => f.write_str(s),
            Token::Long(s) => write!(f, "{s}L"),
            Token::String(s) => write!(f, "'{s}'"),
            Token::DelimitedIdentifier(s) => write!(f, "`{s}`"),
            Token::Date(s) | Token::DateTime(s) => write!(f, "@{s}"),
            Token::Time(s) => write!(f, "@T{s}"),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Multiply => f.write_str("*"),
            Token::Divide => f.write_str("/"),
            Token::Ampersand => f.write_str("&"),
            Token::Pipe => f.write_str("|"),
            Token::Equal => f.write_str("="),
            Token::NotEqual => f.write_str("!="),
            Token::Equivalent => f.write_str("~"),
            Token::NotEquivalent => f.write_str("!~"),
            Token::LessThan => f.write_str("<"),
            Token::LessThanOrEqual => f.write_str("<="),
            Token::GreaterThan => f.write_str(">"),
            Token::GreaterThanOrEqual => f.write_str(">="),
            Token::Dot => f.write_str("."),
            Token::Comma => f.write_str(","),
            Token::LeftParen => f.write_str("("),
            Token::RightParen => f.write_str(")"),
            Token::LeftBracket => f.write_str("["),
            Token::RightBracket => f.write_str("]"),
            Token::LeftBrace => f.write_str("{"),
            Token::RightBrace => f.write_str("}"),
            Token::Percent => f.write_str("%"),
            Token::DollarThis => f.write_str("$this"),
            Token::DollarIndex => f.write_str("$index"),
            Token::DollarTotal => f.write_str("$total"),
            Token::True => f.write_str("true"),
            Token::False => f.write_str("false"),
            Token::And => f.write_str("and"),
            Token::Or => f.write_str("or"),
            Token::Xor => f.write_str("xor"),
            Token::Implies => f.write_str("implies"),
            Token::Div => f.write_str("div"),
            Token::Mod => f.write_str("mod"),
            Token::In => f.write_str("in"),
            Token::Contains => f.write_str("contains"),
            Token::Is => f.write_str("is"),
            Token::As => f.write_str("as"),
        }
    }
}

/// Byte-oriented FHIRPath tokenizer
#[derive(Debug, Clone)]
pub struct Tokenizer<'input> {
    input: &'input str,
    bytes: &'input [u8],
    pos: usize,
}

impl<'input> Tokenizer<'input> {
    /// Create a tokenizer over `input`
    pub fn new(input: &'input str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    /// Current byte offset
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    fn slice(&self, start: usize, end: usize) -> &'input str {
        &self.input[start..end]
    }

    #[inline]
    fn peek_byte(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    #[inline]
    fn is_id_start(ch: u8) -> bool {
        matches!(ch, b'A'..=b'Z' | b'a'..=b'z' | b'_')
    }

    #[inline]
    fn is_id_continue(ch: u8) -> bool {
        matches!(ch, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_')
    }

    fn skip_trivia(&mut self) -> ParseResult<()> {
        loop {
            match (self.peek_byte(0), self.peek_byte(1)) {
                (Some(b' ' | b'\t' | b'\r' | b'\n'), _) => self.pos += 1,
                (Some(b'/'), Some(b'/')) => {
                    while let Some(b) = self.peek_byte(0) {
                        if b == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    let start = self.pos;
                    self.pos += 2;
                    loop {
                        match (self.peek_byte(0), self.peek_byte(1)) {
                            (Some(b'*'), Some(b'/')) => {
                                self.pos += 2;
                                break;
                            }
                            (Some(_), _) => self.pos += 1,
                            (None, _) => {
                                return Err(ParseError::Unclosed {
                                    kind: "comment",
                                    position: start,
                                });
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn scan_digits(&mut self) -> usize {
        let start = self.pos;
        while self.peek_byte(0).is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        self.pos - start
    }

    fn parse_number(&mut self) -> Token<'input> {
        let start = self.pos;
        self.scan_digits();

        // a dot only belongs to the number when digits follow it
        let is_decimal = self.peek_byte(0) == Some(b'.')
            && self.peek_byte(1).is_some_and(|b| b.is_ascii_digit());
        if is_decimal {
            self.pos += 1;
            self.scan_digits();
            return Token::Decimal(self.slice(start, self.pos));
        }

        let digits = self.slice(start, self.pos);
        let long_suffix = self.peek_byte(0) == Some(b'L')
            && !self.peek_byte(1).is_some_and(Self::is_id_continue);
        if long_suffix {
            self.pos += 1;
            Token::Long(digits)
        } else {
            Token::Integer(digits)
        }
    }

    /// Scan a quoted run up to the closing `quote`, skipping escapes
    fn parse_quoted(&mut self, quote: u8, kind: &'static str) -> ParseResult<&'input str> {
        let open = self.pos;
        self.pos += 1;
        let start = self.pos;
        while let Some(b) = self.peek_byte(0) {
            if b == quote {
                let content = self.slice(start, self.pos);
                self.pos += 1;
                return Ok(content);
            }
            self.pos += if b == b'\\' { 2 } else { 1 };
        }
        Err(ParseError::Unclosed {
            kind,
            position: open,
        })
    }

    fn parse_identifier(&mut self) -> &'input str {
        let start = self.pos;
        while self.peek_byte(0).is_some_and(Self::is_id_continue) {
            self.pos += 1;
        }
        self.slice(start, self.pos)
    }

    fn parse_special_variable(&mut self) -> ParseResult<Token<'input>> {
        let start = self.pos;
        self.pos += 1;
        let name = self.parse_identifier();
        match name {
            "this" => Ok(Token::DollarThis),
            "index" => Ok(Token::DollarIndex),
            "total" => Ok(Token::DollarTotal),
            _ => Err(ParseError::UnexpectedToken {
                token: Cow::Owned(format!("${name}")),
                position: start,
                expected: Cow::Borrowed("$this, $index or $total"),
            }),
        }
    }

    /// Fixed-width digit group, e.g. `-MM` or `:ss`
    fn scan_group(&mut self, separator: u8) -> bool {
        let matched = self.peek_byte(0) == Some(separator)
            && self.peek_byte(1).is_some_and(|b| b.is_ascii_digit())
            && self.peek_byte(2).is_some_and(|b| b.is_ascii_digit());
        if matched {
            self.pos += 3;
        }
        matched
    }

    fn scan_time(&mut self) -> bool {
        let hour_start = self.pos;
        if self.scan_digits() != 2 {
            self.pos = hour_start;
            return false;
        }
        if self.scan_group(b':') && self.scan_group(b':') && self.peek_byte(0) == Some(b'.') {
            self.pos += 1;
            if self.scan_digits() == 0 {
                return false;
            }
        }
        true
    }

    fn scan_timezone(&mut self) {
        match self.peek_byte(0) {
            Some(b'Z') => self.pos += 1,
            Some(b'+' | b'-') => {
                let start = self.pos;
                self.pos += 1;
                let hours = self.scan_digits();
                if hours != 2 || !self.scan_group(b':') {
                    // not a timezone; leave the sign for the operator scanner
                    self.pos = start;
                }
            }
            _ => {}
        }
    }

    fn parse_datetime_literal(&mut self) -> ParseResult<Token<'input>> {
        let at = self.pos;
        self.pos += 1;

        if self.peek_byte(0) == Some(b'T') {
            self.pos += 1;
            let start = self.pos;
            if !self.scan_time() {
                return Err(self.invalid_literal("time", at));
            }
            return Ok(Token::Time(self.slice(start, self.pos)));
        }

        let start = self.pos;
        if self.scan_digits() != 4 {
            return Err(self.invalid_literal("date", at));
        }
        if self.scan_group(b'-') {
            self.scan_group(b'-');
        }
        if self.peek_byte(0) != Some(b'T') {
            return Ok(Token::Date(self.slice(start, self.pos)));
        }
        self.pos += 1;
        if self.peek_byte(0).is_some_and(|b| b.is_ascii_digit()) {
            if !self.scan_time() {
                return Err(self.invalid_literal("dateTime", at));
            }
            self.scan_timezone();
        }
        Ok(Token::DateTime(self.slice(start, self.pos)))
    }

    fn invalid_literal(&mut self, kind: &'static str, start: usize) -> ParseError {
        while self
            .peek_byte(0)
            .is_some_and(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b':' | b'.'))
        {
            self.pos += 1;
        }
        ParseError::InvalidLiteral {
            kind,
            value: self.slice(start, self.pos).to_string(),
            position: start,
        }
    }

    /// Produce the next token, or `None` at end of input
    pub fn next_token(&mut self) -> ParseResult<Option<Spanned<Token<'input>>>> {
        self.skip_trivia()?;
        let start = self.pos;
        let Some(byte) = self.peek_byte(0) else {
            return Ok(None);
        };

        let single = |tokenizer: &mut Self, token| {
            tokenizer.pos += 1;
            token
        };
        let token = match byte {
            b'.' => single(self, Token::Dot),
            b',' => single(self, Token::Comma),
            b'(' => single(self, Token::LeftParen),
            b')' => single(self, Token::RightParen),
            b'[' => single(self, Token::LeftBracket),
            b']' => single(self, Token::RightBracket),
            b'{' => single(self, Token::LeftBrace),
            b'}' => single(self, Token::RightBrace),
            b'+' => single(self, Token::Plus),
            b'-' => single(self, Token::Minus),
            b'*' => single(self, Token::Multiply),
            b'/' => single(self, Token::Divide),
            b'&' => single(self, Token::Ampersand),
            b'|' => single(self, Token::Pipe),
            b'=' => single(self, Token::Equal),
            b'~' => single(self, Token::Equivalent),
            b'%' => single(self, Token::Percent),
            b'!' => match self.peek_byte(1) {
                Some(b'=') => {
                    self.pos += 2;
                    Token::NotEqual
                }
                Some(b'~') => {
                    self.pos += 2;
                    Token::NotEquivalent
                }
                _ => {
                    return Err(ParseError::UnexpectedToken {
                        token: Cow::Borrowed("!"),
                        position: start,
                        expected: Cow::Borrowed("!= or !~"),
                    });
                }
            },
            b'<' => {
                if self.peek_byte(1) == Some(b'=') {
                    self.pos += 2;
                    Token::LessThanOrEqual
                } else {
                    single(self, Token::LessThan)
                }
            }
            b'>' => {
                if self.peek_byte(1) == Some(b'=') {
                    self.pos += 2;
                    Token::GreaterThanOrEqual
                } else {
                    single(self, Token::GreaterThan)
                }
            }
            b'\'' => Token::String(self.parse_quoted(b'\'', "string")?),
            b'`' => Token::DelimitedIdentifier(self.parse_quoted(b'`', "delimited identifier")?),
            b'@' => self.parse_datetime_literal()?,
            b'$' => self.parse_special_variable()?,
            b'0'..=b'9' => self.parse_number(),
            b if Self::is_id_start(b) => {
                let word = self.parse_identifier();
                Token::keyword(word).unwrap_or(Token::Identifier(word))
            }
            _ => {
                let ch = self.input[start..].chars().next().unwrap_or('?');
                return Err(ParseError::UnexpectedToken {
                    token: Cow::Owned(ch.to_string()),
                    position: start,
                    expected: Cow::Borrowed("a token"),
                });
            }
        };
        Ok(Some(Spanned::new(token, start, self.pos)))
    }

    /// Tokenize the whole input
    pub fn tokenize_all(&mut self) -> ParseResult<Vec<Spanned<Token<'input>>>> {
        let mut tokens = Vec::with_capacity(self.input.len() / 3 + 1);
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }
}

/// Convert source text into a token stream
pub fn tokenize(input: &str) -> ParseResult<Vec<Spanned<Token<'_>>>> {
    Tokenizer::new(input).tokenize_all()
}
