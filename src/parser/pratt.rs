//! Pratt parser for FHIRPath expressions
//!
//! Precedence climbing over a [`TokenStream`]. Binary operators climb the
//! [`Precedence`] ladder; unary signs, type operators and the postfix
//! invocation chain are handled by dedicated levels below the loop.

use rust_decimal::Decimal;
use std::borrow::Cow;
use std::str::FromStr;

use super::lexer::TokenStream;
use super::span::Spanned;
use super::tokenizer::{Token, tokenize};
use crate::ast::{
    BinaryOperator, ExpressionNode, LiteralValue, SpecialVariable, UnaryOperator,
};
use crate::core::{ParseError, ParseResult};
use crate::model::quantity::is_calendar_keyword;
use crate::model::{PrecisionDate, PrecisionDateTime, PrecisionTime, Quantity, TypeSpecifier};

/// Maximum nesting of parenthesised or bracketed sub-expressions
const MAX_NESTING: usize = 256;

/// Operator precedence levels (higher = tighter binding)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    /// Lowest precedence - implies (right associative)
    Implies = 1,
    /// Logical OR and XOR
    Or = 2,
    /// Logical AND
    And = 3,
    /// Membership operators (in, contains)
    Membership = 4,
    /// Equality operators (=, !=, ~, !~)
    Equality = 5,
    /// Inequality operators (<, >, <=, >=)
    Inequality = 6,
    /// Union operator (|)
    Union = 7,
    /// Additive operators (+, -, &)
    Additive = 8,
    /// Multiplicative operators (*, /, div, mod)
    Multiplicative = 9,
    /// Unary operators (+, -)
    Unary = 10,
    /// Type operators (is, as)
    Type = 11,
    /// Invocation/Indexing (., [])
    Invocation = 12,
}

impl Precedence {
    /// Get the next higher precedence level for left-associative operators
    pub const fn next_level(self) -> Self {
        match self {
            Precedence::Implies => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Membership,
            Precedence::Membership => Precedence::Equality,
            Precedence::Equality => Precedence::Inequality,
            Precedence::Inequality => Precedence::Union,
            Precedence::Union => Precedence::Additive,
            Precedence::Additive => Precedence::Multiplicative,
            Precedence::Multiplicative => Precedence::Unary,
            Precedence::Unary => Precedence::Type,
            Precedence::Type | Precedence::Invocation => Precedence::Invocation,
        }
    }

    /// Whether operators at this level group to the right
    pub const fn is_right_associative(self) -> bool {
        matches!(self, Precedence::Implies)
    }
}

/// Binary operator and its precedence for an infix token
fn binary_operator(token: &Token<'_>) -> Option<(BinaryOperator, Precedence)> {
    Some(match token {
        Token::Implies => (BinaryOperator::Implies, Precedence::Implies),
        Token::Or => (BinaryOperator::Or, Precedence::Or),
        Token::Xor => (BinaryOperator::Xor, Precedence::Or),
        Token::And => (BinaryOperator::And, Precedence::And),
        Token::In => (BinaryOperator::In, Precedence::Membership),
        Token::Contains => (BinaryOperator::Contains, Precedence::Membership),
        Token::Equal => (BinaryOperator::Equal, Precedence::Equality),
        Token::NotEqual => (BinaryOperator::NotEqual, Precedence::Equality),
        Token::Equivalent => (BinaryOperator::Equivalent, Precedence::Equality),
        Token::NotEquivalent => (BinaryOperator::NotEquivalent, Precedence::Equality),
        Token::LessThan => (BinaryOperator::LessThan, Precedence::Inequality),
        Token::LessThanOrEqual => (BinaryOperator::LessThanOrEqual, Precedence::Inequality),
        Token::GreaterThan => (BinaryOperator::GreaterThan, Precedence::Inequality),
        Token::GreaterThanOrEqual => {
            (BinaryOperator::GreaterThanOrEqual, Precedence::Inequality)
        }
        Token::Pipe => (BinaryOperator::Union, Precedence::Union),
        Token::Plus => (BinaryOperator::Add, Precedence::Additive),
        Token::Minus => (BinaryOperator::Subtract, Precedence::Additive),
        Token::Ampersand => (BinaryOperator::Concatenate, Precedence::Additive),
        Token::Multiply => (BinaryOperator::Multiply, Precedence::Multiplicative),
        Token::Divide => (BinaryOperator::Divide, Precedence::Multiplicative),
        Token::Div => (BinaryOperator::IntegerDivide, Precedence::Multiplicative),
        Token::Mod => (BinaryOperator::Modulo, Precedence::Multiplicative),
        _ => return None,
    })
}

/// Pratt parser over a token stream
pub struct PrattParser<'input> {
    tokens: TokenStream<'input>,
    depth: usize,
}

impl<'input> PrattParser<'input> {
    /// Create a parser over already tokenized input
    pub fn new(tokens: TokenStream<'input>) -> Self {
        Self { tokens, depth: 0 }
    }

    /// Parse a complete expression; trailing tokens are an error
    pub fn parse(&mut self) -> ParseResult<ExpressionNode> {
        let expr = self.parse_expression(Precedence::Implies)?;
        if !self.tokens.is_eof() {
            return Err(self
                .tokens
                .error_expected(Cow::Borrowed("an operator or end of input")));
        }
        Ok(expr)
    }

    fn enter(&mut self) -> ParseResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(ParseError::syntax(
                self.tokens.offset(),
                "expression is nested too deeply",
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Precedence climbing over binary operators
    fn parse_expression(&mut self, min_precedence: Precedence) -> ParseResult<ExpressionNode> {
        self.enter()?;
        let mut left = self.parse_unary()?;

        while let Some(token) = self.tokens.peek() {
            let (op, precedence) = match binary_operator(&token.value) {
                Some((op, prec)) if prec >= min_precedence => (op, prec),
                _ => break,
            };
            self.tokens.next();

            let next_min = if precedence.is_right_associative() {
                precedence
            } else {
                precedence.next_level()
            };
            let right = self.parse_expression(next_min)?;
            left = ExpressionNode::binary_op(op, left, right);
        }

        self.leave();
        Ok(left)
    }

    /// Unary `+`/`-`, then the type level
    fn parse_unary(&mut self) -> ParseResult<ExpressionNode> {
        let op = match self.tokens.peek().map(|t| t.value) {
            Some(Token::Minus) => UnaryOperator::Minus,
            Some(Token::Plus) => UnaryOperator::Plus,
            _ => return self.parse_type_operation(),
        };
        let sign = self.tokens.next();

        // fold `-<number>` into a literal so that i32::MIN is expressible
        if op == UnaryOperator::Minus {
            if let (Some(number), Some(sign)) = (self.tokens.peek().copied(), sign) {
                let follows_postfix = self
                    .tokens
                    .peek_ahead(1)
                    .is_some_and(|t| matches!(t.value, Token::Dot | Token::LeftBracket));
                let adjacent = number.start == sign.end;
                if adjacent && !follows_postfix {
                    if let Some(literal) = self.negative_number(number)? {
                        self.tokens.next();
                        let literal = self.parse_quantity_suffix(literal)?;
                        return self.parse_type_suffix(ExpressionNode::literal(literal));
                    }
                }
            }
        }

        self.enter()?;
        let operand = self.parse_unary()?;
        self.leave();
        Ok(ExpressionNode::unary_op(op, operand))
    }

    fn negative_number(&self, token: Spanned<Token<'input>>) -> ParseResult<Option<LiteralValue>> {
        let literal = match token.value {
            Token::Integer(digits) => {
                LiteralValue::Integer(parse_int(&format!("-{digits}"), "integer", token.start)?)
            }
            Token::Long(digits) => {
                LiteralValue::Long(parse_int(&format!("-{digits}"), "long", token.start)?)
            }
            Token::Decimal(text) => {
                LiteralValue::Decimal(parse_decimal(&format!("-{text}"), token.start)?)
            }
            _ => return Ok(None),
        };
        Ok(Some(literal))
    }

    /// Postfix chain followed by any number of `is`/`as` type operators
    fn parse_type_operation(&mut self) -> ParseResult<ExpressionNode> {
        let primary = self.parse_primary()?;
        let term = self.parse_postfix(primary)?;
        self.parse_type_suffix(term)
    }

    fn parse_type_suffix(&mut self, mut expr: ExpressionNode) -> ParseResult<ExpressionNode> {
        loop {
            let op = match self.tokens.peek().map(|t| t.value) {
                Some(Token::Is) => BinaryOperator::Is,
                Some(Token::As) => BinaryOperator::As,
                _ => return Ok(expr),
            };
            self.tokens.next();
            let spec = self.parse_type_specifier()?;
            expr = ExpressionNode::binary_op(op, expr, ExpressionNode::TypeSpecifier(spec));
        }
    }

    /// `Name` or `Namespace.Name`, optionally parenthesised
    fn parse_type_specifier(&mut self) -> ParseResult<TypeSpecifier> {
        let parenthesised = self.tokens.consume_if(|t| *t == Token::LeftParen).is_some();
        let first = self.expect_name("a type name")?;
        let spec = if self.tokens.consume_if(|t| *t == Token::Dot).is_some() {
            let name = self.expect_name("a type name after '.'")?;
            TypeSpecifier::new(Some(first), name)
        } else {
            TypeSpecifier::new(None, first)
        };
        if parenthesised {
            self.tokens.expect(Token::RightParen)?;
        }
        Ok(spec)
    }

    fn expect_name(&mut self, expected: &'static str) -> ParseResult<String> {
        let token = self
            .tokens
            .peek()
            .copied()
            .ok_or_else(|| self.tokens.error_expected(Cow::Borrowed(expected)))?;
        let name = match token.value {
            Token::Identifier(name) => name.to_string(),
            Token::DelimitedIdentifier(raw) => unescape(raw, token.start + 1)?,
            other => match other.as_member_name() {
                Some(name) => name.to_string(),
                None => return Err(self.tokens.error_expected(Cow::Borrowed(expected))),
            },
        };
        self.tokens.next();
        Ok(name)
    }

    /// `.member`, `.function(args)` and `[index]` chains
    fn parse_postfix(&mut self, mut left: ExpressionNode) -> ParseResult<ExpressionNode> {
        loop {
            match self.tokens.peek().map(|t| t.value) {
                Some(Token::Dot) => {
                    self.tokens.next();
                    let name_token = self.tokens.peek().copied();
                    let name = self.expect_name("an identifier after '.'")?;
                    let callable = !matches!(
                        name_token.map(|t| t.value),
                        Some(Token::DelimitedIdentifier(_))
                    );
                    let member = if callable && self.tokens.check(&Token::LeftParen) {
                        self.parse_function_call(name)?
                    } else {
                        ExpressionNode::Identifier(name)
                    };
                    left = ExpressionNode::invocation(left, member);
                }
                Some(Token::LeftBracket) => {
                    self.tokens.next();
                    self.enter()?;
                    let index = self.parse_expression(Precedence::Implies)?;
                    self.leave();
                    self.tokens.expect(Token::RightBracket)?;
                    left = ExpressionNode::indexer(left, index);
                }
                _ => return Ok(left),
            }
        }
    }

    /// Argument list after a function name; the current token is `(`
    fn parse_function_call(&mut self, name: String) -> ParseResult<ExpressionNode> {
        self.tokens.expect(Token::LeftParen)?;
        let mut args = Vec::new();
        if self.tokens.consume_if(|t| *t == Token::RightParen).is_none() {
            loop {
                args.push(self.parse_expression(Precedence::Implies)?);
                if self.tokens.consume_if(|t| *t == Token::Comma).is_some() {
                    continue;
                }
                self.tokens.expect(Token::RightParen)?;
                break;
            }
        }
        Ok(ExpressionNode::function_call(name, args))
    }

    /// Terms: literals, variables, identifiers, calls, parenthesised expressions
    fn parse_primary(&mut self) -> ParseResult<ExpressionNode> {
        let Some(token) = self.tokens.next() else {
            return Err(self.tokens.error_expected(Cow::Borrowed("an expression")));
        };

        let node = match token.value {
            Token::Integer(digits) => {
                let literal = LiteralValue::Integer(parse_int(digits, "integer", token.start)?);
                ExpressionNode::literal(self.parse_quantity_suffix(literal)?)
            }
            Token::Long(digits) => {
                ExpressionNode::literal(LiteralValue::Long(parse_int(digits, "long", token.start)?))
            }
            Token::Decimal(text) => {
                let literal = LiteralValue::Decimal(parse_decimal(text, token.start)?);
                ExpressionNode::literal(self.parse_quantity_suffix(literal)?)
            }
            Token::String(raw) => {
                ExpressionNode::literal(LiteralValue::String(unescape(raw, token.start + 1)?))
            }
            Token::Date(text) => ExpressionNode::literal(LiteralValue::Date(
                PrecisionDate::parse(text).ok_or_else(|| invalid("date", text, token.start))?,
            )),
            Token::DateTime(text) => ExpressionNode::literal(LiteralValue::DateTime(
                PrecisionDateTime::parse(text)
                    .ok_or_else(|| invalid("dateTime", text, token.start))?,
            )),
            Token::Time(text) => ExpressionNode::literal(LiteralValue::Time(
                PrecisionTime::parse(text).ok_or_else(|| invalid("time", text, token.start))?,
            )),
            Token::True => ExpressionNode::literal(LiteralValue::Boolean(true)),
            Token::False => ExpressionNode::literal(LiteralValue::Boolean(false)),
            Token::LeftBrace => {
                self.tokens.expect(Token::RightBrace)?;
                ExpressionNode::literal(LiteralValue::Empty)
            }
            Token::DollarThis => ExpressionNode::Variable(SpecialVariable::This),
            Token::DollarIndex => ExpressionNode::Variable(SpecialVariable::Index),
            Token::DollarTotal => ExpressionNode::Variable(SpecialVariable::Total),
            Token::Percent => {
                let name = match self.tokens.peek().copied() {
                    Some(Spanned {
                        value: Token::String(raw),
                        start,
                        ..
                    }) => {
                        self.tokens.next();
                        unescape(raw, start + 1)?
                    }
                    _ => self.expect_name("a constant name after '%'")?,
                };
                ExpressionNode::ExternalConstant(name)
            }
            Token::LeftParen => {
                self.enter()?;
                let inner = self.parse_expression(Precedence::Implies)?;
                self.leave();
                self.tokens.expect(Token::RightParen)?;
                inner
            }
            Token::Identifier(name) => {
                if self.tokens.check(&Token::LeftParen) {
                    self.parse_function_call(name.to_string())?
                } else {
                    ExpressionNode::Identifier(name.to_string())
                }
            }
            Token::DelimitedIdentifier(raw) => {
                ExpressionNode::Identifier(unescape(raw, token.start + 1)?)
            }
            other => match other.as_member_name() {
                // keywords double as function names: contains('x'), is(Type)
                Some(name) if self.tokens.check(&Token::LeftParen) => {
                    self.parse_function_call(name.to_string())?
                }
                _ => {
                    return Err(ParseError::UnexpectedToken {
                        token: Cow::Owned(other.to_string()),
                        position: token.start,
                        expected: Cow::Borrowed("an expression"),
                    });
                }
            },
        };
        Ok(node)
    }

    /// Turn a number followed by a unit into a quantity literal
    fn parse_quantity_suffix(&mut self, number: LiteralValue) -> ParseResult<LiteralValue> {
        let value = match &number {
            LiteralValue::Integer(i) => Decimal::from(*i),
            LiteralValue::Decimal(d) => *d,
            _ => return Ok(number),
        };
        let unit = match self.tokens.peek().copied() {
            Some(Spanned {
                value: Token::String(raw),
                start,
                ..
            }) => unescape(raw, start + 1)?,
            Some(Spanned {
                value: Token::Identifier(word),
                ..
            }) if is_calendar_keyword(word) => word.to_string(),
            _ => return Ok(number),
        };
        self.tokens.next();
        Ok(LiteralValue::Quantity(Quantity::new(value, unit)))
    }
}

fn invalid(kind: &'static str, text: &str, position: usize) -> ParseError {
    ParseError::InvalidLiteral {
        kind,
        value: text.to_string(),
        position,
    }
}

fn parse_int<T: FromStr>(text: &str, kind: &'static str, position: usize) -> ParseResult<T> {
    text.parse().map_err(|_| invalid(kind, text, position))
}

fn parse_decimal(text: &str, position: usize) -> ParseResult<Decimal> {
    Decimal::from_str_exact(text).map_err(|_| invalid("decimal", text, position))
}

/// Resolve backslash escapes; `base` is the offset of `raw` in the source
pub(crate) fn unescape(raw: &str, base: usize) -> ParseResult<String> {
    if !raw.contains('\\') {
        return Ok(raw.to_string());
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.char_indices();
    while let Some((idx, c)) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let escape_error = |sequence: String| ParseError::InvalidEscape {
            sequence,
            position: base + idx,
        };
        let Some((_, escaped)) = chars.next() else {
            return Err(escape_error("\\".to_string()));
        };
        match escaped {
            '\'' | '"' | '`' | '\\' | '/' => out.push(escaped),
            'f' => out.push('\u{000C}'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'u' => {
                let hex: String = chars.by_ref().take(4).map(|(_, h)| h).collect();
                let code = (hex.len() == 4)
                    .then(|| u32::from_str_radix(&hex, 16).ok())
                    .flatten()
                    .and_then(char::from_u32)
                    .ok_or_else(|| escape_error(format!("\\u{hex}")))?;
                out.push(code);
            }
            other => return Err(escape_error(format!("\\{other}"))),
        }
    }
    Ok(out)
}

/// Parse an already tokenized expression
pub fn parse_tokens(tokens: Vec<Spanned<Token<'_>>>) -> ParseResult<ExpressionNode> {
    PrattParser::new(TokenStream::from_tokens(tokens)).parse()
}

/// Tokenize and parse an expression
pub fn parse_expression(input: &str) -> ParseResult<ExpressionNode> {
    let tokens = tokenize(input)?;
    PrattParser::new(TokenStream::new(tokens, input.len())).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> ExpressionNode {
        parse_expression(input).unwrap()
    }

    #[test]
    fn test_precedence_ordering() {
        assert!(Precedence::Implies < Precedence::Or);
        assert!(Precedence::Additive < Precedence::Multiplicative);
        assert!(Precedence::Unary < Precedence::Type);
        assert!(Precedence::Type < Precedence::Invocation);
    }

    #[test]
    fn test_arithmetic_precedence() {
        assert_eq!(parse("1 + 2 * 3").to_string(), "(1 + (2 * 3))");
        assert_eq!(parse("(1 + 2) * 3").to_string(), "((1 + 2) * 3)");
        assert_eq!(parse("1 - 2 - 3").to_string(), "((1 - 2) - 3)");
    }

    #[test]
    fn test_implies_is_right_associative() {
        assert_eq!(
            parse("a implies b implies c").to_string(),
            "(a implies (b implies c))"
        );
    }

    #[test]
    fn test_logical_levels() {
        assert_eq!(
            parse("a or b and c = d").to_string(),
            "(a or (b and (c = d)))"
        );
        assert_eq!(parse("a | b = c | d").to_string(), "((a | b) = (c | d))");
    }

    #[test]
    fn test_invocation_chain() {
        assert_eq!(
            parse("Patient.name.where(use = 'official').given[0]").to_string(),
            "Patient.name.where((use = 'official')).given[0]"
        );
    }

    #[test]
    fn test_type_operators() {
        assert_eq!(parse("value is Quantity").to_string(), "(value is Quantity)");
        assert_eq!(
            parse("value as System.String").to_string(),
            "(value as System.String)"
        );
    }

    #[test]
    fn test_negative_literals() {
        assert_eq!(
            parse("-2147483648"),
            ExpressionNode::literal(LiteralValue::Integer(i32::MIN))
        );
        assert_eq!(parse("-5.abs()").to_string(), "-5.abs()");
        assert!(matches!(parse("-5.abs()"), ExpressionNode::UnaryOp { .. }));
    }

    #[test]
    fn test_integer_overflow_is_parse_error() {
        let err = parse_expression("2147483648").unwrap_err();
        assert!(matches!(err, ParseError::InvalidLiteral { kind: "integer", .. }));
        assert_eq!(parse("2147483648L"), ExpressionNode::literal(LiteralValue::Long(2_147_483_648)));
    }

    #[test]
    fn test_quantity_literals() {
        let ExpressionNode::Literal(LiteralValue::Quantity(q)) = parse("5.5 'mg'") else {
            panic!("expected quantity literal");
        };
        assert_eq!(q.unit, "mg");
        let ExpressionNode::Literal(LiteralValue::Quantity(q)) = parse("3 days") else {
            panic!("expected quantity literal");
        };
        assert_eq!(q.unit, "days");
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            parse(r"'a\'b\nA'"),
            ExpressionNode::literal(LiteralValue::String("a'b\nA".to_string()))
        );
        let err = parse_expression(r"'bad \q'").unwrap_err();
        assert_eq!(err.offset(), 5);
    }

    #[test]
    fn test_external_constants() {
        assert_eq!(parse("%resource"), ExpressionNode::ExternalConstant("resource".into()));
        assert_eq!(
            parse("%`us-zip`"),
            ExpressionNode::ExternalConstant("us-zip".into())
        );
    }

    #[test]
    fn test_errors_carry_offsets() {
        let err = parse_expression("1 + ").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedEof { position: 4, .. }));

        let err = parse_expression("name.given)").unwrap_err();
        assert_eq!(err.offset(), 10);

        let err = parse_expression("count(1,").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedEof { .. }));
    }

    #[test]
    fn test_keyword_function_names() {
        assert_eq!(
            parse("name.contains('x')").to_string(),
            "name.contains('x')"
        );
        assert_eq!(parse("Patient.is(Patient)").to_string(), "Patient.is(Patient)");
    }
}
