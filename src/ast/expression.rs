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

//! Expression node definitions

use rust_decimal::Decimal;
use smallvec::SmallVec;
use std::fmt;

use super::operator::{BinaryOperator, UnaryOperator};
use crate::model::{
    Collection, FhirPathValue, PrecisionDate, PrecisionDateTime, PrecisionTime, Quantity,
    TypeSpecifier,
};

/// AST node for FHIRPath expressions
///
/// The tree is immutable once built and may be shared across threads and
/// evaluated any number of times.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionNode {
    /// Literal value
    Literal(LiteralValue),

    /// Bare identifier, resolved against the focus at evaluation time
    Identifier(String),

    /// Member access: `base.member`, where member is an identifier or function call
    Invocation {
        /// Expression producing the input collection
        base: Box<ExpressionNode>,
        /// Identifier or function call applied to each input item
        member: Box<ExpressionNode>,
    },

    /// Index access: `base[index]`
    Indexer {
        /// Base expression
        base: Box<ExpressionNode>,
        /// Index expression
        index: Box<ExpressionNode>,
    },

    /// Unary operation
    UnaryOp {
        /// The operator
        op: UnaryOperator,
        /// The operand
        operand: Box<ExpressionNode>,
    },

    /// Binary operation
    BinaryOp(Box<BinaryOpData>),

    /// Function call; when it is the member of an [`ExpressionNode::Invocation`]
    /// the base result is its input, otherwise the current focus is
    FunctionCall(Box<FunctionCallData>),

    /// Type name on the right of `is`/`as` or inside `ofType(...)`
    TypeSpecifier(TypeSpecifier),

    /// External constant (`%name`)
    ExternalConstant(String),

    /// `$this`, `$index` or `$total`
    Variable(SpecialVariable),
}

/// Binary operation data
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryOpData {
    /// The operator
    pub op: BinaryOperator,
    /// Left operand
    pub left: ExpressionNode,
    /// Right operand
    pub right: ExpressionNode,
}

/// Function call data
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCallData {
    /// Function name
    pub name: String,
    /// Unevaluated arguments
    pub args: SmallVec<[ExpressionNode; 4]>,
}

/// Special variables bound by the evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialVariable {
    /// Current item of an element-wise function
    This,
    /// Position of the current item
    Index,
    /// Accumulator of `aggregate()`
    Total,
}

impl SpecialVariable {
    /// Source spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::This => "$this",
            Self::Index => "$index",
            Self::Total => "$total",
        }
    }
}

/// Literal values, already parsed into their typed form
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    /// Empty collection literal `{}`
    Empty,
    /// Boolean literal
    Boolean(bool),
    /// Integer literal
    Integer(i32),
    /// Long literal (`123L`)
    Long(i64),
    /// Decimal literal
    Decimal(Decimal),
    /// String literal with escapes resolved
    String(String),
    /// Date literal
    Date(PrecisionDate),
    /// DateTime literal
    DateTime(PrecisionDateTime),
    /// Time literal
    Time(PrecisionTime),
    /// Quantity literal
    Quantity(Quantity),
}

impl LiteralValue {
    /// The collection this literal evaluates to
    pub fn to_collection(&self) -> Collection {
        let value = match self {
            Self::Empty => return Collection::empty(),
            Self::Boolean(b) => FhirPathValue::Boolean(*b),
            Self::Integer(i) => FhirPathValue::Integer(*i),
            Self::Long(l) => FhirPathValue::Long(*l),
            Self::Decimal(d) => FhirPathValue::Decimal(*d),
            Self::String(s) => FhirPathValue::String(s.clone()),
            Self::Date(d) => FhirPathValue::Date(*d),
            Self::DateTime(dt) => FhirPathValue::DateTime(*dt),
            Self::Time(t) => FhirPathValue::Time(*t),
            Self::Quantity(q) => FhirPathValue::Quantity(q.clone()),
        };
        Collection::singleton(value)
    }
}

impl ExpressionNode {
    /// Create a literal expression
    pub fn literal(value: LiteralValue) -> Self {
        Self::Literal(value)
    }

    /// Create an identifier expression
    pub fn identifier(name: impl Into<String>) -> Self {
        Self::Identifier(name.into())
    }

    /// Create a member invocation
    pub fn invocation(base: ExpressionNode, member: ExpressionNode) -> Self {
        Self::Invocation {
            base: Box::new(base),
            member: Box::new(member),
        }
    }

    /// Create an index expression
    pub fn indexer(base: ExpressionNode, index: ExpressionNode) -> Self {
        Self::Indexer {
            base: Box::new(base),
            index: Box::new(index),
        }
    }

    /// Create a function call expression
    pub fn function_call(name: impl Into<String>, args: Vec<ExpressionNode>) -> Self {
        Self::FunctionCall(Box::new(FunctionCallData {
            name: name.into(),
            args: SmallVec::from_vec(args),
        }))
    }

    /// Create a binary operation expression
    pub fn binary_op(op: BinaryOperator, left: ExpressionNode, right: ExpressionNode) -> Self {
        Self::BinaryOp(Box::new(BinaryOpData { op, left, right }))
    }

    /// Create a unary operation expression
    pub fn unary_op(op: UnaryOperator, operand: ExpressionNode) -> Self {
        Self::UnaryOp {
            op,
            operand: Box::new(operand),
        }
    }

    /// Identifier name, if this is an identifier
    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            Self::Identifier(name) => Some(name),
            _ => None,
        }
    }

    /// Interpret the node as a type name (`Patient`, `System.String`).
    ///
    /// Function arguments such as `ofType(Quantity)` are parsed as ordinary
    /// expressions; this recovers the type they denote.
    pub fn as_type_specifier(&self) -> Option<TypeSpecifier> {
        match self {
            Self::TypeSpecifier(spec) => Some(spec.clone()),
            Self::Identifier(name) => Some(TypeSpecifier::new(None, name.clone())),
            Self::Invocation { base, member } => match (base.as_ref(), member.as_ref()) {
                (Self::Identifier(ns), Self::Identifier(name)) => {
                    Some(TypeSpecifier::new(Some(ns.clone()), name.clone()))
                }
                _ => None,
            },
            _ => None,
        }
    }

    /// Number of nodes in the tree
    pub fn node_count(&self) -> usize {
        1 + match self {
            Self::Literal(_)
            | Self::Identifier(_)
            | Self::TypeSpecifier(_)
            | Self::ExternalConstant(_)
            | Self::Variable(_) => 0,
            Self::Invocation { base, member } => base.node_count() + member.node_count(),
            Self::Indexer { base, index } => base.node_count() + index.node_count(),
            Self::UnaryOp { operand, .. } => operand.node_count(),
            Self::BinaryOp(data) => data.left.node_count() + data.right.node_count(),
            Self::FunctionCall(data) => data.args.iter().map(Self::node_count).sum(),
        }
    }
}

fn write_identifier(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    let plain = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        f.write_str(name)
    } else {
        write!(f, "`{name}`")
    }
}

fn write_string_literal(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("'")?;
    for c in s.chars() {
        match c {
            '\'' => f.write_str("\\'")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            other => write!(f, "{other}")?,
        }
    }
    f.write_str("'")
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("{}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Long(l) => write!(f, "{l}L"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::String(s) => write_string_literal(f, s),
            Self::Date(d) => write!(f, "@{d}"),
            Self::DateTime(dt) => write!(f, "@{dt}"),
            Self::Time(t) => write!(f, "@T{t}"),
            Self::Quantity(q) => write!(f, "{q}"),
        }
    }
}

/// Renders the expression back to FHIRPath text, fully parenthesised
impl fmt::Display for ExpressionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(lit) => write!(f, "{lit}"),
            Self::Identifier(name) => write_identifier(f, name),
            Self::Invocation { base, member } => write!(f, "{base}.{member}"),
            Self::Indexer { base, index } => write!(f, "{base}[{index}]"),
            Self::UnaryOp { op, operand } => write!(f, "{op}{operand}"),
            Self::BinaryOp(data) => write!(f, "({} {} {})", data.left, data.op, data.right),
            Self::FunctionCall(data) => {
                write_identifier(f, &data.name)?;
                f.write_str("(")?;
                for (i, arg) in data.args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Self::TypeSpecifier(spec) => write!(f, "{spec}"),
            Self::ExternalConstant(name) => {
                f.write_str("%")?;
                write_identifier(f, name)
            }
            Self::Variable(var) => f.write_str(var.as_str()),
        }
    }
}
