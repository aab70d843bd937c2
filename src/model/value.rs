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

//! Value types for FHIRPath expressions

use rust_decimal::Decimal;
use std::fmt;

use super::provider::Element;
use super::quantity::Quantity;
use super::temporal::{PrecisionDate, PrecisionDateTime, PrecisionTime};
use crate::core::{EvaluationError, EvaluationResult};

/// A single FHIRPath value
///
/// Values never travel alone: every expression result is a [`Collection`].
#[derive(Debug, Clone, PartialEq)]
pub enum FhirPathValue {
    /// Boolean value
    Boolean(bool),
    /// 32-bit integer value
    Integer(i32),
    /// 64-bit integer value
    Long(i64),
    /// Arbitrary-precision decimal value
    Decimal(Decimal),
    /// String value
    String(String),
    /// Date value with precision
    Date(PrecisionDate),
    /// DateTime value with precision and optional timezone
    DateTime(PrecisionDateTime),
    /// Time value with precision
    Time(PrecisionTime),
    /// Quantity value with unit
    Quantity(Quantity),
    /// Node of the input resource tree
    Element(Element),
}

impl FhirPathValue {
    /// Create a string value
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    /// Name of the value's type (`Integer`, `Patient`, ...)
    pub fn type_name(&self) -> &str {
        match self {
            Self::Boolean(_) => "Boolean",
            Self::Integer(_) => "Integer",
            Self::Long(_) => "Long",
            Self::Decimal(_) => "Decimal",
            Self::String(_) => "String",
            Self::Date(_) => "Date",
            Self::DateTime(_) => "DateTime",
            Self::Time(_) => "Time",
            Self::Quantity(_) => "Quantity",
            Self::Element(e) => e.type_name().unwrap_or("Element"),
        }
    }

    /// Namespace of the value's type
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Element(_) => "FHIR",
            _ => "System",
        }
    }

    /// Boolean content, if this is a Boolean
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// String content, if this is a String
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer content widened to i64, for Integer and Long
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i as i64),
            Self::Long(l) => Some(*l),
            _ => None,
        }
    }

    /// Numeric content as a decimal, for Integer, Long and Decimal
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Integer(i) => Some(Decimal::from(*i)),
            Self::Long(l) => Some(Decimal::from(*l)),
            Self::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// Quantity view: quantities, and FHIR `Quantity` elements
    pub fn as_quantity(&self) -> Option<Quantity> {
        match self {
            Self::Quantity(q) => Some(q.clone()),
            Self::Element(e) => {
                let (value, unit) = e.quantity_parts()?;
                Some(Quantity::new(value.as_decimal()?, unit.unwrap_or_default()))
            }
            _ => None,
        }
    }

    /// Whether this is a primitive (non-element) value
    pub fn is_primitive(&self) -> bool {
        !matches!(self, Self::Element(_))
    }

    /// JSON rendering used by the command line front end
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Self::Boolean(b) => Value::Bool(*b),
            Self::Integer(i) => Value::from(*i),
            Self::Long(l) => Value::from(*l),
            Self::Decimal(d) => d
                .to_string()
                .parse::<serde_json::Number>()
                .map(Value::Number)
                .unwrap_or_else(|_| Value::String(d.to_string())),
            Self::String(s) => Value::String(s.clone()),
            Self::Date(_) | Self::DateTime(_) | Self::Time(_) | Self::Quantity(_) => {
                Value::String(self.to_string())
            }
            Self::Element(e) => e.to_json(),
        }
    }
}

impl fmt::Display for FhirPathValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Long(l) => write!(f, "{l}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::String(s) => f.write_str(s),
            Self::Date(d) => write!(f, "{d}"),
            Self::DateTime(dt) => write!(f, "{dt}"),
            Self::Time(t) => write!(f, "{t}"),
            Self::Quantity(q) => write!(f, "{q}"),
            Self::Element(e) => write!(f, "{}", e.to_json()),
        }
    }
}

impl From<bool> for FhirPathValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i32> for FhirPathValue {
    fn from(value: i32) -> Self {
        Self::Integer(value)
    }
}

impl From<i64> for FhirPathValue {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<Decimal> for FhirPathValue {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<&str> for FhirPathValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FhirPathValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Quantity> for FhirPathValue {
    fn from(value: Quantity) -> Self {
        Self::Quantity(value)
    }
}

impl From<Element> for FhirPathValue {
    fn from(value: Element) -> Self {
        Self::Element(value)
    }
}

/// Ordered collection of values, the result of every FHIRPath expression
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Collection(Vec<FhirPathValue>);

impl Collection {
    /// Create an empty collection
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Alias for [`Collection::new`]
    pub fn empty() -> Self {
        Self::new()
    }

    /// Collection holding exactly one value
    pub fn singleton(value: impl Into<FhirPathValue>) -> Self {
        Self(vec![value.into()])
    }

    /// Create from a vector of values
    pub fn from_vec(values: Vec<FhirPathValue>) -> Self {
        Self(values)
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the collection is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over items
    pub fn iter(&self) -> std::slice::Iter<'_, FhirPathValue> {
        self.0.iter()
    }

    /// Append an item
    pub fn push(&mut self, value: FhirPathValue) {
        self.0.push(value);
    }

    /// Append all items of another collection
    pub fn extend(&mut self, other: impl IntoIterator<Item = FhirPathValue>) {
        self.0.extend(other);
    }

    /// First item
    pub fn first(&self) -> Option<&FhirPathValue> {
        self.0.first()
    }

    /// Last item
    pub fn last(&self) -> Option<&FhirPathValue> {
        self.0.last()
    }

    /// Item at `index`
    pub fn get(&self, index: usize) -> Option<&FhirPathValue> {
        self.0.get(index)
    }

    /// Items as a slice
    pub fn as_slice(&self) -> &[FhirPathValue] {
        &self.0
    }

    /// Consume into the underlying vector
    pub fn into_vec(self) -> Vec<FhirPathValue> {
        self.0
    }

    /// The single item of a singleton, `None` for empty.
    ///
    /// More than one item is a fatal [`EvaluationError`] naming `context`.
    pub fn singleton_value(&self, context: &str) -> EvaluationResult<Option<&FhirPathValue>> {
        match self.0.len() {
            0 => Ok(None),
            1 => Ok(self.0.first()),
            n => Err(EvaluationError::non_singleton(context, n)),
        }
    }

    /// JSON array rendering
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.0.iter().map(FhirPathValue::to_json).collect())
    }
}

impl From<Vec<FhirPathValue>> for Collection {
    fn from(values: Vec<FhirPathValue>) -> Self {
        Self(values)
    }
}

impl From<FhirPathValue> for Collection {
    fn from(value: FhirPathValue) -> Self {
        Self(vec![value])
    }
}

impl FromIterator<FhirPathValue> for Collection {
    fn from_iter<I: IntoIterator<Item = FhirPathValue>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Collection {
    type Item = FhirPathValue;
    type IntoIter = std::vec::IntoIter<FhirPathValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a FhirPathValue;
    type IntoIter = std::slice::Iter<'a, FhirPathValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, item) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{item}")?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singleton_value() {
        let empty = Collection::empty();
        assert_eq!(empty.singleton_value("test").unwrap(), None);

        let one = Collection::singleton(3);
        assert_eq!(
            one.singleton_value("test").unwrap(),
            Some(&FhirPathValue::Integer(3))
        );

        let two = Collection::from_vec(vec![1.into(), 2.into()]);
        let err = two.singleton_value("operator '+'").unwrap_err();
        assert_eq!(err.kind, crate::core::EvalErrorKind::NonSingleton);
    }

    #[test]
    fn test_decimal_display_and_json() {
        let d: Decimal = "1.50".parse().unwrap();
        let v = FhirPathValue::Decimal(d);
        assert_eq!(v.to_string(), "1.50");
        assert_eq!(v.to_json().to_string(), "1.50");
    }

    #[test]
    fn test_decimal_json_keeps_every_digit() {
        let third = Decimal::ONE / Decimal::from(3);
        let json = Collection::singleton(third).to_json();
        assert_eq!(json.to_string(), "[0.3333333333333333333333333333]");
    }
}
