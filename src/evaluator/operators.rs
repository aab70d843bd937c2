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

//! Operator semantics
//!
//! Arithmetic goes through the overflow core and yields an empty collection
//! when the result is not representable. Comparison and equality propagate
//! empty operands; the logical operators follow the three-valued tables.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::cmp::Ordering;

use crate::ast::BinaryOperator;
use crate::core::overflow::{ArithmeticOp, CheckedInteger};
use crate::core::{EvaluationError, EvaluationResult};
use crate::model::temporal::compare_date_with_datetime;
use crate::model::{
    CalendarUnit, Collection, FhirPathValue, PrecisionDate, PrecisionDateTime, PrecisionTime,
    Quantity,
};

/// Evaluate a value-level binary operator on already evaluated operands.
///
/// Logical, union, membership and type operators are handled here too,
/// except for short-circuiting which the evaluator performs itself.
pub fn evaluate_binary(
    op: BinaryOperator,
    left: &Collection,
    right: &Collection,
) -> EvaluationResult<Collection> {
    match op {
        BinaryOperator::Add
        | BinaryOperator::Subtract
        | BinaryOperator::Multiply
        | BinaryOperator::Divide
        | BinaryOperator::IntegerDivide
        | BinaryOperator::Modulo => arithmetic(op, left, right),
        BinaryOperator::Concatenate => concatenate(left, right),
        BinaryOperator::Equal => Ok(boolean_result(equals(left, right))),
        BinaryOperator::NotEqual => Ok(boolean_result(equals(left, right).map(|b| !b))),
        BinaryOperator::Equivalent => Ok(Collection::singleton(equivalent(left, right))),
        BinaryOperator::NotEquivalent => Ok(Collection::singleton(!equivalent(left, right))),
        BinaryOperator::LessThan
        | BinaryOperator::LessThanOrEqual
        | BinaryOperator::GreaterThan
        | BinaryOperator::GreaterThanOrEqual => comparison(op, left, right),
        BinaryOperator::And
        | BinaryOperator::Or
        | BinaryOperator::Xor
        | BinaryOperator::Implies => {
            let l = to_boolean(left, op.as_str())?;
            let r = to_boolean(right, op.as_str())?;
            Ok(boolean_result(logical(op, l, r)))
        }
        BinaryOperator::Union => Ok(union(left, right)),
        BinaryOperator::In => membership(left, right, "in"),
        BinaryOperator::Contains => membership(right, left, "contains"),
        BinaryOperator::Is | BinaryOperator::As => Err(EvaluationError::type_mismatch(format!(
            "operator '{op}' requires a type specifier"
        ))),
    }
}

fn boolean_result(value: Option<bool>) -> Collection {
    match value {
        Some(b) => Collection::singleton(b),
        None => Collection::empty(),
    }
}

/// Three-valued truth tables; `None` is the empty collection
pub fn logical(op: BinaryOperator, left: Option<bool>, right: Option<bool>) -> Option<bool> {
    match op {
        BinaryOperator::And => match (left, right) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        },
        BinaryOperator::Or => match (left, right) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
        BinaryOperator::Xor => match (left, right) {
            (Some(l), Some(r)) => Some(l != r),
            _ => None,
        },
        BinaryOperator::Implies => match (left, right) {
            (Some(false), _) | (_, Some(true)) => Some(true),
            (Some(true), Some(false)) => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Boolean view of a collection for logical operators.
///
/// A single non-Boolean item counts as `true`.
pub fn to_boolean(collection: &Collection, context: &str) -> EvaluationResult<Option<bool>> {
    Ok(collection
        .singleton_value(context)?
        .map(|v| v.as_boolean().unwrap_or(true)))
}

fn operand<'a>(
    collection: &'a Collection,
    op: BinaryOperator,
) -> EvaluationResult<Option<&'a FhirPathValue>> {
    collection.singleton_value(&format!("operator '{op}'"))
}

fn mismatch(op: BinaryOperator, left: &FhirPathValue, right: &FhirPathValue) -> EvaluationError {
    EvaluationError::type_mismatch(format!(
        "operator '{op}' cannot be applied to {} and {}",
        left.type_name(),
        right.type_name()
    ))
}

fn arithmetic_op(op: BinaryOperator) -> Option<ArithmeticOp> {
    match op {
        BinaryOperator::Add => Some(ArithmeticOp::Add),
        BinaryOperator::Subtract => Some(ArithmeticOp::Sub),
        BinaryOperator::Multiply => Some(ArithmeticOp::Mul),
        BinaryOperator::IntegerDivide => Some(ArithmeticOp::Div),
        BinaryOperator::Modulo => Some(ArithmeticOp::Mod),
        _ => None,
    }
}

fn checked<T>(op: ArithmeticOp, left: T, right: T) -> Option<T>
where
    T: CheckedInteger,
{
    let (result, ok) = op.apply(left, right);
    ok.then_some(result)
}

fn integral_decimal(value: Decimal) -> Option<FhirPathValue> {
    let truncated = value.trunc();
    match truncated.to_i32() {
        Some(i) => Some(FhirPathValue::Integer(i)),
        None => truncated.to_i64().map(FhirPathValue::Long),
    }
}

fn decimal_arithmetic(op: BinaryOperator, l: Decimal, r: Decimal) -> Option<FhirPathValue> {
    match op {
        BinaryOperator::Add => l.checked_add(r).map(FhirPathValue::Decimal),
        BinaryOperator::Subtract => l.checked_sub(r).map(FhirPathValue::Decimal),
        BinaryOperator::Multiply => l.checked_mul(r).map(FhirPathValue::Decimal),
        BinaryOperator::Divide => l.checked_div(r).map(|d| FhirPathValue::Decimal(d.normalize())),
        BinaryOperator::IntegerDivide => l.checked_div(r).and_then(integral_decimal),
        BinaryOperator::Modulo => l.checked_rem(r).map(FhirPathValue::Decimal),
        _ => None,
    }
}

fn temporal_amount(quantity: &Quantity) -> Option<(i64, CalendarUnit)> {
    let unit = quantity.calendar_unit()?;
    if unit == CalendarUnit::Second && !quantity.value.fract().is_zero() {
        let millis = quantity.value.checked_mul(Decimal::from(1000))?.trunc();
        return Some((millis.to_i64()?, CalendarUnit::Millisecond));
    }
    Some((quantity.value.trunc().to_i64()?, unit))
}

fn temporal_arithmetic(
    op: BinaryOperator,
    value: &FhirPathValue,
    quantity: &Quantity,
) -> Option<FhirPathValue> {
    let (amount, unit) = temporal_amount(quantity)?;
    let amount = match op {
        BinaryOperator::Add => amount,
        BinaryOperator::Subtract => amount.checked_neg()?,
        _ => return None,
    };
    match value {
        FhirPathValue::Date(d) => d.add_duration(amount, unit).map(FhirPathValue::Date),
        FhirPathValue::DateTime(dt) => dt.add_duration(amount, unit).map(FhirPathValue::DateTime),
        FhirPathValue::Time(t) => t.add_duration(amount, unit).map(FhirPathValue::Time),
        _ => None,
    }
}

/// `+ - * / div mod`
fn arithmetic(
    op: BinaryOperator,
    left: &Collection,
    right: &Collection,
) -> EvaluationResult<Collection> {
    let (Some(l), Some(r)) = (operand(left, op)?, operand(right, op)?) else {
        return Ok(Collection::empty());
    };
    use FhirPathValue as V;

    let result = match (l, r) {
        (V::Integer(a), V::Integer(b)) if op != BinaryOperator::Divide => {
            arithmetic_op(op).and_then(|o| checked(o, *a, *b)).map(V::Integer)
        }
        (V::Integer(_) | V::Long(_), V::Integer(_) | V::Long(_))
            if op != BinaryOperator::Divide =>
        {
            let (a, b) = (l.as_integer(), r.as_integer());
            match (arithmetic_op(op), a, b) {
                (Some(o), Some(a), Some(b)) => checked(o, a, b).map(V::Long),
                _ => None,
            }
        }
        (V::Integer(_) | V::Long(_) | V::Decimal(_), V::Integer(_) | V::Long(_) | V::Decimal(_)) => {
            match (l.as_decimal(), r.as_decimal()) {
                (Some(a), Some(b)) => decimal_arithmetic(op, a, b),
                _ => None,
            }
        }
        (V::String(a), V::String(b)) if op == BinaryOperator::Add => {
            Some(V::String(format!("{a}{b}")))
        }
        (V::Date(_) | V::DateTime(_) | V::Time(_), V::Quantity(q)) => {
            if !matches!(op, BinaryOperator::Add | BinaryOperator::Subtract) {
                return Err(mismatch(op, l, r));
            }
            temporal_arithmetic(op, l, q)
        }
        _ => match (l.as_quantity(), r.as_quantity(), l.as_decimal(), r.as_decimal()) {
            (Some(a), Some(b), _, _) => match op {
                BinaryOperator::Add => a.add(&b).map(V::Quantity),
                BinaryOperator::Subtract => a.sub(&b).map(V::Quantity),
                BinaryOperator::Multiply => a.mul(&b).map(V::Quantity),
                BinaryOperator::Divide => a.div(&b).map(V::Quantity),
                _ => return Err(mismatch(op, l, r)),
            },
            (Some(q), None, _, Some(n)) => match op {
                BinaryOperator::Multiply => q.scale(n).map(V::Quantity),
                BinaryOperator::Divide if !n.is_zero() => q
                    .value
                    .checked_div(n)
                    .map(|v| V::Quantity(Quantity::new(v, q.unit.clone()))),
                BinaryOperator::Divide => None,
                _ => return Err(mismatch(op, l, r)),
            },
            (None, Some(q), Some(n), _) if op == BinaryOperator::Multiply => {
                q.scale(n).map(V::Quantity)
            }
            _ => return Err(mismatch(op, l, r)),
        },
    };
    Ok(result.map(Collection::singleton).unwrap_or_default())
}

/// `&` treats an empty operand as the empty string
fn concatenate(left: &Collection, right: &Collection) -> EvaluationResult<Collection> {
    let op = BinaryOperator::Concatenate;
    let text = |value: Option<&FhirPathValue>| -> EvaluationResult<String> {
        match value {
            None => Ok(String::new()),
            Some(FhirPathValue::String(s)) => Ok(s.clone()),
            Some(other) => Err(EvaluationError::type_mismatch(format!(
                "operator '&' expects strings, got {}",
                other.type_name()
            ))),
        }
    };
    let l = text(operand(left, op)?)?;
    let r = text(operand(right, op)?)?;
    Ok(Collection::singleton(l + &r))
}

/// String operand reinterpreted as the temporal type of `like`
fn coerce_temporal(text: &str, like: &FhirPathValue) -> Option<FhirPathValue> {
    match like {
        FhirPathValue::Time(_) => PrecisionTime::parse(text).map(FhirPathValue::Time),
        FhirPathValue::Date(_) | FhirPathValue::DateTime(_) => {
            if text.contains('T') {
                PrecisionDateTime::parse(text).map(FhirPathValue::DateTime)
            } else {
                PrecisionDate::parse(text).map(FhirPathValue::Date)
            }
        }
        _ => None,
    }
}

/// Ordering of two values.
///
/// `Ok(None)` means the comparison is uncertain (partial precision or
/// incomparable units); `Err` means the types cannot be ordered at all.
pub fn compare_values(
    left: &FhirPathValue,
    right: &FhirPathValue,
) -> Result<Option<Ordering>, ()> {
    use FhirPathValue as V;
    Ok(match (left, right) {
        (V::Integer(_) | V::Long(_) | V::Decimal(_), V::Integer(_) | V::Long(_) | V::Decimal(_)) => {
            match (left.as_decimal(), right.as_decimal()) {
                (Some(a), Some(b)) => Some(a.cmp(&b)),
                _ => return Err(()),
            }
        }
        (V::String(a), V::String(b)) => Some(a.cmp(b)),
        (V::Date(a), V::Date(b)) => a.partial_compare(b),
        (V::DateTime(a), V::DateTime(b)) => a.partial_compare(b),
        (V::Time(a), V::Time(b)) => a.partial_compare(b),
        (V::Date(a), V::DateTime(b)) => compare_date_with_datetime(a, b),
        (V::DateTime(a), V::Date(b)) => compare_date_with_datetime(b, a).map(Ordering::reverse),
        (V::String(s), V::Date(_) | V::DateTime(_) | V::Time(_)) => {
            let coerced = coerce_temporal(s, right).ok_or(())?;
            return compare_values(&coerced, right);
        }
        (V::Date(_) | V::DateTime(_) | V::Time(_), V::String(s)) => {
            let coerced = coerce_temporal(s, left).ok_or(())?;
            return compare_values(left, &coerced);
        }
        _ => match (left.as_quantity(), right.as_quantity()) {
            (Some(a), Some(b)) => a.partial_compare(&b),
            _ => return Err(()),
        },
    })
}

fn comparison(
    op: BinaryOperator,
    left: &Collection,
    right: &Collection,
) -> EvaluationResult<Collection> {
    let (Some(l), Some(r)) = (operand(left, op)?, operand(right, op)?) else {
        return Ok(Collection::empty());
    };
    let ordering = compare_values(l, r).map_err(|_| mismatch(op, l, r))?;
    let result = ordering.map(|ord| match op {
        BinaryOperator::LessThan => ord == Ordering::Less,
        BinaryOperator::LessThanOrEqual => ord != Ordering::Greater,
        BinaryOperator::GreaterThan => ord == Ordering::Greater,
        _ => ord != Ordering::Less,
    });
    Ok(boolean_result(result))
}

/// Item equality; `None` when the answer is unknown
pub fn value_equals(left: &FhirPathValue, right: &FhirPathValue) -> Option<bool> {
    use FhirPathValue as V;
    match (left, right) {
        (V::Boolean(a), V::Boolean(b)) => Some(a == b),
        (V::Element(a), V::Element(b)) => Some(a == b),
        (V::Quantity(_) | V::Element(_), V::Quantity(_) | V::Element(_)) => {
            match (left.as_quantity(), right.as_quantity()) {
                (Some(a), Some(b)) => a.equals(&b),
                _ => Some(false),
            }
        }
        _ => match compare_values(left, right) {
            Ok(Some(ordering)) => Some(ordering == Ordering::Equal),
            Ok(None) => None,
            Err(()) => Some(false),
        },
    }
}

/// Collection equality (`=`)
pub fn equals(left: &Collection, right: &Collection) -> Option<bool> {
    if left.is_empty() || right.is_empty() {
        return None;
    }
    if left.len() != right.len() {
        return Some(false);
    }
    let mut uncertain = false;
    for (l, r) in left.iter().zip(right.iter()) {
        match value_equals(l, r) {
            Some(false) => return Some(false),
            None => uncertain = true,
            Some(true) => {}
        }
    }
    if uncertain { None } else { Some(true) }
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Item equivalence (`~`)
pub fn value_equivalent(left: &FhirPathValue, right: &FhirPathValue) -> bool {
    use FhirPathValue as V;
    match (left, right) {
        (V::String(a), V::String(b)) => normalize_whitespace(a) == normalize_whitespace(b),
        (V::Decimal(_), V::Integer(_) | V::Long(_) | V::Decimal(_))
        | (V::Integer(_) | V::Long(_), V::Decimal(_)) => {
            match (left.as_decimal(), right.as_decimal()) {
                (Some(a), Some(b)) => {
                    let scale = a.scale().min(b.scale());
                    a.round_dp(scale) == b.round_dp(scale)
                }
                _ => false,
            }
        }
        (V::Quantity(a), V::Quantity(b)) => a.equivalent(b),
        _ => value_equals(left, right).unwrap_or(false),
    }
}

/// Collection equivalence (`~`), order-independent
pub fn equivalent(left: &Collection, right: &Collection) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let mut used = vec![false; right.len()];
    'outer: for l in left.iter() {
        for (i, r) in right.iter().enumerate() {
            if !used[i] && value_equivalent(l, r) {
                used[i] = true;
                continue 'outer;
            }
        }
        return false;
    }
    true
}

/// Whether `collection` holds an item equal to `value`
pub fn contains_value(collection: &Collection, value: &FhirPathValue) -> bool {
    collection
        .iter()
        .any(|item| value_equals(item, value) == Some(true))
}

/// Items with duplicates removed, first occurrence wins
pub fn distinct(collection: &Collection) -> Collection {
    let mut out = Collection::new();
    for item in collection.iter() {
        if !contains_value(&out, item) {
            out.push(item.clone());
        }
    }
    out
}

/// Union (`|`): concatenation with duplicates removed
pub fn union(left: &Collection, right: &Collection) -> Collection {
    let mut combined = left.clone();
    combined.extend(right.iter().cloned());
    distinct(&combined)
}

/// `in` / `contains`: `item` must be a singleton
fn membership(item: &Collection, collection: &Collection, op: &str) -> EvaluationResult<Collection> {
    let Some(value) = item.singleton_value(&format!("operator '{op}'"))? else {
        return Ok(Collection::empty());
    };
    Ok(Collection::singleton(contains_value(collection, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(v: impl Into<FhirPathValue>) -> Collection {
        Collection::singleton(v)
    }

    #[test]
    fn test_integer_overflow_is_empty() {
        let result = evaluate_binary(BinaryOperator::Add, &one(i32::MAX), &one(1)).unwrap();
        assert!(result.is_empty());
        let result = evaluate_binary(BinaryOperator::Add, &one(i32::MAX), &one(1i64)).unwrap();
        assert_eq!(result, one(i32::MAX as i64 + 1));
    }

    #[test]
    fn test_division_yields_decimal() {
        let result = evaluate_binary(BinaryOperator::Divide, &one(7), &one(2)).unwrap();
        assert_eq!(result, one(Decimal::new(35, 1)));
        let result = evaluate_binary(BinaryOperator::Divide, &one(7), &one(0)).unwrap();
        assert!(result.is_empty());
        let result = evaluate_binary(BinaryOperator::IntegerDivide, &one(7), &one(2)).unwrap();
        assert_eq!(result, one(3));
    }

    #[test]
    fn test_empty_propagation() {
        let empty = Collection::empty();
        for op in [
            BinaryOperator::Add,
            BinaryOperator::Multiply,
            BinaryOperator::Equal,
            BinaryOperator::LessThan,
        ] {
            assert!(evaluate_binary(op, &empty, &one(1)).unwrap().is_empty());
            assert!(evaluate_binary(op, &one(1), &empty).unwrap().is_empty());
        }
    }

    #[test]
    fn test_three_valued_logic() {
        use BinaryOperator::*;
        assert_eq!(logical(And, Some(false), None), Some(false));
        assert_eq!(logical(And, Some(true), None), None);
        assert_eq!(logical(Or, Some(true), None), Some(true));
        assert_eq!(logical(Or, None, Some(false)), None);
        assert_eq!(logical(Implies, Some(false), None), Some(true));
        assert_eq!(logical(Implies, None, Some(true)), Some(true));
        assert_eq!(logical(Xor, Some(true), None), None);
    }

    #[test]
    fn test_mixed_numeric_equality() {
        assert_eq!(equals(&one(1), &one(Decimal::new(10, 1))), Some(true));
        assert!(equivalent(&one(Decimal::new(12, 1)), &one(Decimal::new(124, 2))));
    }

    #[test]
    fn test_string_equivalence_ignores_case_and_whitespace() {
        assert!(equivalent(&one("Hello  World"), &one("hello world")));
        assert_eq!(equals(&one("Hello"), &one("hello")), Some(false));
    }

    #[test]
    fn test_type_mismatch() {
        let err = evaluate_binary(BinaryOperator::Add, &one("a"), &one(1)).unwrap_err();
        assert_eq!(err.kind, crate::core::EvalErrorKind::TypeMismatch);
    }

    #[test]
    fn test_union_removes_duplicates() {
        let left = Collection::from_vec(vec![1.into(), 2.into()]);
        let right = Collection::from_vec(vec![2.into(), 3.into()]);
        assert_eq!(
            union(&left, &right),
            Collection::from_vec(vec![1.into(), 2.into(), 3.into()])
        );
    }
}
