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

//! Overflow-checked integer arithmetic
//!
//! Every operation returns `(result, ok)`. When `ok` is false the result is
//! not meaningful and the evaluator turns the enclosing expression into an
//! empty collection. None of these functions panic for any input.

use num_traits::{PrimInt, Signed, WrappingAdd, WrappingMul, WrappingSub};

/// Signed integer widths supported by the overflow core
pub trait CheckedInteger: PrimInt + Signed + WrappingAdd + WrappingSub + WrappingMul {}

impl CheckedInteger for i32 {}
impl CheckedInteger for i64 {}

/// Arithmetic operations covered by the overflow core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithmeticOp {
    /// Addition
    Add,
    /// Subtraction
    Sub,
    /// Multiplication
    Mul,
    /// Truncating integer division
    Div,
    /// Remainder with the sign of the dividend
    Mod,
}

impl ArithmeticOp {
    /// Apply the operation with overflow detection
    pub fn apply<T: CheckedInteger>(self, left: T, right: T) -> (T, bool) {
        match self {
            ArithmeticOp::Add => add(left, right),
            ArithmeticOp::Sub => sub(left, right),
            ArithmeticOp::Mul => mul(left, right),
            ArithmeticOp::Div => div(left, right),
            ArithmeticOp::Mod => modulo(left, right),
        }
    }
}

#[inline]
fn negative<T: CheckedInteger>(value: T) -> bool {
    value < T::zero()
}

/// Addition; overflow when both operands share a sign the result does not
#[inline]
pub fn add<T: CheckedInteger>(left: T, right: T) -> (T, bool) {
    let result = left.wrapping_add(&right);
    let ok = negative(left) != negative(right) || negative(result) == negative(left);
    (result, ok)
}

/// Subtraction; overflow only possible when the operand signs differ
#[inline]
pub fn sub<T: CheckedInteger>(left: T, right: T) -> (T, bool) {
    let result = left.wrapping_sub(&right);
    let ok = negative(left) == negative(right) || negative(result) == negative(left);
    (result, ok)
}

/// Multiplication; zero operands short-circuit to `(0, true)`
#[inline]
pub fn mul<T: CheckedInteger>(left: T, right: T) -> (T, bool) {
    if left.is_zero() || right.is_zero() {
        return (T::zero(), true);
    }
    let result = left.wrapping_mul(&right);
    // checked_div keeps MIN / -1 from trapping
    let divides_back = result.checked_div(&right) == Some(left);
    let sign_ok = negative(result) == (negative(left) != negative(right));
    (result, divides_back && sign_ok)
}

/// Truncating division; zero divisor and `MIN / -1` fail
#[inline]
pub fn div<T: CheckedInteger>(left: T, right: T) -> (T, bool) {
    if right.is_zero() {
        return (T::zero(), false);
    }
    if left == T::min_value() && right == -T::one() {
        return (T::min_value(), false);
    }
    (left / right, true)
}

/// Remainder; zero divisor and `MIN mod -1` fail
#[inline]
pub fn modulo<T: CheckedInteger>(left: T, right: T) -> (T, bool) {
    if right.is_zero() {
        return (T::zero(), false);
    }
    if left == T::min_value() && right == -T::one() {
        return (T::zero(), false);
    }
    (left % right, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPS: [ArithmeticOp; 5] = [
        ArithmeticOp::Add,
        ArithmeticOp::Sub,
        ArithmeticOp::Mul,
        ArithmeticOp::Div,
        ArithmeticOp::Mod,
    ];

    fn reference(op: ArithmeticOp, left: i128, right: i128) -> Option<i128> {
        match op {
            ArithmeticOp::Add => Some(left + right),
            ArithmeticOp::Sub => Some(left - right),
            ArithmeticOp::Mul => Some(left * right),
            ArithmeticOp::Div => (right != 0).then(|| left / right),
            ArithmeticOp::Mod => (right != 0).then(|| left % right),
        }
    }

    fn boundary_values_i32() -> Vec<i32> {
        let mut values = vec![
            i32::MIN,
            i32::MIN + 1,
            i32::MIN / 2,
            -65_536,
            -46_341,
            -46_340,
            -2,
            -1,
            0,
            1,
            2,
            46_340,
            46_341,
            65_536,
            i32::MAX / 2,
            i32::MAX - 1,
            i32::MAX,
        ];
        values.extend([-7, 7, 3, -3]);
        values
    }

    fn boundary_values_i64() -> Vec<i64> {
        vec![
            i64::MIN,
            i64::MIN + 1,
            i64::MIN / 2,
            -3_037_000_500,
            -3_037_000_499,
            -4_294_967_296,
            -1,
            0,
            1,
            2,
            -2,
            3_037_000_499,
            3_037_000_500,
            4_294_967_296,
            i64::MAX / 2,
            i64::MAX - 1,
            i64::MAX,
        ]
    }

    #[test]
    fn test_i32_grid_matches_wide_reference() {
        let values = boundary_values_i32();
        for op in OPS {
            for &left in &values {
                for &right in &values {
                    let (result, ok) = op.apply(left, right);
                    let exact = reference(op, left as i128, right as i128);
                    let representable = exact
                        .filter(|v| *v >= i32::MIN as i128 && *v <= i32::MAX as i128);
                    assert_eq!(
                        ok,
                        representable.is_some(),
                        "{op:?}({left}, {right}) ok flag"
                    );
                    if let Some(expected) = representable {
                        assert_eq!(result as i128, expected, "{op:?}({left}, {right})");
                    }
                }
            }
        }
    }

    #[test]
    fn test_i64_grid_matches_wide_reference() {
        let values = boundary_values_i64();
        for op in OPS {
            for &left in &values {
                for &right in &values {
                    let (result, ok) = op.apply(left, right);
                    let exact = reference(op, left as i128, right as i128);
                    let representable = exact
                        .filter(|v| *v >= i64::MIN as i128 && *v <= i64::MAX as i128);
                    assert_eq!(
                        ok,
                        representable.is_some(),
                        "{op:?}({left}, {right}) ok flag"
                    );
                    if let Some(expected) = representable {
                        assert_eq!(result as i128, expected, "{op:?}({left}, {right})");
                    }
                }
            }
        }
    }

    #[test]
    fn test_documented_boundaries() {
        assert_eq!(add(i32::MAX, 1), (i32::MIN, false));
        assert_eq!(sub(i32::MIN, 1), (i32::MAX, false));
        assert_eq!(div(i32::MIN, -1), (i32::MIN, false));
        assert_eq!(modulo(i32::MIN, -1), (0, false));
        assert_eq!(div(5i64, 0), (0, false));
        assert_eq!(modulo(5i64, 0), (0, false));
        assert_eq!(mul(0i32, i32::MIN), (0, true));
        assert_eq!(mul(i64::MIN, -1).1, false);
        assert_eq!(mul(-1i32, i32::MIN).1, false);
    }

    #[test]
    fn test_remainder_takes_dividend_sign() {
        assert_eq!(modulo(-7i32, 3), (-1, true));
        assert_eq!(modulo(7i32, -3), (1, true));
        assert_eq!(div(-7i64, 2), (-3, true));
    }
}
