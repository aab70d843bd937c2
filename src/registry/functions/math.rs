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

//! Math functions
//!
//! Results that are not representable (overflow, NaN, infinity) yield empty.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use super::conversion::exact_integer;
use crate::core::EvaluationResult;
use crate::evaluator::FunctionContext;
use crate::model::{Collection, FhirPathValue, Quantity};
use crate::registry::function::{FunctionKind, FunctionRegistry, FunctionResult};
use crate::registry::signature::{FunctionSignature, ParameterInfo, ParameterKind};

fn numeric_input<'a>(ctx: &FunctionContext<'a, '_>) -> EvaluationResult<Option<&'a FhirPathValue>> {
    match ctx.input_singleton()? {
        Some(value @ (FhirPathValue::Integer(_) | FhirPathValue::Long(_) | FhirPathValue::Decimal(_))) => {
            Ok(Some(value))
        }
        Some(other) => Err(ctx.input_mismatch("a number", other)),
        None => Ok(None),
    }
}

fn from_f64(value: f64) -> Option<FhirPathValue> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_f64(value).map(|d| FhirPathValue::Decimal(d.normalize()))
}

fn to_f64(value: &FhirPathValue) -> Option<f64> {
    value.as_decimal().and_then(|d| d.to_f64())
}

fn single(value: Option<FhirPathValue>) -> FunctionResult {
    Ok(value.map(Collection::singleton).unwrap_or_default())
}

/// Register a unary numeric function
fn register_unary(
    registry: &mut FunctionRegistry,
    name: &'static str,
    doc: &'static str,
    op: fn(&FhirPathValue) -> Option<FhirPathValue>,
) {
    registry.register_closure(
        FunctionSignature::nullary(name),
        FunctionKind::CollectionWise,
        doc,
        move |ctx| single(numeric_input(ctx)?.and_then(op)),
    );
}

fn integral(value: &FhirPathValue, round: fn(Decimal) -> Decimal) -> Option<FhirPathValue> {
    match value {
        FhirPathValue::Integer(_) | FhirPathValue::Long(_) => Some(value.clone()),
        FhirPathValue::Decimal(d) => exact_integer(round(*d)),
        _ => None,
    }
}

fn power(base: &FhirPathValue, exponent: &FhirPathValue) -> Option<FhirPathValue> {
    match (base, exponent) {
        (FhirPathValue::Integer(b), FhirPathValue::Integer(e)) if *e >= 0 => {
            b.checked_pow(u32::try_from(*e).ok()?).map(FhirPathValue::Integer)
        }
        (FhirPathValue::Integer(_) | FhirPathValue::Long(_), FhirPathValue::Integer(_) | FhirPathValue::Long(_))
            if exponent.as_integer()? >= 0 =>
        {
            let e = u32::try_from(exponent.as_integer()?).ok()?;
            base.as_integer()?.checked_pow(e).map(FhirPathValue::Long)
        }
        _ => from_f64(to_f64(base)?.powf(to_f64(exponent)?)),
    }
}

/// Register math functions
pub fn register(registry: &mut FunctionRegistry) {
    registry.register_closure(
        FunctionSignature::nullary("abs"),
        FunctionKind::CollectionWise,
        "Returns the absolute value of the input. For quantities the unit is unchanged.",
        |ctx| {
            let result = match ctx.input_singleton()? {
                None => None,
                Some(FhirPathValue::Integer(i)) => i.checked_abs().map(FhirPathValue::Integer),
                Some(FhirPathValue::Long(l)) => l.checked_abs().map(FhirPathValue::Long),
                Some(FhirPathValue::Decimal(d)) => Some(FhirPathValue::Decimal(d.abs())),
                Some(FhirPathValue::Quantity(q)) => Some(FhirPathValue::Quantity(Quantity::new(
                    q.value.abs(),
                    q.unit.clone(),
                ))),
                Some(other) => return Err(ctx.input_mismatch("a number or Quantity", other)),
            };
            single(result)
        },
    );

    register_unary(
        registry,
        "ceiling",
        "Returns the first integer greater than or equal to the input.",
        |v| integral(v, |d| d.ceil()),
    );
    register_unary(
        registry,
        "floor",
        "Returns the first integer less than or equal to the input.",
        |v| integral(v, |d| d.floor()),
    );
    register_unary(
        registry,
        "truncate",
        "Returns the integer portion of the input.",
        |v| integral(v, |d| d.trunc()),
    );
    register_unary(
        registry,
        "exp",
        "Returns e raised to the power of the input.",
        |v| from_f64(to_f64(v)?.exp()),
    );
    register_unary(
        registry,
        "ln",
        "Returns the natural logarithm of the input.",
        |v| from_f64(to_f64(v)?.ln()),
    );
    register_unary(
        registry,
        "sqrt",
        "Returns the square root of the input; empty for negative numbers.",
        |v| from_f64(to_f64(v)?.sqrt()),
    );

    registry.register_closure(
        FunctionSignature::new("log", vec![ParameterInfo::value("base")]),
        FunctionKind::CollectionWise,
        "Returns the logarithm base base of the input number.",
        |ctx| {
            let Some(value) = numeric_input(ctx)? else {
                return Ok(Collection::empty());
            };
            let Some(base) = ctx.arg_singleton(0)? else {
                return Ok(Collection::empty());
            };
            let base = to_f64(base).ok_or_else(|| ctx.argument_mismatch(0, "a number", base))?;
            if base <= 0.0 || base == 1.0 {
                return Ok(Collection::empty());
            }
            single(to_f64(value).and_then(|v| from_f64(v.log(base))))
        },
    );
    registry.register_closure(
        FunctionSignature::new("power", vec![ParameterInfo::value("exponent")]),
        FunctionKind::CollectionWise,
        "Raises the input to the power given by the exponent.",
        |ctx| {
            let Some(value) = numeric_input(ctx)? else {
                return Ok(Collection::empty());
            };
            let Some(exponent) = ctx.arg_singleton(0)? else {
                return Ok(Collection::empty());
            };
            if exponent.as_decimal().is_none() {
                return Err(ctx.argument_mismatch(0, "a number", exponent));
            }
            single(power(value, exponent))
        },
    );
    registry.register_closure(
        FunctionSignature::new(
            "round",
            vec![ParameterInfo::optional("precision", ParameterKind::Value)],
        ),
        FunctionKind::CollectionWise,
        "Rounds the input to the nearest value with the given number of decimal places (default 0), halves away from zero.",
        |ctx| {
            let Some(value) = numeric_input(ctx)? else {
                return Ok(Collection::empty());
            };
            let precision = ctx.integer_arg(0)?.unwrap_or(0);
            let Ok(precision) = u32::try_from(precision) else {
                return Err(ctx.argument_mismatch(0, "a non-negative Integer", &FhirPathValue::Long(precision)));
            };
            single(value.as_decimal().map(|d| {
                FhirPathValue::Decimal(
                    d.round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero),
                )
            }))
        },
    );
}

#[cfg(test)]
mod tests {
    use super::super::test_support::eval;
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("(-5).abs()", FhirPathValue::Integer(5))]
    #[case("1.5.ceiling()", FhirPathValue::Integer(2))]
    #[case("(-1.5).floor()", FhirPathValue::Integer(-2))]
    #[case("2.7.truncate()", FhirPathValue::Integer(2))]
    #[case("2.power(10)", FhirPathValue::Integer(1024))]
    #[case("2.5.round()", FhirPathValue::Decimal(Decimal::from(3)))]
    #[case("3.14159.round(2)", FhirPathValue::Decimal(Decimal::new(314, 2)))]
    #[case("16.sqrt()", FhirPathValue::Decimal(Decimal::from(4)))]
    #[case("100.log(10)", FhirPathValue::Decimal(Decimal::from(2)))]
    fn test_math(#[case] expr: &str, #[case] expected: FhirPathValue) {
        assert_eq!(eval(expr).unwrap(), Collection::singleton(expected));
    }

    #[test]
    fn test_unrepresentable_results_are_empty() {
        assert!(eval("(-1).sqrt()").unwrap().is_empty());
        assert!(eval("2.power(40)").unwrap().is_empty());
        assert!(eval("(-2147483647 - 1).abs()").unwrap().is_empty());
        assert!(eval("0.ln()").unwrap().is_empty());
    }

    #[rstest]
    #[case("10.log(0)")]
    #[case("10.log(-2)")]
    #[case("10.log(1)")]
    fn test_log_rejects_degenerate_base(#[case] expr: &str) {
        assert!(eval(expr).unwrap().is_empty(), "{expr}");
    }

    #[test]
    fn test_abs_quantity() {
        assert_eq!(
            eval("(-5 'mg').abs() = 5 'mg'").unwrap(),
            Collection::singleton(true)
        );
    }
}
