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

//! Conversion functions: iif, toX() and convertsToX()
//!
//! A failed conversion yields empty from `toX()` and `false` from
//! `convertsToX()`; it is never an error.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::str::FromStr;

use super::is_true;
use crate::evaluator::FunctionContext;
use crate::model::quantity::{is_calendar_keyword, is_valid_unit};
use crate::model::{
    Collection, FhirPathValue, PrecisionDate, PrecisionDateTime, PrecisionTime, Quantity,
};
use crate::registry::function::{FhirPathFunction, FunctionKind, FunctionRegistry, FunctionResult};
use crate::registry::signature::{FunctionSignature, ParameterInfo, ParameterKind};

static INTEGER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?\d+$").expect("integer pattern"));
static DECIMAL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?\d+(\.\d+)?$").expect("decimal pattern"));
static QUANTITY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([+-]?\d+(?:\.\d+)?)\s*(?:'([^']+)'|([a-zA-Z]+))?$")
        .expect("quantity pattern")
});

/// iif(criterion, true-result [, otherwise-result])
///
/// Only the selected branch is evaluated.
pub struct IifFunction;

impl FhirPathFunction for IifFunction {
    fn name(&self) -> &str {
        "iif"
    }

    fn signature(&self) -> &FunctionSignature {
        static SIG: Lazy<FunctionSignature> = Lazy::new(|| {
            FunctionSignature::new(
                "iif",
                vec![
                    ParameterInfo::expression("criterion"),
                    ParameterInfo::expression("true-result"),
                    ParameterInfo::optional("otherwise-result", ParameterKind::Expression),
                ],
            )
        });
        &SIG
    }

    fn kind(&self) -> FunctionKind {
        FunctionKind::ElementWise
    }

    fn documentation(&self) -> &str {
        "If criterion is true, returns the value of true-result; otherwise returns otherwise-result, or empty when it is omitted."
    }

    fn evaluate(&self, ctx: &mut FunctionContext<'_, '_>) -> FunctionResult {
        ctx.input_singleton()?;
        let focus = ctx.input().clone();
        let criterion = ctx.evaluate_with_focus(0, &focus)?;
        if is_true(&criterion, "iif")? {
            ctx.evaluate_with_focus(1, &focus)
        } else if ctx.arg_count() > 2 {
            ctx.evaluate_with_focus(2, &focus)
        } else {
            Ok(Collection::empty())
        }
    }
}

type Converter = fn(&FhirPathValue) -> Option<FhirPathValue>;

fn convert_boolean(value: &FhirPathValue) -> Option<FhirPathValue> {
    let result = match value {
        FhirPathValue::Boolean(b) => *b,
        FhirPathValue::Integer(1) | FhirPathValue::Long(1) => true,
        FhirPathValue::Integer(0) | FhirPathValue::Long(0) => false,
        FhirPathValue::Decimal(d) if *d == Decimal::ONE => true,
        FhirPathValue::Decimal(d) if d.is_zero() => false,
        FhirPathValue::String(s) => match s.to_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" | "1.0" => true,
            "false" | "f" | "no" | "n" | "0" | "0.0" => false,
            _ => return None,
        },
        _ => return None,
    };
    Some(FhirPathValue::Boolean(result))
}

fn convert_integer(value: &FhirPathValue) -> Option<FhirPathValue> {
    match value {
        FhirPathValue::Integer(i) => Some(FhirPathValue::Integer(*i)),
        FhirPathValue::Long(l) => i32::try_from(*l).ok().map(FhirPathValue::Integer),
        FhirPathValue::Boolean(b) => Some(FhirPathValue::Integer(i32::from(*b))),
        FhirPathValue::String(s) if INTEGER_PATTERN.is_match(s) => {
            s.parse::<i32>().ok().map(FhirPathValue::Integer)
        }
        _ => None,
    }
}

fn convert_long(value: &FhirPathValue) -> Option<FhirPathValue> {
    match value {
        FhirPathValue::Integer(_) | FhirPathValue::Long(_) => {
            value.as_integer().map(FhirPathValue::Long)
        }
        FhirPathValue::Boolean(b) => Some(FhirPathValue::Long(i64::from(*b))),
        FhirPathValue::String(s) if INTEGER_PATTERN.is_match(s) => {
            s.parse::<i64>().ok().map(FhirPathValue::Long)
        }
        _ => None,
    }
}

fn convert_decimal(value: &FhirPathValue) -> Option<FhirPathValue> {
    match value {
        FhirPathValue::Integer(_) | FhirPathValue::Long(_) | FhirPathValue::Decimal(_) => {
            value.as_decimal().map(FhirPathValue::Decimal)
        }
        FhirPathValue::Boolean(b) => Some(FhirPathValue::Decimal(if *b {
            Decimal::ONE
        } else {
            Decimal::ZERO
        })),
        FhirPathValue::String(s) if DECIMAL_PATTERN.is_match(s) => {
            Decimal::from_str(s).ok().map(FhirPathValue::Decimal)
        }
        _ => None,
    }
}

fn convert_string(value: &FhirPathValue) -> Option<FhirPathValue> {
    match value {
        FhirPathValue::Element(_) => None,
        other => Some(FhirPathValue::String(other.to_string())),
    }
}

fn convert_date(value: &FhirPathValue) -> Option<FhirPathValue> {
    match value {
        FhirPathValue::Date(d) => Some(FhirPathValue::Date(*d)),
        FhirPathValue::DateTime(dt) => Some(FhirPathValue::Date(dt.date())),
        FhirPathValue::String(s) => PrecisionDate::parse(s)
            .or_else(|| PrecisionDateTime::parse(s).map(|dt| dt.date()))
            .map(FhirPathValue::Date),
        _ => None,
    }
}

fn convert_datetime(value: &FhirPathValue) -> Option<FhirPathValue> {
    match value {
        FhirPathValue::DateTime(dt) => Some(FhirPathValue::DateTime(*dt)),
        FhirPathValue::Date(d) => Some(FhirPathValue::DateTime(d.to_datetime())),
        FhirPathValue::String(s) => PrecisionDateTime::parse(s)
            .or_else(|| PrecisionDate::parse(s).map(|d| d.to_datetime()))
            .map(FhirPathValue::DateTime),
        _ => None,
    }
}

fn convert_time(value: &FhirPathValue) -> Option<FhirPathValue> {
    match value {
        FhirPathValue::Time(t) => Some(FhirPathValue::Time(*t)),
        FhirPathValue::String(s) => {
            PrecisionTime::parse(s.strip_prefix('T').unwrap_or(s)).map(FhirPathValue::Time)
        }
        _ => None,
    }
}

fn parse_quantity(text: &str) -> Option<Quantity> {
    let captures = QUANTITY_PATTERN.captures(text.trim())?;
    let value = Decimal::from_str(captures.get(1)?.as_str()).ok()?;
    match (captures.get(2), captures.get(3)) {
        (Some(unit), _) if is_valid_unit(unit.as_str()) => Some(Quantity::new(value, unit.as_str())),
        (Some(_), _) => None,
        (None, Some(keyword)) if is_calendar_keyword(keyword.as_str()) => {
            Some(Quantity::new(value, keyword.as_str()))
        }
        (None, Some(_)) => None,
        (None, None) => Some(Quantity::unitless(value)),
    }
}

fn convert_quantity(value: &FhirPathValue) -> Option<Quantity> {
    match value {
        FhirPathValue::Integer(_) | FhirPathValue::Long(_) | FhirPathValue::Decimal(_) => {
            value.as_decimal().map(Quantity::unitless)
        }
        FhirPathValue::Boolean(b) => Some(Quantity::unitless(if *b {
            Decimal::ONE
        } else {
            Decimal::ZERO
        })),
        FhirPathValue::String(s) => parse_quantity(s),
        other => other.as_quantity(),
    }
}

fn quantity_with_unit(value: &FhirPathValue, unit: Option<&str>) -> Option<Quantity> {
    let quantity = convert_quantity(value)?;
    match unit {
        Some(unit) => quantity.convert_to(unit),
        None => Some(quantity),
    }
}

fn register_conversion(
    registry: &mut FunctionRegistry,
    type_name: &'static str,
    convert: Converter,
) {
    registry.register_closure(
        FunctionSignature::nullary(format!("to{type_name}")),
        FunctionKind::CollectionWise,
        format!("Converts the single input item to {type_name}; empty when it cannot be converted."),
        move |ctx| {
            Ok(ctx
                .input_singleton()?
                .and_then(convert)
                .map(Collection::singleton)
                .unwrap_or_default())
        },
    );
    registry.register_closure(
        FunctionSignature::nullary(format!("convertsTo{type_name}")),
        FunctionKind::CollectionWise,
        format!("Returns true if the single input item can be converted to {type_name}."),
        move |ctx| {
            Ok(match ctx.input_singleton()? {
                Some(value) => Collection::singleton(convert(value).is_some()),
                None => Collection::empty(),
            })
        },
    );
}

/// Register conversion functions
pub fn register(registry: &mut FunctionRegistry) {
    registry.register(IifFunction);

    register_conversion(registry, "Boolean", convert_boolean);
    register_conversion(registry, "Integer", convert_integer);
    register_conversion(registry, "Long", convert_long);
    register_conversion(registry, "Decimal", convert_decimal);
    register_conversion(registry, "String", convert_string);
    register_conversion(registry, "Date", convert_date);
    register_conversion(registry, "DateTime", convert_datetime);
    register_conversion(registry, "Time", convert_time);

    registry.register_closure(
        FunctionSignature::new(
            "toQuantity",
            vec![ParameterInfo::optional("unit", ParameterKind::Value)],
        ),
        FunctionKind::CollectionWise,
        "Converts the single input item to a Quantity, optionally converted to the given unit.",
        |ctx| {
            let unit = ctx.string_arg(0)?;
            Ok(ctx
                .input_singleton()?
                .and_then(|value| quantity_with_unit(value, unit.as_deref()))
                .map(Collection::singleton)
                .unwrap_or_default())
        },
    );
    registry.register_closure(
        FunctionSignature::new(
            "convertsToQuantity",
            vec![ParameterInfo::optional("unit", ParameterKind::Value)],
        ),
        FunctionKind::CollectionWise,
        "Returns true if the single input item can be converted to a Quantity.",
        |ctx| {
            let unit = ctx.string_arg(0)?;
            Ok(match ctx.input_singleton()? {
                Some(value) => {
                    Collection::singleton(quantity_with_unit(value, unit.as_deref()).is_some())
                }
                None => Collection::empty(),
            })
        },
    );
}

/// Integer view of a decimal that has no fractional part
pub(crate) fn exact_integer(value: Decimal) -> Option<FhirPathValue> {
    if !value.fract().is_zero() {
        return None;
    }
    match value.to_i32() {
        Some(i) => Some(FhirPathValue::Integer(i)),
        None => value.to_i64().map(FhirPathValue::Long),
    }
}
