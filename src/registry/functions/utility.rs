//! Utility functions: trace, now, today, timeOfDay, aggregate, not, is, as, hasValue

use once_cell::sync::Lazy;

use crate::evaluator::{FunctionContext, operators};
use crate::model::{
    Collection, FhirPathValue, PrecisionDate, PrecisionDateTime, PrecisionTime, TemporalPrecision,
};
use crate::registry::function::{FhirPathFunction, FunctionKind, FunctionRegistry, FunctionResult};
use crate::registry::signature::{FunctionSignature, ParameterInfo, ParameterKind};

/// trace(name [, projection]) - log the input and pass it through
pub struct TraceFunction;

impl FhirPathFunction for TraceFunction {
    fn name(&self) -> &str {
        "trace"
    }

    fn signature(&self) -> &FunctionSignature {
        static SIG: Lazy<FunctionSignature> = Lazy::new(|| {
            FunctionSignature::new(
                "trace",
                vec![
                    ParameterInfo::value("name"),
                    ParameterInfo::optional("projection", ParameterKind::Expression),
                ],
            )
        });
        &SIG
    }

    fn documentation(&self) -> &str {
        "Adds a String representation of the input collection to the diagnostic log, using the name argument as the label. Returns the input unchanged."
    }

    fn evaluate(&self, ctx: &mut FunctionContext<'_, '_>) -> FunctionResult {
        let input = ctx.input();
        let name = ctx.string_arg(0)?.unwrap_or_default();
        if ctx.arg_count() > 1 {
            let projected = ctx.evaluate_with_focus(1, input)?;
            log::info!(target: "fhirpath::trace", "{name}: {projected}");
        } else {
            log::info!(target: "fhirpath::trace", "{name}: {input}");
        }
        Ok(input.clone())
    }
}

/// aggregate(aggregator [, init]) - fold the input with `$total`
pub struct AggregateFunction;

impl FhirPathFunction for AggregateFunction {
    fn name(&self) -> &str {
        "aggregate"
    }

    fn signature(&self) -> &FunctionSignature {
        static SIG: Lazy<FunctionSignature> = Lazy::new(|| {
            FunctionSignature::new(
                "aggregate",
                vec![
                    ParameterInfo::expression("aggregator"),
                    ParameterInfo::optional("init", ParameterKind::Value),
                ],
            )
        });
        &SIG
    }

    fn kind(&self) -> FunctionKind {
        FunctionKind::ElementWise
    }

    fn documentation(&self) -> &str {
        "Evaluates the aggregator expression for each input item with $total bound to the running result, starting from init (empty when omitted)."
    }

    fn evaluate(&self, ctx: &mut FunctionContext<'_, '_>) -> FunctionResult {
        let input = ctx.input();
        let mut total = ctx.arg(1).cloned().unwrap_or_default();
        for (index, item) in input.iter().enumerate() {
            total = ctx.evaluate_with_total(0, item, index, &total)?;
        }
        Ok(total)
    }
}

fn type_check(ctx: &mut FunctionContext<'_, '_>, cast: bool) -> FunctionResult {
    let spec = ctx.type_arg(0)?;
    let Some(value) = ctx.input_singleton()? else {
        return Ok(Collection::empty());
    };
    let matches = spec.matches(value);
    Ok(match (cast, matches) {
        (false, _) => Collection::singleton(matches),
        (true, true) => Collection::singleton(value.clone()),
        (true, false) => Collection::empty(),
    })
}

/// Register utility functions
pub fn register(registry: &mut FunctionRegistry) {
    registry.register(TraceFunction);
    registry.register(AggregateFunction);

    registry.register_closure(
        FunctionSignature::nullary("now"),
        FunctionKind::CollectionWise,
        "Returns the current date and time, including timezone offset.",
        |ctx| {
            let now = PrecisionDateTime::new(ctx.now(), TemporalPrecision::Millisecond, true);
            Ok(Collection::singleton(FhirPathValue::DateTime(now)))
        },
    );
    registry.register_closure(
        FunctionSignature::nullary("today"),
        FunctionKind::CollectionWise,
        "Returns the current date.",
        |ctx| {
            let today = PrecisionDate::new(ctx.now().date_naive(), TemporalPrecision::Day);
            Ok(Collection::singleton(FhirPathValue::Date(today)))
        },
    );
    registry.register_closure(
        FunctionSignature::nullary("timeOfDay"),
        FunctionKind::CollectionWise,
        "Returns the current time.",
        |ctx| {
            let time = PrecisionTime::new(ctx.now().time(), TemporalPrecision::Millisecond);
            Ok(Collection::singleton(FhirPathValue::Time(time)))
        },
    );

    registry.register_closure(
        FunctionSignature::nullary("not"),
        FunctionKind::CollectionWise,
        "Returns true if the input evaluates to false, and false if it evaluates to true. Empty input gives empty.",
        |ctx| {
            let value = operators::to_boolean(ctx.input(), "function 'not'")?;
            Ok(value.map(|b| Collection::singleton(!b)).unwrap_or_default())
        },
    );
    registry.register_closure(
        FunctionSignature::new("is", vec![ParameterInfo::type_name("type")]),
        FunctionKind::CollectionWise,
        "Returns true if the single input item is of the given type.",
        |ctx| type_check(ctx, false),
    );
    registry.register_closure(
        FunctionSignature::new("as", vec![ParameterInfo::type_name("type")]),
        FunctionKind::CollectionWise,
        "Returns the single input item if it is of the given type, otherwise empty.",
        |ctx| type_check(ctx, true),
    );
    registry.register_closure(
        FunctionSignature::nullary("hasValue"),
        FunctionKind::CollectionWise,
        "Returns true if the input is a single primitive value.",
        |ctx| {
            let input = ctx.input();
            let has_value = input.len() == 1 && input.iter().all(FhirPathValue::is_primitive);
            Ok(Collection::singleton(has_value))
        },
    );
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{eval, eval_json};
    use crate::core::EvalErrorKind;
    use crate::model::{Collection, FhirPathValue};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn test_trace_returns_input() {
        assert_eq!(
            eval("(1 | 2).trace('nums').count()").unwrap(),
            Collection::singleton(2)
        );
        assert_eq!(
            eval("(1 | 2).trace('nums', count()).first()").unwrap(),
            Collection::singleton(1)
        );
    }

    #[rstest]
    #[case("(1 | 2 | 3).aggregate($this + $total, 0)", 6)]
    #[case("(1 | 2 | 3).aggregate($total + $index, 0)", 3)]
    #[case("(4 | 7 | 2).aggregate(iif($total.empty() or $this > $total, $this, $total))", 7)]
    fn test_aggregate(#[case] expr: &str, #[case] expected: i32) {
        assert_eq!(eval(expr).unwrap(), Collection::singleton(expected));
    }

    #[test]
    fn test_aggregate_empty_input_returns_init() {
        assert_eq!(
            eval("{}.aggregate($this + $total, 10)").unwrap(),
            Collection::singleton(10)
        );
        assert!(eval("{}.aggregate($this + $total)").unwrap().is_empty());
    }

    #[test]
    fn test_clock_functions_are_consistent() {
        assert_eq!(eval("now() = now()").unwrap(), Collection::singleton(true));
        assert_eq!(eval("now().toDate() = today()").unwrap(), Collection::singleton(true));
        assert_eq!(eval("timeOfDay() is Time").unwrap(), Collection::singleton(true));
    }

    #[rstest]
    #[case("true.not()", Some(false))]
    #[case("false.not()", Some(true))]
    #[case("{}.not()", None)]
    #[case("5.not()", Some(false))]
    fn test_not(#[case] expr: &str, #[case] expected: Option<bool>) {
        let expected = expected.map(Collection::singleton).unwrap_or_default();
        assert_eq!(eval(expr).unwrap(), expected);
    }

    #[test]
    fn test_is_and_as_functions() {
        assert_eq!(eval("1.is(Integer)").unwrap(), Collection::singleton(true));
        assert_eq!(eval("1.is(String)").unwrap(), Collection::singleton(false));
        assert_eq!(eval("'a'.as(String)").unwrap(), Collection::singleton("a"));
        assert!(eval("'a'.as(Integer)").unwrap().is_empty());
        assert_eq!(
            eval("(1 | 2).is(Integer)").unwrap_err().kind,
            EvalErrorKind::NonSingleton
        );
    }

    #[test]
    fn test_has_value() {
        let patient = json!({"resourceType": "Patient", "active": true, "name": [{"family": "Doe"}]});
        assert_eq!(
            eval_json("active.hasValue()", patient.clone()).unwrap(),
            Collection::singleton(true)
        );
        assert_eq!(
            eval_json("name.hasValue()", patient.clone()).unwrap(),
            Collection::singleton(false)
        );
        assert_eq!(
            eval_json("gender.hasValue()", patient).unwrap(),
            Collection::singleton(FhirPathValue::Boolean(false))
        );
    }
}
