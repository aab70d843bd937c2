//! Existence functions: empty, exists, all, allTrue, count, distinct, ...

use once_cell::sync::Lazy;

use super::is_true;
use crate::core::{EvaluationError, EvaluationResult};
use crate::evaluator::{FunctionContext, operators};
use crate::model::{Collection, FhirPathValue};
use crate::registry::function::{FhirPathFunction, FunctionKind, FunctionRegistry, FunctionResult};
use crate::registry::signature::{FunctionSignature, ParameterInfo, ParameterKind};

/// exists([criteria]) - true when the (filtered) input has any item
pub struct ExistsFunction;

impl FhirPathFunction for ExistsFunction {
    fn name(&self) -> &str {
        "exists"
    }

    fn signature(&self) -> &FunctionSignature {
        static SIG: Lazy<FunctionSignature> = Lazy::new(|| {
            FunctionSignature::new(
                "exists",
                vec![ParameterInfo::optional("criteria", ParameterKind::Expression)],
            )
        });
        &SIG
    }

    fn kind(&self) -> FunctionKind {
        FunctionKind::ElementWise
    }

    fn documentation(&self) -> &str {
        "Returns true if the input collection has any elements (optionally filtered by the criteria), and false otherwise."
    }

    fn evaluate(&self, ctx: &mut FunctionContext<'_, '_>) -> FunctionResult {
        if ctx.arg_count() == 0 {
            return Ok(Collection::singleton(!ctx.input().is_empty()));
        }
        let input = ctx.input();
        for (index, item) in input.iter().enumerate() {
            let result = ctx.evaluate_for_item(0, item, index)?;
            if is_true(&result, "exists")? {
                return Ok(Collection::singleton(true));
            }
        }
        Ok(Collection::singleton(false))
    }
}

/// all(criteria) - true when every item satisfies the criteria
pub struct AllFunction;

impl FhirPathFunction for AllFunction {
    fn name(&self) -> &str {
        "all"
    }

    fn signature(&self) -> &FunctionSignature {
        static SIG: Lazy<FunctionSignature> = Lazy::new(|| {
            FunctionSignature::new("all", vec![ParameterInfo::expression("criteria")])
        });
        &SIG
    }

    fn kind(&self) -> FunctionKind {
        FunctionKind::ElementWise
    }

    fn documentation(&self) -> &str {
        "Returns true if for every element in the input collection, criteria evaluates to true. Returns true for an empty input."
    }

    fn evaluate(&self, ctx: &mut FunctionContext<'_, '_>) -> FunctionResult {
        let input = ctx.input();
        for (index, item) in input.iter().enumerate() {
            let result = ctx.evaluate_for_item(0, item, index)?;
            if !is_true(&result, "all")? {
                return Ok(Collection::singleton(false));
            }
        }
        Ok(Collection::singleton(true))
    }
}

fn booleans(ctx: &FunctionContext<'_, '_>) -> EvaluationResult<Vec<bool>> {
    ctx.input()
        .iter()
        .map(|item| {
            item.as_boolean()
                .ok_or_else(|| ctx.input_mismatch("Boolean", item))
        })
        .collect()
}

/// Whether every item of `subset` is equal to some item of `superset`
fn is_subset(subset: &Collection, superset: &Collection) -> bool {
    subset
        .iter()
        .all(|item| operators::contains_value(superset, item))
}

fn other_arg(ctx: &FunctionContext<'_, '_>) -> Collection {
    ctx.arg(0).cloned().unwrap_or_default()
}

fn nullary(name: &str) -> FunctionSignature {
    FunctionSignature::nullary(name)
}

fn register_boolean_aggregate(
    registry: &mut FunctionRegistry,
    name: &'static str,
    doc: &'static str,
    test: fn(&[bool]) -> bool,
) {
    registry.register_closure(
        nullary(name),
        FunctionKind::CollectionWise,
        doc,
        move |ctx| Ok(Collection::singleton(test(&booleans(ctx)?))),
    );
}

/// Register existence functions
pub fn register(registry: &mut FunctionRegistry) {
    registry.register(ExistsFunction);
    registry.register(AllFunction);

    registry.register_closure(
        nullary("empty"),
        FunctionKind::CollectionWise,
        "Returns true if the input collection is empty and false otherwise.",
        |ctx| Ok(Collection::singleton(ctx.input().is_empty())),
    );

    register_boolean_aggregate(
        registry,
        "allTrue",
        "Takes a collection of Boolean values and returns true if all the items are true.",
        |items| items.iter().all(|b| *b),
    );
    register_boolean_aggregate(
        registry,
        "anyTrue",
        "Takes a collection of Boolean values and returns true if any of the items are true.",
        |items| items.iter().any(|b| *b),
    );
    register_boolean_aggregate(
        registry,
        "allFalse",
        "Takes a collection of Boolean values and returns true if all the items are false.",
        |items| items.iter().all(|b| !*b),
    );
    register_boolean_aggregate(
        registry,
        "anyFalse",
        "Takes a collection of Boolean values and returns true if any of the items are false.",
        |items| items.iter().any(|b| !*b),
    );

    registry.register_closure(
        FunctionSignature::new("subsetOf", vec![ParameterInfo::value("other")]),
        FunctionKind::CollectionWise,
        "Returns true if all items in the input collection are members of the collection passed as the other argument.",
        |ctx| Ok(Collection::singleton(is_subset(ctx.input(), &other_arg(ctx)))),
    );
    registry.register_closure(
        FunctionSignature::new("supersetOf", vec![ParameterInfo::value("other")]),
        FunctionKind::CollectionWise,
        "Returns true if all items in the collection passed as the other argument are members of the input collection.",
        |ctx| Ok(Collection::singleton(is_subset(&other_arg(ctx), ctx.input()))),
    );

    registry.register_closure(
        nullary("count"),
        FunctionKind::CollectionWise,
        "Returns the integer count of the number of items in the input collection. Returns 0 when the input collection is empty.",
        |ctx| {
            let count = i32::try_from(ctx.input().len()).map_err(|_| {
                EvaluationError::type_mismatch("collection too large to count as Integer")
            })?;
            Ok(Collection::singleton(FhirPathValue::Integer(count)))
        },
    );
    registry.register_closure(
        nullary("distinct"),
        FunctionKind::CollectionWise,
        "Returns a collection containing only the unique items in the input collection.",
        |ctx| Ok(operators::distinct(ctx.input())),
    );
    registry.register_closure(
        nullary("isDistinct"),
        FunctionKind::CollectionWise,
        "Returns true if all the items in the input collection are distinct.",
        |ctx| {
            let input = ctx.input();
            Ok(Collection::singleton(
                operators::distinct(input).len() == input.len(),
            ))
        },
    );
}

#[cfg(test)]
mod tests {
    use super::super::test_support::eval;
    use crate::core::EvalErrorKind;
    use crate::model::Collection;

    #[test]
    fn test_empty_and_exists() {
        assert_eq!(eval("{}.empty()").unwrap(), Collection::singleton(true));
        assert_eq!(eval("(1 | 2).exists()").unwrap(), Collection::singleton(true));
        assert_eq!(
            eval("(1 | 2 | 3).exists($this > 2)").unwrap(),
            Collection::singleton(true)
        );
        assert_eq!(
            eval("(1 | 2 | 3).exists($this > 5)").unwrap(),
            Collection::singleton(false)
        );
    }

    #[test]
    fn test_all_on_empty_is_true() {
        assert_eq!(eval("{}.all($this > 1)").unwrap(), Collection::singleton(true));
        assert_eq!(
            eval("(1 | 2 | 3).all($this > 1)").unwrap(),
            Collection::singleton(false)
        );
    }

    #[test]
    fn test_boolean_aggregates() {
        assert_eq!(eval("(true | false).anyTrue()").unwrap(), Collection::singleton(true));
        assert_eq!(eval("(true | false).allTrue()").unwrap(), Collection::singleton(false));
        assert_eq!(eval("{}.allFalse()").unwrap(), Collection::singleton(true));
        let err = eval("(1 | 2).allTrue()").unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::TypeMismatch);
    }

    #[test]
    fn test_count_and_distinct() {
        assert_eq!(eval("(1 | 2 | 3).count()").unwrap(), Collection::singleton(3));
        assert_eq!(eval("(1).combine(1).count()").unwrap(), Collection::singleton(2));
        assert_eq!(eval("(1).combine(1).distinct().count()").unwrap(), Collection::singleton(1));
        assert_eq!(eval("(1).combine(1).isDistinct()").unwrap(), Collection::singleton(false));
    }

    #[test]
    fn test_subset_superset() {
        assert_eq!(eval("(1 | 2).subsetOf(1 | 2 | 3)").unwrap(), Collection::singleton(true));
        assert_eq!(eval("(1 | 2).supersetOf(1 | 2 | 3)").unwrap(), Collection::singleton(false));
    }

    #[test]
    fn test_wrong_arity() {
        let err = eval("(1 | 2).count(1)").unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::WrongArity);
    }
}
