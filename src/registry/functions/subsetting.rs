//! Subsetting functions: single, first, last, tail, skip, take, intersect, exclude

use crate::core::EvaluationError;
use crate::evaluator::{FunctionContext, operators};
use crate::model::Collection;
use crate::registry::function::{FunctionKind, FunctionRegistry};
use crate::registry::signature::{FunctionSignature, ParameterInfo};

fn count_arg(ctx: &FunctionContext<'_, '_>) -> Result<Option<i64>, EvaluationError> {
    ctx.integer_arg(0)
}

fn slice(input: &Collection, skip: usize, take: usize) -> Collection {
    input.iter().skip(skip).take(take).cloned().collect()
}

/// Register subsetting functions
pub fn register(registry: &mut FunctionRegistry) {
    registry.register_closure(
        FunctionSignature::nullary("single"),
        FunctionKind::CollectionWise,
        "Returns the single item in the input if there is just one item. Signals an error if there are multiple items.",
        |ctx| {
            let item = ctx.input_singleton()?;
            Ok(item.cloned().map(Collection::singleton).unwrap_or_default())
        },
    );
    registry.register_closure(
        FunctionSignature::nullary("first"),
        FunctionKind::CollectionWise,
        "Returns a collection containing only the first item in the input collection.",
        |ctx| Ok(slice(ctx.input(), 0, 1)),
    );
    registry.register_closure(
        FunctionSignature::nullary("last"),
        FunctionKind::CollectionWise,
        "Returns a collection containing only the last item in the input collection.",
        |ctx| {
            let input = ctx.input();
            Ok(slice(input, input.len().saturating_sub(1), 1))
        },
    );
    registry.register_closure(
        FunctionSignature::nullary("tail"),
        FunctionKind::CollectionWise,
        "Returns a collection containing all but the first item in the input collection.",
        |ctx| Ok(slice(ctx.input(), 1, usize::MAX)),
    );
    registry.register_closure(
        FunctionSignature::new("skip", vec![ParameterInfo::value("num")]),
        FunctionKind::CollectionWise,
        "Returns a collection containing all but the first num items in the input collection.",
        |ctx| {
            let Some(num) = count_arg(ctx)? else {
                return Ok(Collection::empty());
            };
            let skip = usize::try_from(num.max(0)).unwrap_or(usize::MAX);
            Ok(slice(ctx.input(), skip, usize::MAX))
        },
    );
    registry.register_closure(
        FunctionSignature::new("take", vec![ParameterInfo::value("num")]),
        FunctionKind::CollectionWise,
        "Returns a collection containing the first num items in the input collection, or less if there are less than num items.",
        |ctx| {
            let Some(num) = count_arg(ctx)? else {
                return Ok(Collection::empty());
            };
            let take = usize::try_from(num.max(0)).unwrap_or(usize::MAX);
            Ok(slice(ctx.input(), 0, take))
        },
    );
    registry.register_closure(
        FunctionSignature::new("intersect", vec![ParameterInfo::value("other")]),
        FunctionKind::CollectionWise,
        "Returns the set of distinct items that appear in both the input collection and the other collection.",
        |ctx| {
            let other = ctx.arg(0).cloned().unwrap_or_default();
            let common: Collection = ctx
                .input()
                .iter()
                .filter(|item| operators::contains_value(&other, item))
                .cloned()
                .collect();
            Ok(operators::distinct(&common))
        },
    );
    registry.register_closure(
        FunctionSignature::new("exclude", vec![ParameterInfo::value("other")]),
        FunctionKind::CollectionWise,
        "Returns the items of the input collection that are not in the other collection, keeping duplicates and order.",
        |ctx| {
            let other = ctx.arg(0).cloned().unwrap_or_default();
            Ok(ctx
                .input()
                .iter()
                .filter(|item| !operators::contains_value(&other, item))
                .cloned()
                .collect())
        },
    );
}

#[cfg(test)]
mod tests {
    use super::super::test_support::eval;
    use crate::core::EvalErrorKind;
    use crate::model::{Collection, FhirPathValue};

    fn ints(values: &[i32]) -> Collection {
        values.iter().map(|v| FhirPathValue::Integer(*v)).collect()
    }

    #[test]
    fn test_first_last_tail() {
        assert_eq!(eval("(1 | 2 | 3).first()").unwrap(), ints(&[1]));
        assert_eq!(eval("(1 | 2 | 3).last()").unwrap(), ints(&[3]));
        assert_eq!(eval("(1 | 2 | 3).tail()").unwrap(), ints(&[2, 3]));
        assert!(eval("{}.last()").unwrap().is_empty());
    }

    #[test]
    fn test_skip_take() {
        assert_eq!(eval("(1 | 2 | 3).skip(1)").unwrap(), ints(&[2, 3]));
        assert_eq!(eval("(1 | 2 | 3).skip(-1)").unwrap(), ints(&[1, 2, 3]));
        assert_eq!(eval("(1 | 2 | 3).take(2)").unwrap(), ints(&[1, 2]));
        assert!(eval("(1 | 2 | 3).take(0)").unwrap().is_empty());
    }

    #[test]
    fn test_single() {
        assert_eq!(eval("(5).single()").unwrap(), ints(&[5]));
        let err = eval("(1 | 2).single()").unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::NonSingleton);
    }

    #[test]
    fn test_intersect_exclude() {
        assert_eq!(eval("(1 | 2 | 3).intersect(2 | 3 | 4)").unwrap(), ints(&[2, 3]));
        assert_eq!(eval("(1 | 2 | 3).exclude(2)").unwrap(), ints(&[1, 3]));
    }
}
