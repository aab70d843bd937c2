//! Filtering and projection: where, select, repeat, ofType

use std::collections::VecDeque;
use once_cell::sync::Lazy;

use super::is_true;
use crate::evaluator::{FunctionContext, operators};
use crate::model::Collection;
use crate::registry::function::{FhirPathFunction, FunctionKind, FunctionRegistry, FunctionResult};
use crate::registry::signature::{FunctionSignature, ParameterInfo};

/// where(criteria) - items for which the criteria is true
pub struct WhereFunction;

impl FhirPathFunction for WhereFunction {
    fn name(&self) -> &str {
        "where"
    }

    fn signature(&self) -> &FunctionSignature {
        static SIG: Lazy<FunctionSignature> = Lazy::new(|| {
            FunctionSignature::new("where", vec![ParameterInfo::expression("criteria")])
        });
        &SIG
    }

    fn kind(&self) -> FunctionKind {
        FunctionKind::ElementWise
    }

    fn documentation(&self) -> &str {
        "Returns a collection containing only those elements in the input collection for which the stated criteria expression evaluates to true."
    }

    fn evaluate(&self, ctx: &mut FunctionContext<'_, '_>) -> FunctionResult {
        let input = ctx.input();
        let mut out = Collection::new();
        for (index, item) in input.iter().enumerate() {
            let result = ctx.evaluate_for_item(0, item, index)?;
            if is_true(&result, "where")? {
                out.push(item.clone());
            }
        }
        Ok(out)
    }
}

/// select(projection) - concatenated projection of every item
pub struct SelectFunction;

impl FhirPathFunction for SelectFunction {
    fn name(&self) -> &str {
        "select"
    }

    fn signature(&self) -> &FunctionSignature {
        static SIG: Lazy<FunctionSignature> = Lazy::new(|| {
            FunctionSignature::new("select", vec![ParameterInfo::expression("projection")])
        });
        &SIG
    }

    fn kind(&self) -> FunctionKind {
        FunctionKind::ElementWise
    }

    fn documentation(&self) -> &str {
        "Evaluates the projection expression for each item in the input collection and flattens the results."
    }

    fn evaluate(&self, ctx: &mut FunctionContext<'_, '_>) -> FunctionResult {
        let input = ctx.input();
        let mut out = Collection::new();
        for (index, item) in input.iter().enumerate() {
            out.extend(ctx.evaluate_for_item(0, item, index)?);
        }
        Ok(out)
    }
}

/// repeat(projection) - transitive closure of the projection
///
/// Items already produced are not projected again, so cyclic projections
/// terminate.
pub struct RepeatFunction;

impl FhirPathFunction for RepeatFunction {
    fn name(&self) -> &str {
        "repeat"
    }

    fn signature(&self) -> &FunctionSignature {
        static SIG: Lazy<FunctionSignature> = Lazy::new(|| {
            FunctionSignature::new("repeat", vec![ParameterInfo::expression("projection")])
        });
        &SIG
    }

    fn kind(&self) -> FunctionKind {
        FunctionKind::ElementWise
    }

    fn documentation(&self) -> &str {
        "Repeatedly evaluates the projection on the input and on each new result, returning every distinct item produced."
    }

    fn evaluate(&self, ctx: &mut FunctionContext<'_, '_>) -> FunctionResult {
        let mut out = Collection::new();
        let mut queue: VecDeque<_> = ctx.input().iter().cloned().collect();
        let mut index = 0;
        while let Some(item) = queue.pop_front() {
            ctx.tick()?;
            for produced in ctx.evaluate_for_item(0, &item, index)? {
                if !operators::contains_value(&out, &produced) {
                    out.push(produced.clone());
                    queue.push_back(produced);
                }
            }
            index += 1;
        }
        Ok(out)
    }
}

/// Register filtering functions
pub fn register(registry: &mut FunctionRegistry) {
    registry.register(WhereFunction);
    registry.register(SelectFunction);
    registry.register(RepeatFunction);

    registry.register_closure(
        FunctionSignature::new("ofType", vec![ParameterInfo::type_name("type")]),
        FunctionKind::CollectionWise,
        "Returns a collection that contains all items in the input collection that are of the given type or a subclass thereof.",
        |ctx| {
            let spec = ctx.type_arg(0)?;
            Ok(ctx
                .input()
                .iter()
                .filter(|item| spec.matches(item))
                .cloned()
                .collect())
        },
    );
}
