//! Combining functions: union, combine

use crate::evaluator::operators;
use crate::registry::function::{FunctionKind, FunctionRegistry};
use crate::registry::signature::{FunctionSignature, ParameterInfo};

/// Register combining functions
pub fn register(registry: &mut FunctionRegistry) {
    registry.register_closure(
        FunctionSignature::new("union", vec![ParameterInfo::value("other")]),
        FunctionKind::CollectionWise,
        "Merge the two collections into a single collection, eliminating any duplicate values. Same as the | operator.",
        |ctx| {
            let other = ctx.arg(0).cloned().unwrap_or_default();
            Ok(operators::union(ctx.input(), &other))
        },
    );
    registry.register_closure(
        FunctionSignature::new("combine", vec![ParameterInfo::value("other")]),
        FunctionKind::CollectionWise,
        "Merge the input and other collections into a single collection without eliminating duplicate values.",
        |ctx| {
            let mut out = ctx.input().clone();
            if let Some(other) = ctx.arg(0) {
                out.extend(other.iter().cloned());
            }
            Ok(out)
        },
    );
}
