//! Tree navigation: children, descendants

use std::collections::VecDeque;

use crate::model::{Collection, FhirPathValue};
use crate::registry::function::{FunctionKind, FunctionRegistry};
use crate::registry::signature::FunctionSignature;

fn children_of(item: &FhirPathValue) -> Collection {
    match item {
        FhirPathValue::Element(element) => element.children(),
        _ => Collection::empty(),
    }
}

/// Register tree navigation functions
pub fn register(registry: &mut FunctionRegistry) {
    registry.register_closure(
        FunctionSignature::nullary("children"),
        FunctionKind::CollectionWise,
        "Returns a collection with all immediate child nodes of all items in the input collection.",
        |ctx| {
            let mut out = Collection::new();
            for item in ctx.input().iter() {
                out.extend(children_of(item));
            }
            Ok(out)
        },
    );
    registry.register_closure(
        FunctionSignature::nullary("descendants"),
        FunctionKind::CollectionWise,
        "Returns a collection with all descendant nodes of all items in the input collection, breadth first.",
        |ctx| {
            let mut out = Collection::new();
            let mut queue: VecDeque<FhirPathValue> = ctx.input().iter().cloned().collect();
            while let Some(item) = queue.pop_front() {
                ctx.tick()?;
                for child in children_of(&item) {
                    out.push(child.clone());
                    queue.push_back(child);
                }
            }
            Ok(out)
        },
    );
}
