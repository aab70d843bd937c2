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

//! Built-in FHIRPath function library, one module per function group

pub mod combining;
pub mod conversion;
pub mod existence;
pub mod filtering;
pub mod math;
pub mod string;
pub mod subsetting;
pub mod tree;
pub mod utility;

use crate::core::EvaluationResult;
use crate::evaluator::operators;
use crate::model::Collection;

/// Whether a criteria result counts as `true`
///
/// Empty and `false` both reject; more than one item is an error.
pub(crate) fn is_true(result: &Collection, function: &str) -> EvaluationResult<bool> {
    let context = format!("criteria of function '{function}'");
    Ok(operators::to_boolean(result, &context)? == Some(true))
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::evaluator::{Environment, evaluate};
    use crate::model::Collection;
    use crate::parser::parse;

    /// Evaluate `expr` with no input
    pub fn eval(expr: &str) -> crate::core::EvaluationResult<Collection> {
        let ast = parse(expr).unwrap();
        evaluate(&ast, &Collection::empty(), &Environment::new())
    }

    /// Evaluate `expr` against a JSON resource
    pub fn eval_json(
        expr: &str,
        resource: serde_json::Value,
    ) -> crate::core::EvaluationResult<Collection> {
        let ast = parse(expr).unwrap();
        let env = Environment::new().with_json_resource(&resource);
        let input = env.context().cloned().unwrap_or_default();
        evaluate(&ast, &input, &env)
    }
}
