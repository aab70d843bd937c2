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

//! Tree-walking evaluator
//!
//! Every node visit is charged against the step budget and every recursive
//! descent against the depth limit, so evaluation terminates with a
//! [`Budget`](crate::core::EvalErrorKind::Budget) error instead of exhausting
//! resources.

use chrono::{DateTime, FixedOffset, Local, SubsecRound};
use smallvec::SmallVec;

use super::context::{FunctionContext, Scope};
use super::environment::Environment;
use super::operators;
use crate::ast::{
    BinaryOperator, ExpressionNode, FunctionCallData, SpecialVariable, UnaryOperator,
};
use crate::core::overflow;
use crate::core::{EvaluationError, EvaluationResult};
use crate::model::{Collection, FhirPathValue, Quantity};
use crate::registry::ParameterKind;

/// Evaluate `expression` against `input`.
///
/// `input` is the initial focus and `$this`. Evaluation is deterministic and
/// leaves both the expression and the input untouched.
pub fn evaluate(
    expression: &ExpressionNode,
    input: &Collection,
    env: &Environment,
) -> EvaluationResult<Collection> {
    let mut evaluator = Evaluator::new(env, input.clone());
    evaluator.run(expression)
}

/// Single-use evaluator state
pub struct Evaluator<'env> {
    env: &'env Environment,
    input: Collection,
    steps: usize,
    depth: usize,
    now: DateTime<FixedOffset>,
}

impl<'env> Evaluator<'env> {
    /// Create an evaluator for one evaluation of `input`
    pub fn new(env: &'env Environment, input: Collection) -> Self {
        Self {
            env,
            input,
            steps: 0,
            depth: 0,
            now: Local::now().fixed_offset().trunc_subsecs(3),
        }
    }

    /// Evaluate `expression` from the root scope
    pub fn run(&mut self, expression: &ExpressionNode) -> EvaluationResult<Collection> {
        let scope = Scope::root(self.input.clone());
        let focus = self.input.clone();
        let result = self.eval(expression, &focus, &scope);
        log::debug!("evaluated '{expression}' in {} steps", self.steps);
        result
    }

    /// Nodes visited so far
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub(crate) fn environment(&self) -> &'env Environment {
        self.env
    }

    /// Clock reading shared by every `now()` of this evaluation
    pub(crate) fn now(&self) -> DateTime<FixedOffset> {
        self.now
    }

    pub(crate) fn tick(&mut self) -> EvaluationResult<()> {
        self.steps += 1;
        match self.env.config().max_steps {
            Some(max) if self.steps > max => {
                log::warn!("evaluation budget of {max} steps exhausted");
                Err(EvaluationError::budget(format!(
                    "evaluation exceeded {max} steps"
                )))
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn eval(
        &mut self,
        node: &ExpressionNode,
        focus: &Collection,
        scope: &Scope,
    ) -> EvaluationResult<Collection> {
        self.tick()?;
        let max_depth = self.env.config().max_depth;
        if self.depth >= max_depth {
            log::warn!("evaluation depth limit of {max_depth} reached");
            return Err(EvaluationError::budget(format!(
                "evaluation exceeded nesting depth {max_depth}"
            )));
        }
        self.depth += 1;
        let result = self.eval_node(node, focus, scope);
        self.depth -= 1;
        result
    }

    fn eval_node(
        &mut self,
        node: &ExpressionNode,
        focus: &Collection,
        scope: &Scope,
    ) -> EvaluationResult<Collection> {
        match node {
            ExpressionNode::Literal(literal) => Ok(literal.to_collection()),
            ExpressionNode::Identifier(name) => Ok(navigate(focus, name, true)),
            ExpressionNode::Invocation { base, member } => {
                let input = self.eval(base, focus, scope)?;
                match member.as_ref() {
                    ExpressionNode::Identifier(name) => {
                        self.tick()?;
                        Ok(navigate(&input, name, false))
                    }
                    ExpressionNode::FunctionCall(call) => {
                        self.tick()?;
                        self.call_function(call, &input, scope)
                    }
                    other => Err(EvaluationError::type_mismatch(format!(
                        "'{other}' cannot be invoked"
                    ))),
                }
            }
            ExpressionNode::Indexer { base, index } => {
                let items = self.eval(base, focus, scope)?;
                let index = self.eval(index, &scope.this, scope)?;
                index_collection(&items, &index)
            }
            ExpressionNode::UnaryOp { op, operand } => {
                let value = self.eval(operand, focus, scope)?;
                unary(*op, &value)
            }
            ExpressionNode::BinaryOp(data) => {
                let op = data.op;
                if op.is_type_operator() {
                    let left = self.eval(&data.left, focus, scope)?;
                    return type_operation(op, &left, &data.right);
                }
                let left = self.eval(&data.left, focus, scope)?;
                if let Some(result) = short_circuit(op, &left)? {
                    return Ok(result);
                }
                let right = self.eval(&data.right, focus, scope)?;
                operators::evaluate_binary(op, &left, &right)
            }
            ExpressionNode::FunctionCall(call) => self.call_function(call, focus, scope),
            ExpressionNode::TypeSpecifier(spec) => Err(EvaluationError::type_mismatch(format!(
                "type specifier '{spec}' is not a value"
            ))),
            ExpressionNode::ExternalConstant(name) => self
                .env
                .variable(name, &self.input)
                .ok_or_else(|| EvaluationError::unknown_identifier(&format!("%{name}"))),
            ExpressionNode::Variable(var) => match var {
                SpecialVariable::This => Ok(scope.this.clone()),
                SpecialVariable::Index => scope
                    .index
                    .map(|i| Collection::singleton(i as i32))
                    .ok_or_else(|| EvaluationError::unknown_identifier("$index")),
                SpecialVariable::Total => scope
                    .total
                    .clone()
                    .ok_or_else(|| EvaluationError::unknown_identifier("$total")),
            },
        }
    }

    fn call_function(
        &mut self,
        call: &FunctionCallData,
        input: &Collection,
        scope: &Scope,
    ) -> EvaluationResult<Collection> {
        let env = self.env;
        let function = env
            .functions()
            .get(&call.name)
            .ok_or_else(|| EvaluationError::unknown_function(&call.name))?;
        function.validate_arity(call.args.len())?;
        let signature = function.signature();
        log::trace!(
            "calling {} {}({} args) on {} item(s)",
            function.kind(),
            call.name,
            call.args.len(),
            input.len()
        );

        let mut values: SmallVec<[Option<Collection>; 4]> = SmallVec::new();
        for (i, arg) in call.args.iter().enumerate() {
            let value = match signature.parameter_kind(i) {
                ParameterKind::Value => Some(self.eval(arg, &scope.this, scope)?),
                ParameterKind::Expression | ParameterKind::Type => None,
            };
            values.push(value);
        }

        let mut ctx = FunctionContext::new(self, signature, input, &call.args, values, scope);
        function.evaluate(&mut ctx)
    }
}

/// Project member `name` from every item of `input`.
///
/// At the root of a path an element whose type name equals `name` selects
/// itself, so `Patient.name` works on a Patient.
fn navigate(input: &Collection, name: &str, at_root: bool) -> Collection {
    let mut out = Collection::new();
    for item in input.iter() {
        if let FhirPathValue::Element(element) = item {
            if at_root && element.type_name() == Some(name) {
                out.push(item.clone());
            } else {
                out.extend(element.child(name));
            }
        }
    }
    out
}

fn index_collection(items: &Collection, index: &Collection) -> EvaluationResult<Collection> {
    let Some(value) = index.singleton_value("indexer")? else {
        return Ok(Collection::empty());
    };
    let position = value.as_integer().ok_or_else(|| {
        EvaluationError::type_mismatch(format!(
            "index must be an Integer, got {}",
            value.type_name()
        ))
    })?;
    Ok(usize::try_from(position)
        .ok()
        .and_then(|i| items.get(i))
        .cloned()
        .map(Collection::singleton)
        .unwrap_or_default())
}

fn unary(op: UnaryOperator, operand: &Collection) -> EvaluationResult<Collection> {
    let Some(value) = operand.singleton_value(&format!("unary '{op}'"))? else {
        return Ok(Collection::empty());
    };
    let result = match (op, value) {
        (UnaryOperator::Plus, FhirPathValue::Integer(_))
        | (UnaryOperator::Plus, FhirPathValue::Long(_))
        | (UnaryOperator::Plus, FhirPathValue::Decimal(_))
        | (UnaryOperator::Plus, FhirPathValue::Quantity(_)) => Some(value.clone()),
        (UnaryOperator::Minus, FhirPathValue::Integer(i)) => {
            let (negated, ok) = overflow::sub(0, *i);
            ok.then_some(FhirPathValue::Integer(negated))
        }
        (UnaryOperator::Minus, FhirPathValue::Long(l)) => {
            let (negated, ok) = overflow::sub(0, *l);
            ok.then_some(FhirPathValue::Long(negated))
        }
        (UnaryOperator::Minus, FhirPathValue::Decimal(d)) => Some(FhirPathValue::Decimal(-*d)),
        (UnaryOperator::Minus, FhirPathValue::Quantity(q)) => Some(FhirPathValue::Quantity(
            Quantity::new(-q.value, q.unit.clone()),
        )),
        _ => {
            return Err(EvaluationError::type_mismatch(format!(
                "unary '{op}' cannot be applied to {}",
                value.type_name()
            )));
        }
    };
    Ok(result.map(Collection::singleton).unwrap_or_default())
}

/// Result of `and`/`or`/`implies` when the left operand decides it
fn short_circuit(op: BinaryOperator, left: &Collection) -> EvaluationResult<Option<Collection>> {
    let decided = match op {
        BinaryOperator::And => Some(false),
        BinaryOperator::Or => Some(true),
        BinaryOperator::Implies => Some(false),
        _ => None,
    };
    let Some(decisive) = decided else {
        return Ok(None);
    };
    let left = operators::to_boolean(left, op.as_str())?;
    Ok(match (op, left) {
        (BinaryOperator::Implies, Some(false)) => Some(Collection::singleton(true)),
        (BinaryOperator::Implies, _) => None,
        (_, Some(value)) if value == decisive => Some(Collection::singleton(value)),
        _ => None,
    })
}

fn type_operation(
    op: BinaryOperator,
    left: &Collection,
    right: &ExpressionNode,
) -> EvaluationResult<Collection> {
    let spec = right.as_type_specifier().ok_or_else(|| {
        EvaluationError::type_mismatch(format!("'{right}' is not a type specifier"))
    })?;
    let Some(value) = left.singleton_value(&format!("operator '{op}'"))? else {
        return Ok(Collection::empty());
    };
    let matches = spec.matches(value);
    Ok(match op {
        BinaryOperator::Is => Collection::singleton(matches),
        _ if matches => Collection::singleton(value.clone()),
        _ => Collection::empty(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvaluationConfig;
    use crate::core::EvalErrorKind;
    use crate::parser::parse;
    use serde_json::json;

    fn eval(expr: &str) -> EvaluationResult<Collection> {
        let ast = parse(expr).unwrap();
        evaluate(&ast, &Collection::empty(), &Environment::new())
    }

    fn eval_on(expr: &str, resource: serde_json::Value) -> EvaluationResult<Collection> {
        let ast = parse(expr).unwrap();
        let env = Environment::new().with_json_resource(&resource);
        let input = env.context().cloned().unwrap_or_default();
        evaluate(&ast, &input, &env)
    }

    #[test]
    fn test_literal_and_arithmetic() {
        assert_eq!(eval("1 + 2 * 3").unwrap(), Collection::singleton(7));
        assert_eq!(eval("-2147483648").unwrap(), Collection::singleton(i32::MIN));
        assert!(eval("-(-2147483647 - 1)").unwrap().is_empty());
    }

    #[test]
    fn test_navigation_with_type_root() {
        let patient = json!({
            "resourceType": "Patient",
            "name": [{"given": ["Ann", "Bo"]}, {"given": ["Cy"]}]
        });
        let result = eval_on("Patient.name.given", patient.clone()).unwrap();
        assert_eq!(
            result,
            Collection::from_vec(vec!["Ann".into(), "Bo".into(), "Cy".into()])
        );
        let result = eval_on("name.given[1]", patient).unwrap();
        assert_eq!(result, Collection::singleton("Bo"));
    }

    #[test]
    fn test_short_circuit_skips_errors() {
        assert_eq!(eval("false and ((1 | 2) + 1 > 0)").unwrap(), Collection::singleton(false));
        assert_eq!(eval("true or %missing").unwrap(), Collection::singleton(true));
        assert_eq!(eval("false implies %missing").unwrap(), Collection::singleton(true));
    }

    #[test]
    fn test_unknown_constant() {
        let err = eval("%nope").unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::UnknownIdentifier);
    }

    #[test]
    fn test_total_outside_aggregate() {
        let err = eval("$total").unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::UnknownIdentifier);
    }

    #[test]
    fn test_budget() {
        let ast = parse("(1 | 2 | 3).select($this + 1).where($this > 2)").unwrap();
        let env = Environment::new().with_config(EvaluationConfig::new().with_max_steps(Some(5)));
        let err = evaluate(&ast, &Collection::empty(), &env).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::Budget);
    }

    #[test]
    fn test_depth_limit() {
        let ast = parse("((((((1))))))").unwrap();
        let env = Environment::new().with_config(EvaluationConfig::new().with_max_depth(2));
        // parentheses do not add nodes, so a flat literal fits
        assert!(evaluate(&ast, &Collection::empty(), &env).is_ok());
        let ast = parse("1 + (2 + (3 + 4))").unwrap();
        let err = evaluate(&ast, &Collection::empty(), &env).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::Budget);
    }

    #[test]
    fn test_is_and_as() {
        assert_eq!(eval("1 is Integer").unwrap(), Collection::singleton(true));
        assert_eq!(eval("1 is System.String").unwrap(), Collection::singleton(false));
        assert_eq!(eval("'a' as String").unwrap(), Collection::singleton("a"));
        assert!(eval("'a' as Integer").unwrap().is_empty());
    }

    #[test]
    fn test_non_singleton_operand() {
        let err = eval("(1 | 2) + 1").unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::NonSingleton);
    }
}
