//! Lambda scope and the context handed to functions

use chrono::{DateTime, FixedOffset};
use smallvec::SmallVec;

use super::engine::Evaluator;
use super::environment::Environment;
use crate::ast::ExpressionNode;
use crate::core::{EvaluationError, EvaluationResult};
use crate::model::{Collection, FhirPathValue, TypeSpecifier};
use crate::registry::FunctionSignature;

/// Bindings of `$this`, `$index` and `$total`
///
/// The root scope binds `$this` to the evaluation input. Each element-wise
/// iteration pushes a new scope that inherits `$total` from its parent.
#[derive(Debug, Clone)]
pub struct Scope {
    /// `$this`; also the focus for value arguments
    pub this: Collection,
    /// `$index` inside an element-wise iteration
    pub index: Option<usize>,
    /// `$total` inside `aggregate`
    pub total: Option<Collection>,
}

impl Scope {
    /// Root scope for an evaluation input
    pub fn root(input: Collection) -> Self {
        Self {
            this: input,
            index: None,
            total: None,
        }
    }

    fn for_item(&self, item: &FhirPathValue, index: usize) -> Self {
        Self {
            this: Collection::singleton(item.clone()),
            index: Some(index),
            total: self.total.clone(),
        }
    }
}

/// What a function sees during a call
///
/// Value arguments arrive already evaluated against the enclosing focus;
/// expression arguments are evaluated on demand through the methods below.
pub struct FunctionContext<'a, 'env> {
    evaluator: &'a mut Evaluator<'env>,
    signature: &'a FunctionSignature,
    input: &'a Collection,
    args: &'a [ExpressionNode],
    values: SmallVec<[Option<Collection>; 4]>,
    scope: &'a Scope,
}

impl<'a, 'env> FunctionContext<'a, 'env> {
    pub(crate) fn new(
        evaluator: &'a mut Evaluator<'env>,
        signature: &'a FunctionSignature,
        input: &'a Collection,
        args: &'a [ExpressionNode],
        values: SmallVec<[Option<Collection>; 4]>,
        scope: &'a Scope,
    ) -> Self {
        Self {
            evaluator,
            signature,
            input,
            args,
            values,
            scope,
        }
    }

    /// Name of the called function
    pub fn name(&self) -> &str {
        &self.signature.name
    }

    /// Input collection of the call
    pub fn input(&self) -> &'a Collection {
        self.input
    }

    /// Number of arguments written at the call site
    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Evaluation environment
    pub fn environment(&self) -> &'env Environment {
        self.evaluator.environment()
    }

    /// Current time, fixed for the whole evaluation
    pub fn now(&self) -> DateTime<FixedOffset> {
        self.evaluator.now()
    }

    /// Enclosing lambda scope
    pub fn scope(&self) -> &Scope {
        self.scope
    }

    /// Evaluated value argument at `index`, `None` if it was not supplied
    pub fn arg(&self, index: usize) -> Option<&Collection> {
        self.values.get(index).and_then(Option::as_ref)
    }

    /// Unevaluated argument at `index`
    pub fn expression(&self, index: usize) -> Option<&'a ExpressionNode> {
        self.args.get(index)
    }

    fn required_expression(&self, index: usize) -> EvaluationResult<&'a ExpressionNode> {
        self.args.get(index).ok_or_else(|| {
            EvaluationError::wrong_arity(
                self.name(),
                self.signature.min_arity,
                self.signature.max_arity,
                self.args.len(),
            )
        })
    }

    /// Evaluate argument `index` with `$this` bound to `item`
    pub fn evaluate_for_item(
        &mut self,
        index: usize,
        item: &FhirPathValue,
        position: usize,
    ) -> EvaluationResult<Collection> {
        let node = self.required_expression(index)?;
        let scope = self.scope.for_item(item, position);
        let focus = scope.this.clone();
        self.evaluator.eval(node, &focus, &scope)
    }

    /// Evaluate argument `index` for `item` with `$total` bound
    pub fn evaluate_with_total(
        &mut self,
        index: usize,
        item: &FhirPathValue,
        position: usize,
        total: &Collection,
    ) -> EvaluationResult<Collection> {
        let node = self.required_expression(index)?;
        let mut scope = self.scope.for_item(item, position);
        scope.total = Some(total.clone());
        let focus = scope.this.clone();
        self.evaluator.eval(node, &focus, &scope)
    }

    /// Evaluate argument `index` with `focus` as both focus and `$this`
    pub fn evaluate_with_focus(
        &mut self,
        index: usize,
        focus: &Collection,
    ) -> EvaluationResult<Collection> {
        let node = self.required_expression(index)?;
        let scope = Scope {
            this: focus.clone(),
            index: self.scope.index,
            total: self.scope.total.clone(),
        };
        self.evaluator.eval(node, focus, &scope)
    }

    /// Argument `index` read as a type specifier
    pub fn type_arg(&self, index: usize) -> EvaluationResult<TypeSpecifier> {
        let node = self.required_expression(index)?;
        node.as_type_specifier().ok_or_else(|| {
            EvaluationError::type_mismatch(format!(
                "function '{}' expects a type name, got '{node}'",
                self.name()
            ))
        })
    }

    /// Charge one step of the evaluation budget
    pub fn tick(&mut self) -> EvaluationResult<()> {
        self.evaluator.tick()
    }

    /// The single input item; empty input gives `None`
    pub fn input_singleton(&self) -> EvaluationResult<Option<&'a FhirPathValue>> {
        self.input
            .singleton_value(&format!("function '{}'", self.name()))
    }

    /// Single item of value argument `index`
    pub fn arg_singleton(&self, index: usize) -> EvaluationResult<Option<&FhirPathValue>> {
        match self.arg(index) {
            Some(values) => values.singleton_value(&format!(
                "argument {} of function '{}'",
                index + 1,
                self.name()
            )),
            None => Ok(None),
        }
    }

    /// Value argument `index` as a String
    pub fn string_arg(&self, index: usize) -> EvaluationResult<Option<String>> {
        match self.arg_singleton(index)? {
            None => Ok(None),
            Some(FhirPathValue::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(self.argument_mismatch(index, "String", other)),
        }
    }

    /// Value argument `index` as an Integer or Long
    pub fn integer_arg(&self, index: usize) -> EvaluationResult<Option<i64>> {
        match self.arg_singleton(index)? {
            None => Ok(None),
            Some(value) => value
                .as_integer()
                .map(Some)
                .ok_or_else(|| self.argument_mismatch(index, "Integer", value)),
        }
    }

    /// Value argument `index` as a Boolean
    pub fn boolean_arg(&self, index: usize) -> EvaluationResult<Option<bool>> {
        match self.arg_singleton(index)? {
            None => Ok(None),
            Some(value) => value
                .as_boolean()
                .map(Some)
                .ok_or_else(|| self.argument_mismatch(index, "Boolean", value)),
        }
    }

    /// Type error for an argument
    pub fn argument_mismatch(
        &self,
        index: usize,
        expected: &str,
        actual: &FhirPathValue,
    ) -> EvaluationError {
        EvaluationError::type_mismatch(format!(
            "argument {} of function '{}' must be {expected}, got {}",
            index + 1,
            self.name(),
            actual.type_name()
        ))
    }

    /// Type error for the input
    pub fn input_mismatch(&self, expected: &str, actual: &FhirPathValue) -> EvaluationError {
        EvaluationError::type_mismatch(format!(
            "function '{}' expects {expected} input, got {}",
            self.name(),
            actual.type_name()
        ))
    }
}
