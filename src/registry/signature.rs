//! Function signatures used for arity checking and argument evaluation

use serde::{Deserialize, Serialize};
use std::fmt;

/// How an argument reaches the function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterKind {
    /// Evaluated once against the enclosing focus before the call
    Value,
    /// Left unevaluated; the function evaluates it per input item
    Expression,
    /// A type specifier such as `Patient` or `System.String`
    Type,
}

/// Parameter information for functions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParameterInfo {
    /// Parameter name
    pub name: String,
    /// Evaluation mode
    pub kind: ParameterKind,
    /// Whether this parameter is optional
    pub optional: bool,
}

impl ParameterInfo {
    /// Create a required parameter
    pub fn required(name: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            name: name.into(),
            kind,
            optional: false,
        }
    }

    /// Create an optional parameter
    pub fn optional(name: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            name: name.into(),
            kind,
            optional: true,
        }
    }

    /// Required value parameter
    pub fn value(name: impl Into<String>) -> Self {
        Self::required(name, ParameterKind::Value)
    }

    /// Required expression parameter
    pub fn expression(name: impl Into<String>) -> Self {
        Self::required(name, ParameterKind::Expression)
    }

    /// Required type parameter
    pub fn type_name(name: impl Into<String>) -> Self {
        Self::required(name, ParameterKind::Type)
    }
}

/// Function signature
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionSignature {
    /// Function name
    pub name: String,
    /// Parameters in call order
    pub parameters: Vec<ParameterInfo>,
    /// Minimum number of arguments
    pub min_arity: usize,
    /// Maximum number of arguments (None for variadic)
    pub max_arity: Option<usize>,
}

impl FunctionSignature {
    /// Create a new function signature
    pub fn new(name: impl Into<String>, parameters: Vec<ParameterInfo>) -> Self {
        let min_arity = parameters.iter().filter(|p| !p.optional).count();
        let max_arity = Some(parameters.len());
        Self {
            name: name.into(),
            parameters,
            min_arity,
            max_arity,
        }
    }

    /// Signature of a function taking no arguments
    pub fn nullary(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    /// Create a variadic function signature; extra arguments are values
    pub fn variadic(name: impl Into<String>, parameters: Vec<ParameterInfo>) -> Self {
        let min_arity = parameters.iter().filter(|p| !p.optional).count();
        Self {
            name: name.into(),
            parameters,
            min_arity,
            max_arity: None,
        }
    }

    /// Whether `count` arguments are acceptable
    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_arity && self.max_arity.is_none_or(|max| count <= max)
    }

    /// Evaluation mode of the argument at `index`
    pub fn parameter_kind(&self, index: usize) -> ParameterKind {
        self.parameters
            .get(index)
            .map(|p| p.kind)
            .unwrap_or(ParameterKind::Value)
    }
}

impl fmt::Display for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, param) in self.parameters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param.name)?;
            if param.optional {
                write!(f, "?")?;
            }
        }
        if self.max_arity.is_none() {
            write!(f, "...")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity_from_parameters() {
        let sig = FunctionSignature::new(
            "substring",
            vec![
                ParameterInfo::value("start"),
                ParameterInfo::optional("length", ParameterKind::Value),
            ],
        );
        assert_eq!(sig.min_arity, 1);
        assert_eq!(sig.max_arity, Some(2));
        assert!(sig.accepts(1));
        assert!(sig.accepts(2));
        assert!(!sig.accepts(3));
        assert_eq!(sig.to_string(), "substring(start, length?)");
    }

    #[test]
    fn test_variadic() {
        let sig = FunctionSignature::variadic("coalesce", vec![ParameterInfo::value("first")]);
        assert!(sig.accepts(7));
        assert!(!sig.accepts(0));
        assert_eq!(sig.parameter_kind(5), ParameterKind::Value);
    }
}
