//! Type specifiers used by `is`, `as` and `ofType`

use std::fmt;

use super::temporal::{PrecisionDate, PrecisionDateTime, PrecisionTime};
use super::value::FhirPathValue;

/// A possibly qualified type name such as `System.Integer` or `Patient`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeSpecifier {
    /// Namespace qualifier (`System`, `FHIR`), if written
    pub namespace: Option<String>,
    /// Type name
    pub name: String,
}

impl TypeSpecifier {
    /// Create a type specifier
    pub fn new(namespace: Option<String>, name: impl Into<String>) -> Self {
        Self {
            namespace,
            name: name.into(),
        }
    }

    /// Parse a dotted name (`System.String`, `Quantity`)
    pub fn parse(qualified: &str) -> Self {
        match qualified.split_once('.') {
            Some((ns, name)) => Self::new(Some(ns.to_string()), name),
            None => Self::new(None, qualified),
        }
    }

    /// Whether `value` is an instance of this type
    pub fn matches(&self, value: &FhirPathValue) -> bool {
        if self.name == "Any" {
            return true;
        }
        match self.namespace.as_deref() {
            Some("System") => system_type_matches(&self.name, value),
            Some("FHIR") => fhir_type_matches(&self.name, value),
            _ => system_type_matches(&self.name, value) || fhir_type_matches(&self.name, value),
        }
    }
}

impl fmt::Display for TypeSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

fn system_type_matches(name: &str, value: &FhirPathValue) -> bool {
    match (name, value) {
        ("Boolean", FhirPathValue::Boolean(_))
        | ("Integer", FhirPathValue::Integer(_))
        | ("Long", FhirPathValue::Long(_))
        | ("Decimal", FhirPathValue::Decimal(_))
        | ("String", FhirPathValue::String(_))
        | ("Date", FhirPathValue::Date(_))
        | ("DateTime", FhirPathValue::DateTime(_))
        | ("Time", FhirPathValue::Time(_))
        | ("Quantity", FhirPathValue::Quantity(_)) => true,
        _ => false,
    }
}

fn fhir_type_matches(name: &str, value: &FhirPathValue) -> bool {
    match value {
        FhirPathValue::Element(element) => match name {
            "Resource" | "DomainResource" => element.is_resource(),
            "Element" => true,
            _ => element.type_name() == Some(name),
        },
        FhirPathValue::Boolean(_) => name == "boolean",
        FhirPathValue::Integer(_) => {
            matches!(name, "integer" | "positiveInt" | "unsignedInt")
        }
        FhirPathValue::Long(_) => name == "integer64",
        FhirPathValue::Decimal(_) => name == "decimal",
        FhirPathValue::String(s) => match name {
            "string" | "code" | "id" | "uri" | "url" | "canonical" | "markdown" | "oid"
            | "uuid" | "base64Binary" | "xhtml" => true,
            "date" => PrecisionDate::parse(s).is_some(),
            "dateTime" | "instant" => PrecisionDateTime::parse(s).is_some(),
            "time" => PrecisionTime::parse(s).is_some(),
            _ => false,
        },
        FhirPathValue::Date(_) => name == "date",
        FhirPathValue::DateTime(_) => matches!(name, "dateTime" | "instant"),
        FhirPathValue::Time(_) => name == "time",
        FhirPathValue::Quantity(_) => name == "Quantity",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_and_fhir_names() {
        let v = FhirPathValue::string("abc");
        assert!(TypeSpecifier::parse("String").matches(&v));
        assert!(TypeSpecifier::parse("System.String").matches(&v));
        assert!(TypeSpecifier::parse("FHIR.string").matches(&v));
        assert!(!TypeSpecifier::parse("System.Integer").matches(&v));
        assert!(!TypeSpecifier::parse("FHIR.String").matches(&v));
    }

    #[test]
    fn test_integer_is_not_long() {
        let v = FhirPathValue::Integer(1);
        assert!(TypeSpecifier::parse("Integer").matches(&v));
        assert!(!TypeSpecifier::parse("Long").matches(&v));
    }
}
