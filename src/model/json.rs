//! `serde_json`-backed resource tree

use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;

use super::provider::{Element, ElementNode};
use super::value::{Collection, FhirPathValue};

/// JSON object node of a FHIR resource
///
/// Objects become [`Element`]s, JSON primitives map onto FHIRPath system
/// values, arrays flatten into the surrounding collection.
#[derive(Debug, Clone)]
pub struct JsonElement {
    value: Arc<Value>,
    type_name: Option<String>,
}

impl JsonElement {
    /// Wrap a JSON value; the type name is taken from `resourceType` if present
    pub fn new(value: Value) -> Self {
        let type_name = value
            .get("resourceType")
            .and_then(Value::as_str)
            .map(str::to_string);
        Self {
            value: Arc::new(value),
            type_name,
        }
    }

    /// Wrap a JSON value with an explicit model type
    pub fn with_type(value: Value, type_name: impl Into<String>) -> Self {
        Self {
            value: Arc::new(value),
            type_name: Some(type_name.into()),
        }
    }

    /// Underlying JSON
    pub fn json(&self) -> &Value {
        &self.value
    }
}

/// Convert a JSON value into FHIRPath values, flattening arrays.
///
/// `type_hint` names the model type of object values (e.g. from a choice
/// element suffix such as `valueQuantity`).
pub fn json_to_collection(value: &Value, type_hint: Option<&str>) -> Collection {
    let mut out = Collection::new();
    push_json(&mut out, value, type_hint);
    out
}

fn push_json(out: &mut Collection, value: &Value, type_hint: Option<&str>) {
    match value {
        Value::Null => {}
        Value::Array(items) => {
            for item in items {
                push_json(out, item, type_hint);
            }
        }
        other => {
            if let Some(v) = json_to_value(other, type_hint) {
                out.push(v);
            }
        }
    }
}

/// Convert a single non-array JSON value
pub fn json_to_value(value: &Value, type_hint: Option<&str>) -> Option<FhirPathValue> {
    match value {
        Value::Null | Value::Array(_) => None,
        Value::Bool(b) => Some(FhirPathValue::Boolean(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(match i32::try_from(i) {
                    Ok(small) => FhirPathValue::Integer(small),
                    Err(_) => FhirPathValue::Long(i),
                })
            } else {
                let text = n.to_string();
                Decimal::from_str(&text)
                    .or_else(|_| Decimal::from_scientific(&text))
                    .ok()
                    .map(FhirPathValue::Decimal)
            }
        }
        Value::String(s) => Some(FhirPathValue::String(s.clone())),
        Value::Object(_) => {
            let node = match type_hint {
                Some(t) if value.get("resourceType").is_none() => {
                    JsonElement::with_type(value.clone(), t)
                }
                _ => JsonElement::new(value.clone()),
            };
            Some(FhirPathValue::Element(Element::new(node)))
        }
    }
}

impl ElementNode for JsonElement {
    fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    fn is_resource(&self) -> bool {
        self.value.get("resourceType").is_some()
    }

    fn child(&self, name: &str) -> Collection {
        let Some(object) = self.value.as_object() else {
            return Collection::new();
        };
        if let Some(v) = object.get(name) {
            return json_to_collection(v, None);
        }
        // choice elements: `value` matches `valueQuantity`, `valueString`, ...
        for (key, v) in object {
            if let Some(suffix) = key.strip_prefix(name) {
                if suffix.starts_with(|c: char| c.is_ascii_uppercase()) {
                    return json_to_collection(v, Some(suffix));
                }
            }
        }
        Collection::new()
    }

    fn children(&self) -> Collection {
        let Some(object) = self.value.as_object() else {
            return Collection::new();
        };
        let mut out = Collection::new();
        for (key, v) in object {
            if key == "resourceType" || key.starts_with('_') {
                continue;
            }
            out.extend(json_to_collection(v, None));
        }
        out
    }

    fn to_json(&self) -> Value {
        self.value.as_ref().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_child_projection_flattens_arrays() {
        let patient = JsonElement::new(json!({
            "resourceType": "Patient",
            "name": [{"given": ["Jim", "James"]}, {"given": ["Peter"]}]
        }));
        assert_eq!(patient.type_name(), Some("Patient"));
        let names = patient.child("name");
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn test_choice_element_carries_type() {
        let obs = JsonElement::new(json!({
            "resourceType": "Observation",
            "valueQuantity": {"value": 185, "unit": "lbs"}
        }));
        let value = obs.child("value");
        assert_eq!(value.len(), 1);
        assert_eq!(value.first().map(FhirPathValue::type_name), Some("Quantity"));
    }

    #[test]
    fn test_number_mapping() {
        assert_eq!(json_to_value(&json!(5), None), Some(FhirPathValue::Integer(5)));
        assert_eq!(
            json_to_value(&json!(5_000_000_000i64), None),
            Some(FhirPathValue::Long(5_000_000_000))
        );
        assert_eq!(
            json_to_value(&json!(1.25), None),
            Some(FhirPathValue::Decimal(Decimal::new(125, 2)))
        );
    }
}
