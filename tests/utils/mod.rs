//! Shared fixtures and evaluation helpers for the integration tests

#![allow(dead_code)]

use fhirpath_engine::{Collection, EvaluationResult, Environment, evaluate, parse};
use serde_json::{Value, json};

/// Evaluate `expr` with no input
pub fn eval(expr: &str) -> EvaluationResult<Collection> {
    let ast = parse(expr).unwrap_or_else(|e| panic!("'{expr}' failed to parse: {e}"));
    evaluate(&ast, &Collection::empty(), &Environment::new())
}

/// Evaluate `expr` against a JSON resource
pub fn eval_on(expr: &str, resource: &Value) -> EvaluationResult<Collection> {
    eval_with(expr, Environment::new().with_json_resource(resource))
}

/// Evaluate `expr` with a prepared environment; input is `%context`
pub fn eval_with(expr: &str, env: Environment) -> EvaluationResult<Collection> {
    let ast = parse(expr).unwrap_or_else(|e| panic!("'{expr}' failed to parse: {e}"));
    let input = env.context().cloned().unwrap_or_default();
    evaluate(&ast, &input, &env)
}

/// Result rendered as JSON, for compact assertions
pub fn json_of(expr: &str, resource: &Value) -> Value {
    eval_on(expr, resource)
        .unwrap_or_else(|e| panic!("'{expr}' failed: {e}"))
        .to_json()
}

pub fn patient() -> Value {
    json!({
        "resourceType": "Patient",
        "id": "example",
        "active": true,
        "gender": "male",
        "birthDate": "1974-12-25",
        "deceasedBoolean": false,
        "name": [
            {"use": "official", "family": "Chalmers", "given": ["Peter", "James"]},
            {"use": "usual", "given": ["Jim"]},
            {"use": "maiden", "family": "Windsor", "given": ["Peter", "James"],
             "period": {"end": "2002"}}
        ],
        "telecom": [
            {"use": "home"},
            {"system": "phone", "value": "(03) 5555 6473", "use": "work", "rank": 1},
            {"system": "phone", "value": "(03) 3410 5613", "use": "mobile", "rank": 2},
            {"system": "email", "value": "p.chalmers@example.org"}
        ],
        "contact": [
            {"relationship": [{"coding": [{"system": "http://terminology.hl7.org/CodeSystem/v2-0131", "code": "N"}]}],
             "name": {"family": "du Marché", "given": ["Bénédicte"]}}
        ]
    })
}

pub fn observation() -> Value {
    json!({
        "resourceType": "Observation",
        "id": "bp",
        "status": "final",
        "code": {"coding": [{"system": "http://loinc.org", "code": "8480-6", "display": "Systolic"}]},
        "effectiveDateTime": "2024-03-05T09:30:00+01:00",
        "valueQuantity": {"value": 142, "unit": "mm[Hg]", "system": "http://unitsofmeasure.org", "code": "mm[Hg]"},
        "component": [
            {"code": {"coding": [{"code": "8462-4"}]}, "valueQuantity": {"value": 88, "unit": "mm[Hg]"}},
            {"code": {"coding": [{"code": "8867-4"}]}, "valueQuantity": {"value": 72, "unit": "/min"}}
        ]
    })
}

pub fn questionnaire() -> Value {
    json!({
        "resourceType": "Questionnaire",
        "item": [
            {"linkId": "1", "item": [{"linkId": "1.1"}, {"linkId": "1.2", "item": [{"linkId": "1.2.1"}]}]},
            {"linkId": "2"}
        ]
    })
}
