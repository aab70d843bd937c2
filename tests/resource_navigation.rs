//! Evaluation against FHIR resources: navigation, the function library,
//! environment variables, user functions and evaluation limits

mod utils;

use std::sync::Arc;

use fhirpath_engine::{
    Collection, EvalErrorKind, EvaluationConfig, Environment, FhirPathValue, FunctionRegistry,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::{Value, json};
use utils::{eval_on, eval_with, json_of, observation, patient, questionnaire};

#[rstest]
#[case("Patient.id", json!(["example"]))]
#[case("id", json!(["example"]))]
#[case("Patient.name.given", json!(["Peter", "James", "Jim", "Peter", "James"]))]
#[case("Patient.name.where(use = 'official').family", json!(["Chalmers"]))]
#[case("Patient.name[1].given", json!(["Jim"]))]
#[case("Patient.name.given.distinct()", json!(["Peter", "James", "Jim"]))]
#[case("Patient.name.select(given.first())", json!(["Peter", "Jim", "Peter"]))]
#[case("Patient.name.given.where($index > 2)", json!(["Peter", "James"]))]
#[case("Patient.telecom.where(system = 'phone').value.first()", json!(["(03) 5555 6473"]))]
#[case("Patient.telecom.rank.aggregate($total + $this, 0)", json!([3]))]
#[case("Patient.deceased", json!([false]))]
#[case("Patient.contact.name.given", json!(["Bénédicte"]))]
#[case("Patient.iif(active, 'yes', 'no')", json!(["yes"]))]
#[case("Patient.name.family.join(', ')", json!(["Chalmers, Windsor"]))]
#[case("Observation.status", json!([]))]
#[case("Patient.unknownElement", json!([]))]
fn test_patient_paths(#[case] expr: &str, #[case] expected: Value) {
    assert_eq!(json_of(expr, &patient()), expected, "{expr}");
}

#[rstest]
#[case("Patient.name.exists(family = 'Windsor')", true)]
#[case("Patient.name.all(given.exists())", true)]
#[case("Patient.name.all(family.exists())", false)]
#[case("Patient.telecom.where(use = 'home').value.empty()", true)]
#[case("Patient.birthDate < @2000-01-01", true)]
#[case("Patient.birthDate = @1974-12-25", true)]
#[case("Patient.active.not()", false)]
#[case("Patient.gender ~ 'MALE'", true)]
#[case("Patient.name.given.isDistinct()", false)]
#[case("Patient.name.given.subsetOf(%resource.name.given)", true)]
#[case("Patient.is(Patient)", true)]
#[case("Patient.gender.hasValue()", true)]
#[case("Patient.name.period.end.exists()", true)]
fn test_patient_predicates(#[case] expr: &str, #[case] expected: bool) {
    assert_eq!(json_of(expr, &patient()), json!([expected]), "{expr}");
}

#[rstest]
#[case("Observation.value.value > 100", true)]
#[case("Observation.value > 100 'mm[Hg]'", true)]
#[case("Observation.value is Quantity", true)]
#[case("Observation.component.value.ofType(Quantity).count() = 2", true)]
#[case("Observation.effective > @2024-01-01T00:00:00Z", true)]
#[case("Observation.code.coding.where(system = %loinc).code = '8480-6'", true)]
#[case("Observation.component.where(code.coding.code = '8867-4').value.value = 72", true)]
#[case("Observation.descendants().where($this = '8462-4').exists()", true)]
fn test_observation_predicates(#[case] expr: &str, #[case] expected: bool) {
    assert_eq!(json_of(expr, &observation()), json!([expected]), "{expr}");
}

#[test]
fn test_repeat_walks_nested_items() {
    assert_eq!(
        json_of("Questionnaire.repeat(item).linkId", &questionnaire()),
        json!(["1", "2", "1.1", "1.2", "1.2.1"])
    );
    assert_eq!(
        json_of("Questionnaire.item.linkId", &questionnaire()),
        json!(["1", "2"])
    );
}

#[test]
fn test_environment_variables() {
    let env = Environment::new()
        .with_json_resource(&patient())
        .with_variable("threshold", Collection::singleton(2))
        .with_variable("us-zip", Collection::singleton("90210"));

    let result = eval_with("Patient.name.count() > %threshold", env.clone()).unwrap();
    assert_eq!(result, Collection::singleton(true));

    let result = eval_with("%`us-zip`.length()", env.clone()).unwrap();
    assert_eq!(result, Collection::singleton(5));

    let result = eval_with("%context.id = %rootResource.id", env.clone()).unwrap();
    assert_eq!(result, Collection::singleton(true));

    assert_eq!(
        eval_with("%ucum", env.clone()).unwrap(),
        Collection::singleton("http://unitsofmeasure.org")
    );
    let err = eval_with("%undefined", env).unwrap_err();
    assert_eq!(err.kind, EvalErrorKind::UnknownIdentifier);
}

#[test]
fn test_user_variable_shadows_builtin() {
    let env = Environment::new()
        .with_json_resource(&patient())
        .with_variable("ucum", Collection::singleton("local"));
    assert_eq!(eval_with("%ucum", env).unwrap(), Collection::singleton("local"));
}

#[test]
fn test_user_supplied_function() {
    let mut registry = FunctionRegistry::with_builtins();
    registry.register_fn("double", 0, Some(0), |ctx| {
        let Some(value) = ctx.input_singleton()? else {
            return Ok(Collection::empty());
        };
        match value {
            FhirPathValue::Integer(i) => Ok(i
                .checked_mul(2)
                .map(Collection::singleton)
                .unwrap_or_default()),
            other => Err(ctx.input_mismatch("Integer", other)),
        }
    });
    registry.register_fn("greet", 1, Some(1), |ctx| {
        let name = ctx.string_arg(0)?.unwrap_or_default();
        Ok(Collection::singleton(format!("hello {name}")))
    });

    let env = Environment::new()
        .with_json_resource(&patient())
        .with_functions(Arc::new(registry));

    assert_eq!(
        eval_with("Patient.telecom.rank.last().double()", env.clone()).unwrap(),
        Collection::singleton(4)
    );
    assert_eq!(
        eval_with("Patient.greet(name.first().family)", env.clone()).unwrap(),
        Collection::singleton("hello Chalmers")
    );
    assert_eq!(
        eval_with("1.greet()", env.clone()).unwrap_err().kind,
        EvalErrorKind::WrongArity
    );
    assert_eq!(
        eval_with("'x'.double()", env).unwrap_err().kind,
        EvalErrorKind::TypeMismatch
    );
}

#[test]
fn test_step_budget() {
    let config = EvaluationConfig::default().with_max_steps(Some(10));
    let env = Environment::new()
        .with_json_resource(&questionnaire())
        .with_config(config);
    let err = eval_with("Questionnaire.descendants().count()", env).unwrap_err();
    assert_eq!(err.kind, EvalErrorKind::Budget);

    let unbounded = Environment::new()
        .with_json_resource(&questionnaire())
        .with_config(EvaluationConfig::default().with_max_steps(None));
    assert!(eval_with("Questionnaire.descendants().count()", unbounded).is_ok());
}

#[test]
fn test_depth_limit() {
    let config = EvaluationConfig::default().with_max_depth(3);
    let env = Environment::new().with_config(config);
    let err = eval_with("1 + (2 + (3 + (4 + 5)))", env).unwrap_err();
    assert_eq!(err.kind, EvalErrorKind::Budget);
}

#[test]
fn test_same_input_same_output() {
    let resource = observation();
    let expr = "Observation.component.code.coding.code | Observation.code.coding.code";
    let first = eval_on(expr, &resource).unwrap();
    let second = eval_on(expr, &resource).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
}
