//! The engine facade and the capability registry used together, the way a
//! server routes a search and extracts its parameters from stored resources

mod utils;

use std::sync::Arc;

use fhirpath_engine::dispatch::DispatchResult;
use fhirpath_engine::{
    Capability, CapabilityKind, CapabilityRegistry, DispatchError, EvaluationConfig,
    FhirPathEngine, FhirPathError, SearchSpec,
};
use parking_lot::RwLock;
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::{Value, json};
use utils::{observation, patient};

type Store = Arc<RwLock<Vec<Value>>>;

fn store() -> Store {
    let mut second = patient();
    second["id"] = json!("second");
    second["gender"] = json!("female");
    second["name"] = json!([{"family": "Ng", "given": ["Mei"]}]);
    Arc::new(RwLock::new(vec![patient(), second, observation()]))
}

fn read_handler(
    store: Store,
    resource_type: &'static str,
) -> impl Fn(&str) -> DispatchResult<Option<Value>> + Send + Sync + 'static {
    move |id: &str| {
        Ok(store
            .read()
            .iter()
            .find(|r| r["resourceType"] == resource_type && r["id"] == id)
            .cloned())
    }
}

fn registry(store: &Store) -> CapabilityRegistry {
    let mut registry = CapabilityRegistry::new();
    registry.register_read("Patient", read_handler(Arc::clone(store), "Patient"));
    registry.register_read("Observation", read_handler(Arc::clone(store), "Observation"));

    let spec = SearchSpec::new()
        .with_parameter("gender", "Patient.gender")
        .and_then(|s| s.with_parameter("family", "Patient.name.family"))
        .and_then(|s| s.with_parameter("phone", "Patient.telecom.where(system = 'phone').value"))
        .unwrap();
    let patients = Arc::clone(store);
    registry.register_search("Patient", spec, move |spec, params| {
        let mut found = Vec::new();
        for resource in patients.read().iter() {
            if resource["resourceType"] != "Patient" {
                continue;
            }
            let mut matched = true;
            for (name, wanted) in params {
                let values = spec.extract(name, resource)?.unwrap_or_default();
                matched &= values.iter().any(|v| v.as_str() == Some(wanted.as_str()));
            }
            if matched {
                found.push(resource.clone());
            }
        }
        Ok(found)
    });
    registry
}

fn ids(resources: &[Value]) -> Vec<&str> {
    resources.iter().filter_map(|r| r["id"].as_str()).collect()
}

#[rstest]
#[case(&[("gender", "female")], &["second"])]
#[case(&[("family", "Windsor")], &["example"])]
#[case(&[("gender", "male"), ("family", "Ng")], &[])]
#[case(&[], &["example", "second"])]
fn test_search_routes_through_extraction(
    #[case] params: &[(&str, &str)],
    #[case] expected: &[&str],
) {
    let store = store();
    let registry = registry(&store);
    let params: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let found = registry.search("Patient", &params).unwrap();
    assert_eq!(ids(&found), expected);
}

#[test]
fn test_read_and_unsupported() {
    let store = store();
    let registry = registry(&store);
    let obs = registry.read("Observation", "bp").unwrap().unwrap();
    assert_eq!(obs["status"], "final");

    assert!(registry.supports("Observation", CapabilityKind::Read));
    assert!(!registry.supports("Observation", CapabilityKind::Search));
    assert!(matches!(
        registry.search("Observation", &[]),
        Err(DispatchError::Unsupported { capability: CapabilityKind::Search, .. })
    ));
}

#[test]
fn test_capability_listing() {
    let store = store();
    let registry = registry(&store);
    let listing = registry.capabilities();
    let kinds: Vec<(&str, CapabilityKind)> = listing
        .iter()
        .map(|(t, c)| (t.as_str(), c.kind()))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("Observation", CapabilityKind::Read),
            ("Patient", CapabilityKind::Read),
            ("Patient", CapabilityKind::Search),
        ]
    );
    let Some((_, Capability::Search(spec))) = listing.last() else {
        panic!("expected a search capability");
    };
    let names: Vec<&str> = spec.parameters().iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["gender", "family", "phone"]);
}

#[test]
fn test_extraction_errors_surface() {
    let spec = SearchSpec::new()
        .with_parameter("broken", "Patient.name.family.single()")
        .unwrap();
    let err = spec.extract("broken", &patient()).unwrap_err();
    assert!(matches!(err, DispatchError::Extraction { .. }));
}

#[test]
fn test_engine_caches_across_resources() {
    let engine = FhirPathEngine::new();
    let store = store();
    let expr = "Patient.name.given.first()";
    let firsts: Vec<Value> = store
        .read()
        .iter()
        .filter(|r| r["resourceType"] == "Patient")
        .map(|r| engine.evaluate(expr, r).unwrap().to_json())
        .collect();
    assert_eq!(firsts, vec![json!(["Peter"]), json!(["Mei"])]);
    assert_eq!(engine.cached_expressions(), 1);
}

#[test]
fn test_engine_config_is_applied() {
    let engine = FhirPathEngine::with_config(EvaluationConfig::default().with_max_steps(Some(5)));
    let err = engine
        .evaluate("Patient.name.given.select($this.length()).count()", &patient())
        .unwrap_err();
    assert!(matches!(err, FhirPathError::Evaluation(e) if e.kind == fhirpath_engine::EvalErrorKind::Budget));

    assert!(matches!(
        engine.evaluate("Patient.name.", &patient()),
        Err(FhirPathError::Parse(_))
    ));
}
