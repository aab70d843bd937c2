//! FHIRPath Performance Benchmarks
//!
//! Tokenizer, parser and evaluator throughput over expressions of growing
//! complexity, plus the parsed-expression cache of the engine.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use fhirpath_engine::evaluator::{Environment, evaluate};
use fhirpath_engine::parser::{Tokenizer, parse};
use fhirpath_engine::{EvaluationConfig, FhirPathEngine};
use serde_json::{Value, json};
use std::hint::black_box;

const TEST_EXPRESSIONS: &[(&str, &str)] = &[
    ("simple", "Patient.name"),
    ("medium", "Patient.name.where(use = 'official')"),
    (
        "complex",
        "Patient.name.where(use = 'official').given.first()",
    ),
    (
        "arithmetic",
        "(1 | 2 | 3 | 4 | 5).aggregate($this + $total, 0) * 2.5 > 30",
    ),
];

fn patient() -> Value {
    json!({
        "resourceType": "Patient",
        "id": "bench",
        "active": true,
        "birthDate": "1974-12-25",
        "name": [
            {"use": "official", "family": "Chalmers", "given": ["Peter", "James"]},
            {"use": "usual", "given": ["Jim"]},
            {"use": "maiden", "family": "Windsor", "given": ["Peter", "James"]}
        ],
        "telecom": [
            {"system": "phone", "value": "(03) 5555 6473", "use": "work"},
            {"system": "email", "value": "p.chalmers@example.org"}
        ]
    })
}

fn bench_tokenizer(c: &mut Criterion) {
    let mut group = c.benchmark_group("tokenizer");
    group.throughput(Throughput::Elements(1));

    for (complexity, expression) in TEST_EXPRESSIONS {
        group.bench_with_input(
            BenchmarkId::new("tokenize", complexity),
            expression,
            |b, expr| {
                b.iter(|| {
                    let mut tokenizer = Tokenizer::new(black_box(expr));
                    black_box(tokenizer.tokenize_all())
                })
            },
        );
    }

    group.finish();
}

fn bench_parser(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser");
    group.throughput(Throughput::Elements(1));

    for (complexity, expression) in TEST_EXPRESSIONS {
        group.bench_with_input(
            BenchmarkId::new("parse", complexity),
            expression,
            |b, expr| b.iter(|| black_box(parse(black_box(expr)))),
        );
    }

    group.finish();
}

fn bench_evaluator(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluator");
    group.throughput(Throughput::Elements(1));

    let env = Environment::new().with_json_resource(&patient());
    let input = env.context().cloned().unwrap_or_default();

    for (complexity, expression) in TEST_EXPRESSIONS {
        let Ok(ast) = parse(expression) else {
            continue;
        };
        group.bench_with_input(BenchmarkId::new("evaluate", complexity), &ast, |b, ast| {
            b.iter(|| black_box(evaluate(black_box(ast), &input, &env)))
        });
    }

    group.finish();
}

fn bench_engine_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");
    let resource = patient();
    let expression = "Patient.name.where(use = 'official').given.first()";

    let cached = FhirPathEngine::new();
    group.bench_function("cached", |b| {
        b.iter(|| black_box(cached.evaluate(black_box(expression), &resource)))
    });

    let uncached = FhirPathEngine::with_config(EvaluationConfig::default().with_cache_capacity(0));
    group.bench_function("uncached", |b| {
        b.iter(|| black_box(uncached.evaluate(black_box(expression), &resource)))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_tokenizer,
    bench_parser,
    bench_evaluator,
    bench_engine_cache
);
criterion_main!(benches);
