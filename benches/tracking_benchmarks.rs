//! Tracking benchmarks
//!
//! Benchmarks for the hot paths of a training loop:
//! - Metric logging (one INSERT per call)
//! - Metric history reads
//! - Params blob encoding/decoding
//!
//! Toyota Way: Measure before optimizing (Genchi Genbutsu)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mltracker::experiment::Params;
use mltracker::storage::{decode_params, encode_params};
use mltracker::Session;
use serde_json::json;
use tempfile::TempDir;

/// Create a session with a started run
fn started_session() -> (TempDir, Session) {
    let dir = TempDir::new().unwrap();
    let mut session = Session::new("bench", dir.path()).unwrap();
    session.start(Some("run"), None).unwrap();
    (dir, session)
}

/// Create a params mapping with `n` nested entries
fn create_params(n: usize) -> Params {
    (0..n)
        .map(|i| {
            (
                format!("param_{i}"),
                json!({"value": i, "scale": 0.5, "tags": ["a", "b"]}),
            )
        })
        .collect()
}

/// Benchmark single metric logging
fn bench_log_metric(c: &mut Criterion) {
    let (_dir, session) = started_session();
    let mut step = 0.0_f64;

    c.bench_function("log_metric", |b| {
        b.iter(|| {
            step += 1.0;
            black_box(session.log("loss", 1.0 / step).unwrap());
        });
    });
}

/// Benchmark reading the full metric history
fn bench_get_all_metrics(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_all_metrics");

    for size in [100_u32, 1_000, 10_000].iter() {
        let (_dir, session) = started_session();
        for i in 0..*size {
            session.log("loss", f64::from(i)).unwrap();
        }

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let metrics = session.get_all_metrics().unwrap();
                black_box(metrics);
            });
        });
    }

    group.finish();
}

/// Benchmark params blob round trip
fn bench_params_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("params_codec");

    for size in [10, 100, 1_000].iter() {
        let params = create_params(*size);
        let blob = encode_params(&params).unwrap();

        group.bench_with_input(BenchmarkId::new("encode", size), size, |b, _| {
            b.iter(|| black_box(encode_params(&params).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("decode", size), size, |b, _| {
            b.iter(|| black_box(decode_params(&blob).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_log_metric,
    bench_get_all_metrics,
    bench_params_codec
);
criterion_main!(benches);
