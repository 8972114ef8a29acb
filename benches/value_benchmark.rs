//! Benchmarks for value handle churn
//!
//! Measures:
//! - Create + release of primitive wrappers
//! - Property writes with owned vs reusable values
//! - Script-to-host callback round trips
//! - Releases deferred by a contended context

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::thread;
use v8js::Context;

/// Benchmark: create a string wrapper and release it on drop
fn bench_create_release(c: &mut Criterion) {
    let ctx = Context::new();

    c.bench_function("value_create_release", |b| {
        b.iter(|| {
            let value = ctx.new_string("benchmark").unwrap();
            black_box(value.is_string());
        });
    });
}

/// Benchmark: property writes, owned value vs one shared reusable
fn bench_set_property(c: &mut Criterion) {
    let ctx = Context::new();
    let object = ctx.new_object().unwrap();
    let shared = ctx.new_function(|_| Ok(None)).unwrap().into_reusable();

    let mut group = c.benchmark_group("value_set_property");

    group.bench_function("owned", |b| {
        b.iter(|| {
            let value = ctx.new_int32(1).unwrap();
            object.set("x", value.consume()).unwrap();
        });
    });

    group.bench_function("reusable", |b| {
        b.iter(|| {
            object.set("x", shared.consume()).unwrap();
        });
    });

    group.finish();
}

/// Benchmark: script calling a host function N times
fn bench_callback_round_trip(c: &mut Criterion) {
    let ctx = Context::new();
    let global = ctx.global().unwrap();
    global
        .set_object_method("echo", |info| Ok(info.get_arg(0).duplicate()))
        .unwrap();

    let mut group = c.benchmark_group("callback_round_trip");

    for calls in [1, 100] {
        let source = format!("for (let i = 0; i < {calls}; i++) echo(i)");

        group.bench_with_input(BenchmarkId::from_parameter(calls), &source, |b, source| {
            b.iter(|| ctx.run_script(source, "echo.js").unwrap());
        });
    }

    group.finish();
}

/// Benchmark: drops from another thread while script holds the context
fn bench_deferred_release(c: &mut Criterion) {
    let ctx = Context::new();

    c.bench_function("value_deferred_release", |b| {
        b.iter(|| {
            let values: Vec<_> = (0..32).map(|i| ctx.new_int32(i).unwrap()).collect();

            let dropper = thread::spawn(move || drop(values));
            ctx.run_script(
                "(() => { let s = 0; for (let i = 0; i < 1000; i++) s += i; return s })()",
                "busy.js",
            )
            .unwrap();
            dropper.join().unwrap();

            black_box(ctx.pending_releases());
        });
    });
}

criterion_group!(
    benches,
    bench_create_release,
    bench_set_property,
    bench_callback_round_trip,
    bench_deferred_release
);
criterion_main!(benches);
