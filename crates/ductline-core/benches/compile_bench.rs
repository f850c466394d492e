//! Stream graph compilation Criterion benchmarks.
//!
//! Measures assembly instantiation, topological ordering, and the full
//! bind/prepare/cleanup lifecycle for linear, fan-out and grouped shapes.
//!
//! Run with: cargo bench --bench compile_bench

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use ductline_core::config::StreamGraphConfig;
use ductline_core::stream::{Assembly, AssemblyBuilder, NoopHooks, PipelineDriver};

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

/// Builds a linear assembly: src -> op_0 -> ... -> op_{n-3} -> snk
fn build_linear(step_count: usize) -> Assembly {
    assert!(step_count >= 3, "need at least src + 1 op + snk");
    let op_count = step_count - 2;
    let mut b = AssemblyBuilder::new().source("src").each("op_0").connect("src", "op_0");
    for i in 1..op_count {
        let prev = format!("op_{}", i - 1);
        let curr = format!("op_{i}");
        b = b.each(&curr).connect(&prev, &curr);
    }
    let last = format!("op_{}", op_count - 1);
    b.sink("snk").connect(&last, "snk").build().unwrap()
}

/// Builds src -> split -> {branch_0 .. branch_{k-1}} -> sink each.
fn build_fan_out(branches: usize) -> Assembly {
    let mut b = AssemblyBuilder::new()
        .source("src")
        .each("split")
        .connect("src", "split");
    for i in 0..branches {
        let branch = format!("branch_{i}");
        let sink = format!("sink_{i}");
        b = b
            .each(&branch)
            .sink(&sink)
            .connect("split", &branch)
            .connect(&branch, &sink);
    }
    b.build().unwrap()
}

/// Builds `groups` repetitions of gate -> reducing -> reducing.
fn build_grouped(groups: usize) -> Assembly {
    let mut b = AssemblyBuilder::new().source("src");
    let mut prev = "src".to_string();
    for i in 0..groups {
        let gate = format!("group_{i}");
        let first = format!("agg_{i}_a");
        let second = format!("agg_{i}_b");
        b = b
            .group_by(&gate)
            .every(&first)
            .every(&second)
            .connect(&prev, &gate)
            .connect(&gate, &first)
            .connect(&first, &second);
        prev = second;
    }
    b.sink("snk").connect(&prev, "snk").build().unwrap()
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_instantiate(c: &mut Criterion) {
    let mut group = c.benchmark_group("instantiate");
    for steps in [10, 100, 1_000] {
        let assembly = build_linear(steps);
        group.throughput(Throughput::Elements(steps as u64));
        group.bench_with_input(BenchmarkId::new("linear", steps), &assembly, |b, assembly| {
            b.iter(|| black_box(assembly.instantiate(StreamGraphConfig::default()).unwrap()));
        });
    }
    group.finish();
}

fn bench_topological_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("topological_order");
    for branches in [4, 32, 256] {
        let graph = build_fan_out(branches)
            .instantiate(StreamGraphConfig::default())
            .unwrap();
        group.bench_with_input(BenchmarkId::new("fan_out", branches), &graph, |b, graph| {
            b.iter(|| black_box(graph.topological_order().unwrap()));
        });
    }
    group.finish();
}

fn bench_full_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("lifecycle");
    let shapes = [
        ("linear_100", build_linear(100)),
        ("fan_out_32", build_fan_out(32)),
        ("grouped_16", build_grouped(16)),
    ];
    for (name, assembly) in &shapes {
        group.throughput(Throughput::Elements(assembly.step_count() as u64));
        group.bench_function(*name, |b| {
            b.iter(|| {
                let mut graph = assembly.instantiate(StreamGraphConfig::default()).unwrap();
                let mut driver = PipelineDriver::new(&mut graph, NoopHooks);
                driver.bind().unwrap();
                driver.prepare().unwrap();
                driver.cleanup().unwrap();
                black_box(graph.duct_count())
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_instantiate,
    bench_topological_order,
    bench_full_lifecycle
);
criterion_main!(benches);
