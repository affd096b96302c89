//! Tracking and query benchmarks
//!
//! Measures the hot paths of a training loop (`track`) and of analysis
//! (log codec, cross-run aggregation).
//!
//! Run with: cargo bench --bench tracking

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::Rng;
use serde_json::json;
use trueno_track::codec::{decode_log, encode_log, Compression};
use trueno_track::query::Aggregation;
use trueno_track::root::{MemoryRoot, Root, RunSet};
use trueno_track::run::{Log, Run};

const STEPS: [usize; 2] = [1_000, 10_000];

fn random_run(root: &Arc<dyn Root>, steps: usize, lr: f64) -> Run {
    let mut rng = rand::thread_rng();
    let mut run = Run::builder(root.clone())
        .config(&json!({"lr": lr}))
        .build();
    for _ in 0..steps {
        run.track(
            [("loss", rng.gen_range(0.0_f64..1.0)), ("acc", rng.gen_range(0.0_f64..1.0))],
            None,
        )
        .unwrap();
    }
    run
}

/// Benchmark inferred-step tracking of two scalar keys per step
fn bench_track(c: &mut Criterion) {
    let mut group = c.benchmark_group("track_inferred_step");
    let root: Arc<dyn Root> = Arc::new(MemoryRoot::new());

    for steps in STEPS {
        group.bench_with_input(BenchmarkId::from_parameter(steps), &steps, |b, &steps| {
            b.iter(|| black_box(random_run(&root, steps, 0.1)));
        });
    }

    group.finish();
}

/// Benchmark log encoding with each compression algorithm
fn bench_log_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("log_codec");
    let root: Arc<dyn Root> = Arc::new(MemoryRoot::new());
    let log: Log = random_run(&root, 10_000, 0.1).log().to_vec();

    for compression in [Compression::Lz4, Compression::Zstd] {
        let encoded = encode_log(&log, compression).unwrap();
        group.bench_with_input(
            BenchmarkId::new("encode", compression.as_str()),
            &log,
            |b, log| b.iter(|| encode_log(black_box(log), compression).unwrap()),
        );
        group.bench_with_input(
            BenchmarkId::new("decode", compression.as_str()),
            &encoded,
            |b, bytes| b.iter(|| decode_log(black_box(bytes)).unwrap()),
        );
    }

    group.finish();
}

/// Benchmark grouped aggregation across a sweep of runs
fn bench_grouped_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("grouped_aggregate");
    let root: Arc<dyn Root> = Arc::new(MemoryRoot::new());
    for i in 0..32 {
        let lr = if i % 2 == 0 { 0.1 } else { 0.01 };
        random_run(&root, 1_000, lr).write().unwrap();
    }

    for aggr in [Aggregation::Mean, Aggregation::Median] {
        group.bench_function(aggr.as_str(), |b| {
            b.iter(|| {
                for (_, view) in root.group_by("lr").unwrap() {
                    black_box(view.aggregate("loss", aggr).unwrap());
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_track, bench_log_codec, bench_grouped_aggregate);
criterion_main!(benches);
