//! Benchmarks for batch append throughput

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pulsestream_core::ingest::{GeneratorOptions, IngestGenerator, Roster};
use pulsestream_core::storage::duckdb::DuckDbBackend;
use pulsestream_core::storage::memory::MemoryBackend;
use pulsestream_core::storage::MetricStore;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn bench_build_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_batch");

    for users in [50usize, 500].iter() {
        let generator = IngestGenerator::new(
            Arc::new(MemoryBackend::new()),
            Roster::generated(*users),
            GeneratorOptions::default(),
        );
        group.throughput(Throughput::Elements(generator.records_per_tick() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(users), users, |b, _| {
            b.iter(|| black_box(generator.build_batch(Utc::now())));
        });
    }
    group.finish();
}

fn bench_append(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("append");
    group.sample_size(20);

    let stores: Vec<(&str, Arc<dyn MetricStore>)> = vec![
        ("memory", Arc::new(MemoryBackend::new())),
        ("duckdb", Arc::new(DuckDbBackend::new_in_memory().unwrap())),
    ];

    for (name, store) in stores {
        let generator = IngestGenerator::new(
            store.clone(),
            Roster::generated(500),
            GeneratorOptions::default(),
        );
        group.throughput(Throughput::Elements(generator.records_per_tick() as u64));
        group.bench_function(BenchmarkId::new(name, 2000), |b| {
            b.iter(|| {
                let batch = generator.build_batch(Utc::now());
                rt.block_on(store.append(black_box(batch))).unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_build_batch, bench_append);
criterion_main!(benches);
