//! Storage backend benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kvstash_bench::{encrypted_memory, keys, random_value};
use kvstash_storage::{FileBackend, MemoryBackend, StorageBackend};
use std::sync::Arc;
use tempfile::TempDir;

fn backends(dir: &TempDir) -> Vec<(&'static str, Arc<dyn StorageBackend>)> {
    let memory: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let file: Arc<dyn StorageBackend> =
        Arc::new(FileBackend::open(&dir.path().join("bench.json")).unwrap());
    let encrypted: Arc<dyn StorageBackend> = encrypted_memory();
    vec![("memory", memory), ("file", file), ("encrypted", encrypted)]
}

/// Benchmark single-key writes by value size.
fn bench_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("backend_set");
    let dir = TempDir::new().unwrap();

    for (name, backend) in backends(&dir) {
        for size in [64usize, 1024] {
            group.throughput(Throughput::Bytes(size as u64));
            let value = random_value(size);
            group.bench_with_input(BenchmarkId::new(name, size), &size, |b, _| {
                b.iter(|| backend.set(black_box("key"), black_box(&value)).unwrap());
            });
        }
    }

    group.finish();
}

/// Benchmark single-key reads.
fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("backend_get");
    let dir = TempDir::new().unwrap();

    for (name, backend) in backends(&dir) {
        backend.set("key", &random_value(256)).unwrap();
        group.bench_function(name, |b| {
            b.iter(|| black_box(backend.get(black_box("key")).unwrap()));
        });
    }

    group.finish();
}

/// Benchmark batch writes and reads.
fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("backend_batch");
    let dir = TempDir::new().unwrap();
    let count = 100;
    let batch_keys = keys("batch", count);
    let values: Vec<String> = (0..count).map(|_| random_value(128)).collect();

    group.throughput(Throughput::Elements(count as u64));
    for (name, backend) in backends(&dir) {
        group.bench_function(BenchmarkId::new("set_batch", name), |b| {
            b.iter(|| backend.set_batch(&batch_keys, &values).unwrap());
        });
        group.bench_function(BenchmarkId::new("get_batch", name), |b| {
            b.iter(|| black_box(backend.get_batch(&batch_keys).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_set, bench_get, bench_batch);
criterion_main!(benches);
