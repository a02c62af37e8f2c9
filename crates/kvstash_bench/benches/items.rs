//! Storage item benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kvstash_bench::{storage, Settings};
use kvstash_core::{Scope, StorageItem};

/// Benchmark item reads with and without the read cache.
fn bench_item_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("item_get");
    let storage = storage().unwrap();

    for (name, scope) in [("persistent", Scope::Persistent), ("encrypted", Scope::Encrypted)] {
        for cached in [false, true] {
            let item = storage
                .item(format!("{name}-{cached}"), scope, Settings::sample(0))
                .cache(cached)
                .build()
                .unwrap();
            item.set(Settings::sample(7)).unwrap();
            storage.flush_pending().unwrap();

            let label = if cached { "cached" } else { "uncached" };
            group.bench_function(BenchmarkId::new(name, label), |b| {
                b.iter(|| black_box(item.get().unwrap()));
            });
        }
    }

    group.finish();
}

/// Benchmark bursts of writes with and without coalescing.
fn bench_item_set_burst(c: &mut Criterion) {
    let mut group = c.benchmark_group("item_set_burst");
    let storage = storage().unwrap();

    for burst in [1u32, 10, 100] {
        group.throughput(Throughput::Elements(u64::from(burst)));
        for coalesce in [false, true] {
            let item = storage
                .item(format!("burst-{burst}-{coalesce}"), Scope::Encrypted, 0u32)
                .coalesce_writes(coalesce)
                .build()
                .unwrap();

            let label = if coalesce { "coalesced" } else { "direct" };
            group.bench_with_input(BenchmarkId::new(label, burst), &burst, |b, &burst| {
                b.iter(|| {
                    for i in 0..burst {
                        item.set(black_box(i)).unwrap();
                    }
                    storage.run_microtasks();
                });
            });
        }
    }

    group.finish();
}

/// Benchmark batch operations against per-item loops.
fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch");
    let storage = storage().unwrap();

    for count in [10usize, 100] {
        group.throughput(Throughput::Elements(count as u64));
        let items: Vec<StorageItem<Settings>> = (0..count)
            .map(|i| {
                storage
                    .item(format!("batch-{count}-{i}"), Scope::Persistent, Settings::sample(0))
                    .cache(false)
                    .build()
                    .unwrap()
            })
            .collect();
        let refs: Vec<&StorageItem<Settings>> = items.iter().collect();

        group.bench_with_input(BenchmarkId::new("set_batch", count), &count, |b, _| {
            b.iter(|| {
                let writes = refs
                    .iter()
                    .enumerate()
                    .map(|(i, item)| (*item, Settings::sample(i as u32)))
                    .collect::<Vec<_>>();
                storage.set_batch(writes, Scope::Persistent).unwrap();
            });
        });

        group.bench_with_input(BenchmarkId::new("set_each", count), &count, |b, _| {
            b.iter(|| {
                for (i, item) in items.iter().enumerate() {
                    item.set(Settings::sample(i as u32)).unwrap();
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("get_batch", count), &count, |b, _| {
            b.iter(|| black_box(storage.get_batch(&refs, Scope::Persistent).unwrap()));
        });

        group.bench_with_input(BenchmarkId::new("get_each", count), &count, |b, _| {
            b.iter(|| {
                for item in &items {
                    black_box(item.get().unwrap());
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_item_get, bench_item_set_burst, bench_batch);
criterion_main!(benches);
