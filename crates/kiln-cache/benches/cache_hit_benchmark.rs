//! Performance benchmarks for the resource cache.
//!
//! Measures the cost of the cache-hit path and of a full load/unload cycle.

use criterion::{Criterion, criterion_group, criterion_main};
use kiln_cache::{CacheConfig, ResourceCache, ResourceError};
use std::hint::black_box;
use std::sync::Arc;

fn populated_cache(entries: usize) -> ResourceCache<Vec<u8>> {
    let config = CacheConfig::default().with_max_cache_size(entries);
    let cache = ResourceCache::new(config).unwrap();
    for i in 0..entries {
        cache.register(format!("model-{i}"), || async {
            Ok::<_, ResourceError>(Arc::new(vec![0_u8; 4096]))
        });
    }
    cache
}

fn benchmark_cache_hit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let cache = populated_cache(64);
    rt.block_on(async {
        for name in cache.names() {
            cache.load(&name).await.unwrap();
        }
    });

    c.bench_function("cache_hit", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(cache.load(black_box("model-17")).await.unwrap());
        });
    });
}

fn benchmark_status_lookup(c: &mut Criterion) {
    let cache = populated_cache(64);

    c.bench_function("status_lookup", |b| {
        b.iter(|| black_box(cache.status(black_box("model-42"))));
    });
}

fn benchmark_load_unload_cycle(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let cache = populated_cache(4);

    c.bench_function("load_unload_cycle", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(cache.load("model-0").await.unwrap());
            cache.unload("model-0");
        });
    });
}

criterion_group!(benches, benchmark_cache_hit, benchmark_status_lookup, benchmark_load_unload_cycle);
criterion_main!(benches);
