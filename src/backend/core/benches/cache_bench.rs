//! Benchmarks for the cache, catalog keys and the rate limiter.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;
use cinegate_core::cache::{CacheConfig, TieredCache};
use cinegate_core::catalog::{CacheKeyBuilder, CatalogParams, EndpointKind, MediaType};
use cinegate_core::middleware::rate_limit::{LimiterConfig, SlidingWindowLimiter};
use serde_json::json;

const TTL: Duration = Duration::from_secs(600);

fn local_cache(capacity: usize) -> TieredCache {
    TieredCache::local_only(CacheConfig { local_capacity: capacity, ..CacheConfig::default() })
}

fn bench_catalog_key(c: &mut Criterion) {
    let mut group = c.benchmark_group("catalog_key");
    let params = CatalogParams::from_pairs([("with_genres", "28"), ("page", "2"), ("sort_by", "popularity.desc"), ("language", "en-US")]);
    group.bench_function("no_params", |b| { b.iter(|| black_box(CacheKeyBuilder::catalog(&EndpointKind::Popular(MediaType::Movie), &CatalogParams::new()))); });
    group.bench_function("discover_4_params", |b| { b.iter(|| black_box(CacheKeyBuilder::catalog(&EndpointKind::Discover(MediaType::Movie), &params))); });
    group.bench_function("season", |b| { b.iter(|| black_box(CacheKeyBuilder::catalog(&EndpointKind::Season { series_id: 1399, season: 3 }, &params))); });
    group.finish();
}

fn bench_cache_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_local_set");
    let rt = tokio::runtime::Runtime::new().unwrap();
    let value = json!({"page": 1, "results": [{"id": 550, "title": "Fight Club"}]});
    for cap in [100, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(cap), &cap, |b, &capacity| {
            let cache = local_cache(capacity);
            b.iter(|| { rt.block_on(async { cache.set("catalog:popular:movie", &value, TTL).await.unwrap(); }); });
        });
    }
    group.finish();
}

fn bench_cache_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_local_get");
    let rt = tokio::runtime::Runtime::new().unwrap();
    let cache = local_cache(10_000);
    rt.block_on(async { cache.set("hit", &json!({"id": 550}), TTL).await.unwrap(); });
    group.bench_function("hit", |b| { b.iter(|| { rt.block_on(async { let val: Option<serde_json::Value> = cache.get("hit").await; black_box(val); }); }); });
    group.bench_function("miss", |b| { b.iter(|| { rt.block_on(async { let val: Option<serde_json::Value> = cache.get("missing").await; black_box(val); }); }); });
    group.finish();
}

fn bench_cache_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_local_eviction");
    let rt = tokio::runtime::Runtime::new().unwrap();
    for ops in [1_000, 5_000] {
        group.throughput(Throughput::Elements(ops as u64));
        group.bench_with_input(BenchmarkId::from_parameter(ops), &ops, |b, &n| {
            let cache = local_cache(500);
            b.iter(|| { rt.block_on(async {
                for i in 0..n { cache.set(&format!("k{i}"), &i, TTL).await.unwrap(); }
            }); });
        });
    }
    group.finish();
}

fn bench_limiter(c: &mut Criterion) {
    let mut group = c.benchmark_group("sliding_window_limiter");
    let rt = tokio::runtime::Runtime::new().unwrap();
    let _guard = rt.enter();
    let limiter = SlidingWindowLimiter::new("bench", LimiterConfig::new(Duration::from_secs(60), 1_000_000)).unwrap();
    group.bench_function("allow_single_key", |b| { b.iter(|| black_box(limiter.allow("ip:10.0.0.1"))); });
    let keys: Vec<String> = (0..1_000).map(|i| format!("ip:10.0.{}.{}", i / 256, i % 256)).collect();
    group.throughput(Throughput::Elements(keys.len() as u64));
    group.bench_function("allow_1000_keys", |b| { b.iter(|| { for key in &keys { black_box(limiter.allow(key)); } }); });
    let saturated = SlidingWindowLimiter::new("bench", LimiterConfig::new(Duration::from_secs(60), 1)).unwrap();
    saturated.allow("hot");
    group.bench_function("reject", |b| { b.iter(|| black_box(saturated.allow("hot"))); });
    group.finish();
}

criterion_group!(benches, bench_catalog_key, bench_cache_set, bench_cache_get, bench_cache_eviction, bench_limiter);
criterion_main!(benches);
