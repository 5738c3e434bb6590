//! Tiered cache integration tests.
//!
//! Covers:
//! - Round trips with the remote tier up, down and disabled
//! - Degraded-mode reporting when the remote fails mid-run
//! - Promotion from the remote tier keeping the original expiry
//! - Stale reads after expiry
//! - Circuit breaker opening and recovering
//! - Remote timeouts and local eviction

mod common;

use chrono::{TimeZone, Utc};
use cinegate_core::cache::{CacheBackendKind, CacheConfig, CacheEntry, TieredCache};
use cinegate_core::clock::ManualClock;
use common::FakeRemote;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Title {
    id: u64,
    name: String,
}

fn title(id: u64) -> Title {
    Title {
        id,
        name: format!("title-{}", id),
    }
}

fn clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
}

fn tiered(remote: &Arc<FakeRemote>, clock: &ManualClock) -> TieredCache {
    TieredCache::new(CacheConfig::default(), remote.clone()).with_clock(Arc::new(clock.clone()))
}

// ============================================================================
// Round trips
// ============================================================================

#[tokio::test]
async fn test_set_then_get_with_remote_up() {
    let remote = Arc::new(FakeRemote::new());
    let cache = tiered(&remote, &clock());

    cache.set("movie:550", &title(550), Duration::from_secs(60)).await.unwrap();

    assert_eq!(cache.get::<Title>("movie:550").await, Some(title(550)));
    assert!(remote.contains("movie:550"));

    let stats = cache.stats();
    assert_eq!(stats.backend, CacheBackendKind::Remote);
    assert!(stats.healthy);
    assert!(stats.degraded_reason.is_none());
    assert_eq!(stats.local_hits, 1);
}

#[tokio::test]
async fn test_remote_ttl_includes_stale_retention() {
    let remote = Arc::new(FakeRemote::new());
    let cache = tiered(&remote, &clock());

    cache.set("k", &1u32, Duration::from_secs(60)).await.unwrap();

    let expected = Duration::from_secs(60) + CacheConfig::default().stale_retention;
    assert_eq!(remote.ttl_of("k"), Some(expected));
}

#[tokio::test]
async fn test_set_then_get_with_remote_down() {
    let remote = Arc::new(FakeRemote::new());
    remote.set_reachable(false);
    let cache = tiered(&remote, &clock());

    cache.set("k", &title(1), Duration::from_secs(60)).await.unwrap();

    assert_eq!(cache.get::<Title>("k").await, Some(title(1)));
    assert!(!remote.contains("k"));
}

#[tokio::test]
async fn test_disabled_remote_round_trip() {
    let cache = TieredCache::local_only(CacheConfig::default());
    cache.set("k", &json!([1, 2, 3]), Duration::from_secs(60)).await.unwrap();

    let value: Vec<u32> = cache.get("k").await.unwrap();
    assert_eq!(value, vec![1, 2, 3]);
    assert_eq!(cache.remote_name(), None);
    assert!(!cache.probe_remote().await);
}

#[tokio::test]
async fn test_get_after_ttl_is_a_miss() {
    let remote = Arc::new(FakeRemote::new());
    let clock = clock();
    let cache = tiered(&remote, &clock);

    cache.set("k", &title(2), Duration::from_secs(30)).await.unwrap();
    clock.advance(Duration::from_secs(31));

    assert!(cache.get::<Title>("k").await.is_none());
    assert_eq!(cache.stats().misses, 1);
}

// ============================================================================
// Degraded mode
// ============================================================================

#[tokio::test]
async fn test_remote_failure_mid_run_degrades_to_memory() {
    let remote = Arc::new(FakeRemote::new());
    let cache = tiered(&remote, &clock());

    cache.set("before", &title(1), Duration::from_secs(300)).await.unwrap();
    assert_eq!(cache.stats().backend, CacheBackendKind::Remote);

    remote.set_reachable(false);

    // Local tier still serves what it already holds
    assert_eq!(cache.get::<Title>("before").await, Some(title(1)));

    // A write during the outage reaches the remote, fails, and is absorbed
    cache.set("during", &title(2), Duration::from_secs(300)).await.unwrap();
    assert_eq!(cache.get::<Title>("during").await, Some(title(2)));

    let stats = cache.stats();
    assert_eq!(stats.backend, CacheBackendKind::Memory);
    assert!(!stats.healthy);
    let reason = stats.degraded_reason.unwrap();
    assert!(reason.starts_with("remote cache unreachable"), "reason: {}", reason);

    let health = cache.health();
    assert_eq!(health.cache_backend, CacheBackendKind::Memory);
    assert!(!health.cache_healthy);
}

#[tokio::test]
async fn test_successful_remote_call_clears_degraded_state() {
    let remote = Arc::new(FakeRemote::new());
    let cache = tiered(&remote, &clock());

    remote.set_reachable(false);
    cache.set("k", &1u32, Duration::from_secs(60)).await.unwrap();
    assert!(!cache.is_healthy());

    remote.set_reachable(true);
    assert!(cache.probe_remote().await);
    assert!(cache.is_healthy());
    assert_eq!(cache.stats().backend, CacheBackendKind::Remote);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_remote_is_bounded_by_timeout() {
    let remote = Arc::new(FakeRemote::new());
    remote.hang();
    let cache = tiered(&remote, &clock());

    cache.set("k", &title(3), Duration::from_secs(60)).await.unwrap();
    assert!(cache.get::<Title>("missing").await.is_none());

    let reason = cache.stats().degraded_reason.unwrap();
    assert!(reason.contains("timed out"), "reason: {}", reason);
    assert_eq!(cache.get::<Title>("k").await, Some(title(3)));
}

#[tokio::test(start_paused = true)]
async fn test_circuit_opens_after_threshold_and_recovers() {
    let remote = Arc::new(FakeRemote::new());
    remote.set_reachable(false);
    let cache = tiered(&remote, &clock());

    for i in 0..3 {
        assert!(cache.get::<u32>(&format!("k{}", i)).await.is_none());
    }
    assert_eq!(remote.calls(), 3);

    // Open circuit: remote skipped entirely
    assert!(cache.get::<u32>("k3").await.is_none());
    assert_eq!(remote.calls(), 3);
    assert_eq!(cache.stats().backend, CacheBackendKind::Memory);

    remote.set_reachable(true);
    tokio::time::advance(Duration::from_secs(31)).await;

    // Half-open trial succeeds and closes the circuit
    assert!(cache.get::<u32>("k4").await.is_none());
    assert_eq!(remote.calls(), 4);
    assert!(cache.is_healthy());
    assert_eq!(cache.stats().backend, CacheBackendKind::Remote);
}

// ============================================================================
// Promotion and stale reads
// ============================================================================

#[tokio::test]
async fn test_promotion_keeps_original_expiry() {
    let remote = Arc::new(FakeRemote::new());
    let clock = clock();
    let writer = tiered(&remote, &clock);
    let reader = tiered(&remote, &clock);

    writer.set("k", &title(7), Duration::from_secs(60)).await.unwrap();
    clock.advance(Duration::from_secs(40));

    // Served by the remote tier and copied into the reader's local tier
    assert_eq!(reader.get::<Title>("k").await, Some(title(7)));
    assert_eq!(reader.stats().remote_hits, 1);
    assert_eq!(reader.get::<Title>("k").await, Some(title(7)));
    assert_eq!(reader.stats().local_hits, 1);

    // 61s after the original write the value is gone, not 40s + 60s
    clock.advance(Duration::from_secs(21));
    assert!(reader.get::<Title>("k").await.is_none());
}

#[tokio::test]
async fn test_get_stale_returns_expired_value() {
    let remote = Arc::new(FakeRemote::new());
    let clock = clock();
    let cache = tiered(&remote, &clock);

    cache.set("k", &title(9), Duration::from_secs(10)).await.unwrap();
    let written_at = cache_now(&clock);
    clock.advance(Duration::from_secs(120));

    assert!(cache.get::<Title>("k").await.is_none());
    let stale = cache.get_stale::<Title>("k").await.unwrap();
    assert_eq!(stale.value, title(9));
    assert!(stale.expired);
    assert_eq!(stale.stored_at, written_at);
}

fn cache_now(clock: &ManualClock) -> chrono::DateTime<Utc> {
    use cinegate_core::clock::Clock;
    clock.now()
}

#[tokio::test]
async fn test_get_stale_from_remote_only() {
    let remote = Arc::new(FakeRemote::new());
    let clock = clock();
    let writer = tiered(&remote, &clock);
    let reader = tiered(&remote, &clock);

    writer.set("k", &title(4), Duration::from_secs(10)).await.unwrap();
    clock.advance(Duration::from_secs(60));

    let stale = reader.get_stale::<Title>("k").await.unwrap();
    assert_eq!(stale.value, title(4));
    assert!(stale.expired);
}

#[tokio::test]
async fn test_get_stale_past_retention_is_none() {
    let remote = Arc::new(FakeRemote::new());
    let clock = clock();
    let cache = tiered(&remote, &clock);

    cache.set("k", &title(5), Duration::from_secs(10)).await.unwrap();
    clock.advance(Duration::from_secs(10) + CacheConfig::default().stale_retention + Duration::from_secs(1));

    assert!(cache.get_stale::<Title>("k").await.is_none());
}

#[tokio::test]
async fn test_remote_entry_under_other_key_is_ignored() {
    let remote = Arc::new(FakeRemote::new());
    let clock = clock();
    let cache = tiered(&remote, &clock);

    let foreign = CacheEntry::new("other", json!(1), Duration::from_secs(60), cache_now(&clock));
    remote.put_raw("k", serde_json::to_vec(&foreign).unwrap());
    remote.put_raw("garbage", b"not json".to_vec());

    assert!(cache.get::<u32>("k").await.is_none());
    assert!(cache.get::<u32>("garbage").await.is_none());
    assert!(cache.is_healthy());
}

// ============================================================================
// Invalidation and eviction
// ============================================================================

#[tokio::test]
async fn test_invalidate_clears_both_tiers() {
    let remote = Arc::new(FakeRemote::new());
    let cache = tiered(&remote, &clock());

    cache.set("k", &title(1), Duration::from_secs(60)).await.unwrap();
    cache.invalidate("k").await;

    assert!(!remote.contains("k"));
    assert!(cache.get::<Title>("k").await.is_none());
    assert!(cache.get_stale::<Title>("k").await.is_none());
}

#[tokio::test]
async fn test_local_tier_evicts_at_capacity() {
    let config = CacheConfig {
        local_capacity: 10,
        ..CacheConfig::default()
    };
    let cache = TieredCache::local_only(config).with_clock(Arc::new(clock()));

    for i in 0..25u64 {
        cache.set(&format!("k{}", i), &i, Duration::from_secs(60)).await.unwrap();
    }

    let stats = cache.stats();
    assert!(stats.size_entries <= 10);
    assert!(stats.evictions > 0);
    assert_eq!(cache.get::<u64>("k24").await, Some(24));
}

#[tokio::test]
async fn test_sweep_drops_entries_past_retention() {
    let clock = clock();
    let config = CacheConfig {
        stale_retention: Duration::from_secs(60),
        ..CacheConfig::default()
    };
    let cache = TieredCache::local_only(config).with_clock(Arc::new(clock.clone()));

    cache.set("short", &1u8, Duration::from_secs(10)).await.unwrap();
    cache.set("long", &2u8, Duration::from_secs(3600)).await.unwrap();
    clock.advance(Duration::from_secs(120));

    assert_eq!(cache.sweep(), 1);
    assert_eq!(cache.stats().size_entries, 1);
}
