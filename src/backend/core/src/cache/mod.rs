//! Two-level cache shielding the metadata API.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          TieredCache                             │
//! ├──────────────────────────────────────────────────────────────────┤
//! │   get ──► LocalTier ──miss──► RemoteCache ──hit──► re-seed local │
//! │                                   │                              │
//! │                         timeout + CircuitBreaker                 │
//! │                                   │                              │
//! │                   failure ──► degraded (local tier only)         │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The remote tier is optional and never surfaces errors to callers: when it
//! is disabled, unreachable or slow the cache keeps serving from the local
//! tier and reports the reason through [`TieredCache::stats`].
//!
//! Values are stored as [`CacheEntry`] envelopes with an absolute `stored_at`,
//! so a value promoted from the remote tier keeps its original expiry.

pub mod breaker;
pub mod entry;
pub mod local;
pub mod remote;

pub use breaker::{CircuitBreaker, CircuitState};
pub use entry::CacheEntry;
pub use local::LocalTier;
pub use remote::{RedisRemote, RemoteCache};

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::RedisConfig;
use crate::error::{CinegateError, Result};

const REMOTE_DISABLED_REASON: &str = "remote cache disabled by configuration";

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// Tiered cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries in the local tier
    #[serde(default = "default_local_capacity")]
    pub local_capacity: usize,

    /// How long expired entries are kept for stale reads
    #[serde(default = "default_stale_retention", with = "humantime_serde")]
    pub stale_retention: Duration,

    /// Upper bound on every remote cache call
    #[serde(default = "default_remote_timeout", with = "humantime_serde")]
    pub remote_timeout: Duration,

    /// Consecutive remote failures before the remote tier is skipped
    #[serde(default = "default_breaker_threshold")]
    pub breaker_threshold: u32,

    /// How long the remote tier is skipped before it is tried again
    #[serde(default = "default_breaker_recovery", with = "humantime_serde")]
    pub breaker_recovery: Duration,

    /// Interval of the sweep / recovery maintenance task
    #[serde(default = "default_sweep_interval", with = "humantime_serde")]
    pub sweep_interval: Duration,

    /// Prefix for remote keys
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            local_capacity: default_local_capacity(),
            stale_retention: default_stale_retention(),
            remote_timeout: default_remote_timeout(),
            breaker_threshold: default_breaker_threshold(),
            breaker_recovery: default_breaker_recovery(),
            sweep_interval: default_sweep_interval(),
            namespace: default_namespace(),
        }
    }
}

fn default_local_capacity() -> usize { 10_000 }
fn default_stale_retention() -> Duration { Duration::from_secs(3600) }
fn default_remote_timeout() -> Duration { Duration::from_millis(250) }
fn default_breaker_threshold() -> u32 { 3 }
fn default_breaker_recovery() -> Duration { Duration::from_secs(30) }
fn default_sweep_interval() -> Duration { Duration::from_secs(60) }
fn default_namespace() -> String { "cinegate".to_string() }

impl CacheConfig {
    pub fn validate(&self) -> Result<()> {
        if self.local_capacity == 0 {
            return Err(CinegateError::configuration("cache.local_capacity must be greater than 0"));
        }
        if self.remote_timeout.is_zero() {
            return Err(CinegateError::configuration("cache.remote_timeout must be greater than 0"));
        }
        if self.sweep_interval.is_zero() {
            return Err(CinegateError::configuration("cache.sweep_interval must be greater than 0"));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Introspection
// ═══════════════════════════════════════════════════════════════════════════════

/// Which tiers are currently serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheBackendKind {
    /// Local tier only
    Memory,
    /// Local tier backed by a reachable remote tier
    Remote,
}

/// Point-in-time cache statistics, computed on demand.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub backend: CacheBackendKind,
    pub size_entries: usize,
    pub healthy: bool,
    pub degraded_reason: Option<String>,
    pub local_hits: u64,
    pub remote_hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let hits = self.local_hits + self.remote_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// The cache's view exposed to health checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheHealth {
    pub cache_backend: CacheBackendKind,
    pub cache_healthy: bool,
    pub degraded_reason: Option<String>,
}

/// A retained value returned by [`TieredCache::get_stale`].
#[derive(Debug, Clone)]
pub struct StaleValue<T> {
    pub value: T,
    pub stored_at: DateTime<Utc>,
    pub expired: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TieredCache
// ═══════════════════════════════════════════════════════════════════════════════

pub struct TieredCache {
    local: LocalTier,
    remote: Option<Arc<dyn RemoteCache>>,
    breaker: CircuitBreaker,
    last_remote_error: RwLock<Option<String>>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    local_hits: AtomicU64,
    remote_hits: AtomicU64,
    misses: AtomicU64,
}

impl TieredCache {
    /// Cache backed by the given remote tier.
    pub fn new(config: CacheConfig, remote: Arc<dyn RemoteCache>) -> Self {
        Self::build(config, Some(remote))
    }

    /// Cache with the remote tier disabled.
    pub fn local_only(config: CacheConfig) -> Self {
        Self::build(config, None)
    }

    /// Build from application configuration, connecting lazily to Redis when enabled.
    pub fn from_config(config: CacheConfig, redis: &RedisConfig) -> Result<Self> {
        if !redis.enabled {
            info!("Remote cache tier disabled, using local tier only");
            return Ok(Self::local_only(config));
        }
        let remote = RedisRemote::new(redis, config.namespace.clone())?;
        Ok(Self::new(config, Arc::new(remote)))
    }

    fn build(config: CacheConfig, remote: Option<Arc<dyn RemoteCache>>) -> Self {
        let breaker = CircuitBreaker::new(config.breaker_threshold)
            .with_recovery_timeout(config.breaker_recovery);
        Self {
            local: LocalTier::new(config.local_capacity, config.stale_retention),
            remote,
            breaker,
            last_remote_error: RwLock::new(None),
            config,
            clock: Arc::new(SystemClock),
            local_hits: AtomicU64::new(0),
            remote_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Clock used to stamp and expire entries.
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Remote plumbing
    // ─────────────────────────────────────────────────────────────────────────

    /// The remote tier, unless disabled or skipped by the open circuit.
    fn available_remote(&self) -> Option<&Arc<dyn RemoteCache>> {
        let remote = self.remote.as_ref()?;
        self.breaker.can_execute().then_some(remote)
    }

    /// Run a remote call under the timeout; failures are absorbed into degraded mode.
    async fn guarded<T>(&self, op: &'static str, call: impl Future<Output = Result<T>>) -> Option<T> {
        match tokio::time::timeout(self.config.remote_timeout, call).await {
            Ok(Ok(value)) => {
                self.mark_remote_ok();
                Some(value)
            }
            Ok(Err(e)) => {
                self.mark_remote_failed(op, e.to_string());
                None
            }
            Err(_) => {
                self.mark_remote_failed(
                    op,
                    format!("timed out after {:?}", self.config.remote_timeout),
                );
                None
            }
        }
    }

    fn mark_remote_ok(&self) {
        self.breaker.record_success();
        let was_degraded = self.last_remote_error.write().take().is_some();
        if was_degraded {
            info!("Remote cache tier reachable again");
            gauge!("cache_degraded").set(0.0);
        }
    }

    fn mark_remote_failed(&self, op: &'static str, reason: String) {
        warn!(op = op, reason = %reason, "Remote cache call failed, serving from local tier");
        counter!("cache_remote_errors_total", "op" => op).increment(1);
        gauge!("cache_degraded").set(1.0);
        *self.last_remote_error.write() = Some(reason);
        self.breaker.record_failure();
    }

    async fn remote_entry(&self, key: &str) -> Option<CacheEntry> {
        let remote = self.available_remote()?;
        let bytes = self.guarded("get", remote.get(key)).await??;

        match serde_json::from_slice::<CacheEntry>(&bytes) {
            Ok(entry) if entry.key == key => Some(entry),
            Ok(entry) => {
                warn!(key = %key, stored_key = %entry.key, "Remote cache entry key mismatch, ignoring");
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Undecodable remote cache entry, ignoring");
                None
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Public operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Look up a fresh value: local tier, then remote tier.
    ///
    /// A remote hit is copied into the local tier with its original expiry.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let now = self.clock.now();
        if let Some(entry) = self.local.get(key, now) {
            if !entry.is_expired_at(now) {
                match entry.decode::<T>() {
                    Ok(value) => {
                        self.local_hits.fetch_add(1, Ordering::Relaxed);
                        counter!("cache_hits_total", "tier" => "local").increment(1);
                        debug!("Local cache hit");
                        return Some(value);
                    }
                    Err(e) => {
                        warn!(error = %e, "Cached value has unexpected shape, invalidating");
                        self.invalidate(key).await;
                        return self.record_miss();
                    }
                }
            }
        }

        if let Some(entry) = self.remote_entry(key).await {
            let now = self.clock.now();
            let fresh = !entry.is_expired_at(now);
            let decoded = if fresh { Some(entry.decode::<T>()) } else { None };
            self.local.insert(entry, now);

            match decoded {
                Some(Ok(value)) => {
                    self.remote_hits.fetch_add(1, Ordering::Relaxed);
                    counter!("cache_hits_total", "tier" => "remote").increment(1);
                    debug!("Remote cache hit, promoted to local tier");
                    return Some(value);
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Cached value has unexpected shape, invalidating");
                    self.invalidate(key).await;
                }
                None => {}
            }
        }

        self.record_miss()
    }

    fn record_miss<T>(&self) -> Option<T> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!("cache_misses_total").increment(1);
        debug!("Cache miss");
        None
    }

    /// Look up any retained value, fresh or expired.
    ///
    /// Used for stale-on-error fallback; does not count towards hit statistics.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn get_stale<T: DeserializeOwned>(&self, key: &str) -> Option<StaleValue<T>> {
        let now = self.clock.now();
        let entry = match self.local.get(key, now) {
            Some(entry) => entry,
            None => {
                let entry = self.remote_entry(key).await?;
                let now = self.clock.now();
                if !entry.is_retained_at(now, self.config.stale_retention) {
                    return None;
                }
                self.local.insert(entry.clone(), now);
                entry
            }
        };

        let value = entry.decode::<T>().ok()?;
        Some(StaleValue {
            value,
            stored_at: entry.stored_at,
            expired: entry.is_expired_at(self.clock.now()),
        })
    }

    /// Store a value in both tiers.
    ///
    /// Only serialization can fail; a remote write failure is logged and the
    /// local write stands. A zero TTL stores nothing.
    #[instrument(skip(self, value), fields(key = %key, ttl_secs = ttl.as_secs()))]
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        if ttl.as_secs() == 0 {
            debug!("Zero TTL, not caching");
            return Ok(());
        }

        let now = self.clock.now();
        let entry = CacheEntry::new(key, serde_json::to_value(value)?, ttl, now);
        let bytes = serde_json::to_vec(&entry)?;
        self.local.insert(entry, now);

        if let Some(remote) = self.available_remote() {
            let remote_ttl = ttl + self.config.stale_retention;
            self.guarded("set", remote.set(key, bytes, remote_ttl)).await;
        }

        debug!("Cached value");
        Ok(())
    }

    /// Remove a key from both tiers. Remote failures are absorbed.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn invalidate(&self, key: &str) {
        self.local.remove(key);
        if let Some(remote) = self.available_remote() {
            self.guarded("delete", remote.delete(key)).await;
        }
        debug!("Invalidated cache key");
    }

    /// Whether the configured tiers are all serving. Never mutates state.
    pub fn is_healthy(&self) -> bool {
        match self.remote {
            None => true,
            Some(_) => {
                self.last_remote_error.read().is_none()
                    && self.breaker.state() == CircuitState::Closed
            }
        }
    }

    fn degraded_reason(&self) -> Option<String> {
        if self.remote.is_none() {
            return Some(REMOTE_DISABLED_REASON.to_string());
        }
        if let Some(err) = self.last_remote_error.read().as_ref() {
            return Some(format!("remote cache unreachable: {}", err));
        }
        match self.breaker.state() {
            CircuitState::Closed => None,
            _ => Some("remote cache circuit open".to_string()),
        }
    }

    pub fn stats(&self) -> CacheStats {
        let degraded_reason = self.degraded_reason();
        let backend = if self.remote.is_some() && degraded_reason.is_none() {
            CacheBackendKind::Remote
        } else {
            CacheBackendKind::Memory
        };

        CacheStats {
            backend,
            size_entries: self.local.len(),
            healthy: self.is_healthy(),
            degraded_reason,
            local_hits: self.local_hits.load(Ordering::Relaxed),
            remote_hits: self.remote_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.local.evictions(),
        }
    }

    pub fn health(&self) -> CacheHealth {
        let stats = self.stats();
        CacheHealth {
            cache_backend: stats.backend,
            cache_healthy: stats.healthy,
            degraded_reason: stats.degraded_reason,
        }
    }

    pub fn remote_name(&self) -> Option<&'static str> {
        self.remote.as_ref().map(|r| r.name())
    }

    /// Ping the remote tier, bypassing the circuit. Returns reachability.
    pub async fn probe_remote(&self) -> bool {
        let Some(remote) = self.remote.as_ref() else {
            return false;
        };
        self.guarded("ping", remote.ping()).await.is_some()
    }

    /// Drop local entries past their retention deadline.
    pub fn sweep(&self) -> usize {
        self.local.sweep(self.clock.now())
    }

    /// Periodically sweep the local tier and, while degraded, probe the remote tier.
    pub fn start_maintenance_task(
        self: Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let swept = self.sweep();
                        if swept > 0 {
                            debug!(swept = swept, "Swept local cache tier");
                        }
                        if self.remote.is_some() && !self.is_healthy() && self.probe_remote().await {
                            info!("Remote cache recovered by maintenance probe");
                        }
                    }
                }
            }
            debug!("Cache maintenance task stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_local_only_set_get() {
        let cache = TieredCache::local_only(CacheConfig::default());
        cache.set("k", &json!({"title": "Heat"}), Duration::from_secs(60)).await.unwrap();

        let value: serde_json::Value = cache.get("k").await.unwrap();
        assert_eq!(value["title"], "Heat");
    }

    #[tokio::test]
    async fn test_disabled_remote_reports_memory_and_healthy() {
        let cache = TieredCache::local_only(CacheConfig::default());
        let stats = cache.stats();

        assert_eq!(stats.backend, CacheBackendKind::Memory);
        assert!(stats.healthy);
        assert_eq!(stats.degraded_reason.as_deref(), Some(REMOTE_DISABLED_REASON));
    }

    #[tokio::test]
    async fn test_zero_ttl_is_not_cached() {
        let cache = TieredCache::local_only(CacheConfig::default());
        cache.set("k", &1u32, Duration::ZERO).await.unwrap();
        assert!(cache.get::<u32>("k").await.is_none());
    }

    #[tokio::test]
    async fn test_shape_mismatch_is_a_miss() {
        let cache = TieredCache::local_only(CacheConfig::default());
        cache.set("k", &"text", Duration::from_secs(60)).await.unwrap();

        assert!(cache.get::<Vec<u32>>("k").await.is_none());
        assert!(cache.get::<String>("k").await.is_none());
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn test_health_serializes_camel_case() {
        let health = CacheHealth {
            cache_backend: CacheBackendKind::Memory,
            cache_healthy: true,
            degraded_reason: None,
        };
        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["cacheBackend"], "Memory");
        assert_eq!(json["cacheHealthy"], true);
        assert!(json["degradedReason"].is_null());
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            backend: CacheBackendKind::Memory,
            size_entries: 0,
            healthy: true,
            degraded_reason: None,
            local_hits: 3,
            remote_hits: 1,
            misses: 4,
            evictions: 0,
        };
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }
}
