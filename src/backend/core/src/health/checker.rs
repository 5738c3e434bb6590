//! Health checkers for cinegate's dependencies.
//!
//! - **Cache**: remote tier reachability, from [`TieredCache::stats`]
//! - **External services**: the metadata API and the video host
//!
//! # Example
//!
//! ```rust,ignore
//! use cinegate_core::health::{CacheHealthChecker, HealthChecker};
//!
//! let checker = CacheHealthChecker::new(cache.clone());
//! let health = checker.check().await;
//! ```

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

use super::check::{ComponentHealth, HealthStatus};
use crate::cache::{CacheBackendKind, TieredCache};

#[async_trait]
pub trait HealthChecker: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self) -> ComponentHealth;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Cache Health Checker
// ═══════════════════════════════════════════════════════════════════════════════

/// Reports the tiered cache's own view of its health. Never touches the network.
pub struct CacheHealthChecker {
    cache: Arc<TieredCache>,
}

impl CacheHealthChecker {
    pub fn new(cache: Arc<TieredCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl HealthChecker for CacheHealthChecker {
    fn name(&self) -> &str {
        "cache"
    }

    async fn check(&self) -> ComponentHealth {
        let stats = self.cache.stats();

        // A cache with the remote tier disabled is healthy by configuration.
        let status = if stats.healthy {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        let mut health = ComponentHealth::new("cache", status)
            .with_metadata("cacheBackend", stats.backend)
            .with_metadata("cacheHealthy", stats.healthy)
            .with_metadata("degradedReason", &stats.degraded_reason)
            .with_metadata("sizeEntries", stats.size_entries)
            .with_metadata("hitRate", stats.hit_rate());

        health = match (stats.backend, &stats.degraded_reason) {
            (CacheBackendKind::Remote, _) => health.with_message("local and remote tiers serving"),
            (CacheBackendKind::Memory, Some(reason)) => health.with_message(reason.clone()),
            (CacheBackendKind::Memory, None) => health.with_message("local tier serving"),
        };
        health
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// External Service Health Checker
// ═══════════════════════════════════════════════════════════════════════════════

/// Checks that an external HTTP service answers.
///
/// Any response below 500 other than 429 counts as reachable. Failures are
/// reported as degraded until `failure_threshold` consecutive failures, then
/// as unhealthy.
pub struct ExternalServiceHealthChecker {
    client: reqwest::Client,
    name: String,
    url: String,
    use_head: bool,
    consecutive_failures: AtomicU64,
    failure_threshold: u64,
}

impl ExternalServiceHealthChecker {
    pub fn new(name: impl Into<String>, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            name: name.into(),
            url: url.into(),
            use_head: false,
            consecutive_failures: AtomicU64::new(0),
            failure_threshold: 3,
        }
    }

    /// Check with HEAD instead of GET.
    pub fn with_head(mut self) -> Self {
        self.use_head = true;
        self
    }

    pub fn with_user_agent(mut self, user_agent: &str, timeout: Duration) -> Self {
        if let Ok(client) = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
        {
            self.client = client;
        }
        self
    }

    pub fn with_failure_threshold(mut self, threshold: u64) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    fn failure(&self, message: String, latency: Duration) -> ComponentHealth {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        let status = if failures >= self.failure_threshold {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Degraded
        };
        warn!(service = %self.name, failures = failures, reason = %message, "External service health check failed");

        ComponentHealth::new(&self.name, status)
            .with_message(message)
            .with_latency(latency)
            .with_metadata("consecutive_failures", failures)
    }
}

#[async_trait]
impl HealthChecker for ExternalServiceHealthChecker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> ComponentHealth {
        let start = Instant::now();
        let request = if self.use_head {
            self.client.head(&self.url)
        } else {
            self.client.get(&self.url)
        };

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                let latency = start.elapsed();
                if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    return self.failure(format!("{} answered {}", self.name, status), latency);
                }
                self.consecutive_failures.store(0, Ordering::Relaxed);
                ComponentHealth::healthy(&self.name)
                    .with_message(format!("{} is reachable", self.name))
                    .with_latency(latency)
                    .with_metadata("http_status", status.as_u16())
            }
            Err(e) => self.failure(format!("request failed: {}", e), start.elapsed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;

    #[tokio::test]
    async fn test_cache_checker_local_only_is_healthy() {
        let cache = Arc::new(TieredCache::local_only(CacheConfig::default()));
        let health = CacheHealthChecker::new(cache).check().await;

        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.metadata["cacheBackend"], "Memory");
        assert_eq!(health.metadata["cacheHealthy"], true);
    }

    #[tokio::test]
    async fn test_external_checker_escalates_after_threshold() {
        let checker = ExternalServiceHealthChecker::new("video_host", "http://127.0.0.1:1/", Duration::from_millis(200))
            .with_failure_threshold(2);

        assert_eq!(checker.check().await.status, HealthStatus::Degraded);
        assert_eq!(checker.check().await.status, HealthStatus::Unhealthy);
    }
}
