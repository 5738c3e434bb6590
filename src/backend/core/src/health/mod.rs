//! Health surface.
//!
//! Liveness, readiness and a component report built from registered
//! [`HealthChecker`]s, plus the cache's own health view.

mod check;
mod checker;
mod routes;

pub use check::*;
pub use checker::*;
pub use routes::*;

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::{CacheHealth, TieredCache};

pub const SERVICE_NAME: &str = "cinegate";

#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Timeout for each individual check
    pub check_timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_timeout: Duration::from_secs(5),
        }
    }
}

pub struct HealthService {
    config: HealthConfig,
    checkers: Vec<Arc<dyn HealthChecker>>,
    cache: Option<Arc<TieredCache>>,
    started_at: Instant,
}

impl HealthService {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            checkers: Vec::new(),
            cache: None,
            started_at: Instant::now(),
        }
    }

    pub fn register_checker(&mut self, checker: Arc<dyn HealthChecker>) {
        self.checkers.push(checker);
    }

    /// Attach the cache whose health surface is included in every report.
    /// Also registers a [`CacheHealthChecker`] for it.
    pub fn attach_cache(&mut self, cache: Arc<TieredCache>) {
        self.register_checker(Arc::new(CacheHealthChecker::new(cache.clone())));
        self.cache = Some(cache);
    }

    pub fn checker_names(&self) -> Vec<&str> {
        self.checkers.iter().map(|c| c.name()).collect()
    }

    /// Run all checks concurrently, each bounded by the check timeout.
    pub async fn check_health(&self) -> HealthReport {
        let timeout = self.config.check_timeout;
        let checks = self.checkers.iter().map(|checker| async move {
            match tokio::time::timeout(timeout, checker.check()).await {
                Ok(health) => health,
                Err(_) => ComponentHealth::unhealthy(checker.name()).with_message("health check timed out"),
            }
        });
        let components = futures::future::join_all(checks).await;

        let report = HealthReport::new(SERVICE_NAME, self.uptime()).with_components(components);
        match self.cache_health() {
            Some(cache) => report.with_cache(cache),
            None => report,
        }
    }

    /// Side-effect free cache health view, if a cache is attached.
    pub fn cache_health(&self) -> Option<CacheHealth> {
        self.cache.as_ref().map(|c| c.health())
    }

    pub async fn is_ready(&self) -> bool {
        self.check_health().await.is_operational()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheBackendKind, CacheConfig};
    use async_trait::async_trait;

    struct SlowChecker;

    #[async_trait]
    impl HealthChecker for SlowChecker {
        fn name(&self) -> &str {
            "slow"
        }

        async fn check(&self) -> ComponentHealth {
            tokio::time::sleep(Duration::from_secs(60)).await;
            ComponentHealth::healthy("slow")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_check_is_unhealthy() {
        let mut service = HealthService::new(HealthConfig {
            check_timeout: Duration::from_millis(100),
        });
        service.register_checker(Arc::new(SlowChecker));

        let report = service.check_health().await;
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.component("slow").unwrap().message.as_deref(), Some("health check timed out"));
    }

    #[tokio::test]
    async fn test_report_carries_cache_surface() {
        let mut service = HealthService::new(HealthConfig::default());
        service.attach_cache(Arc::new(TieredCache::local_only(CacheConfig::default())));

        let report = service.check_health().await;
        assert_eq!(report.service, "cinegate");
        let cache = report.cache.as_ref().unwrap();
        assert_eq!(cache.cache_backend, CacheBackendKind::Memory);
        assert!(cache.cache_healthy);
        assert!(report.component("cache").is_some());
    }
}
