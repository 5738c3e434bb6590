//! Prometheus metrics.
//!
//! Components record through the `metrics` facade; this module installs the
//! Prometheus recorder and renders it for the `/metrics` endpoint.

use axum::{http::header, response::IntoResponse};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Instant;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,

    /// Histogram buckets for durations (in seconds)
    #[serde(default = "default_duration_buckets")]
    pub duration_buckets: Vec<f64>,

    /// Global labels to add to all metrics
    #[serde(default)]
    pub global_labels: HashMap<String, String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            duration_buckets: default_duration_buckets(),
            global_labels: HashMap::new(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_duration_buckets() -> Vec<f64> {
    vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
}

/// Handle to the installed Prometheus recorder.
pub struct MetricsRegistry;

impl MetricsRegistry {
    /// Render all metrics in Prometheus text format.
    ///
    /// Empty when metrics were never initialized.
    pub fn render() -> String {
        PROMETHEUS_HANDLE
            .get()
            .map(|h| h.render())
            .unwrap_or_default()
    }

    /// Whether a recorder has been installed in this process.
    pub fn is_installed() -> bool {
        PROMETHEUS_HANDLE.get().is_some()
    }
}

/// Initialize the metrics subsystem.
///
/// # Errors
///
/// Returns an error if the bucket list is invalid or another recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> anyhow::Result<()> {
    if !config.enabled {
        return Ok(());
    }

    let mut builder = PrometheusBuilder::new();
    for (key, value) in &config.global_labels {
        builder = builder.add_global_label(key, value);
    }
    builder = builder.set_buckets(&config.duration_buckets)?;

    let handle = builder.install_recorder()?;
    register_metric_descriptions();

    if PROMETHEUS_HANDLE.set(handle).is_err() {
        anyhow::bail!("metrics recorder already initialized");
    }

    tracing::info!(buckets = config.duration_buckets.len(), "Metrics initialized");
    Ok(())
}

fn register_metric_descriptions() {
    describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_counter!("http_requests_total", "Total number of HTTP requests");

    describe_counter!("cache_hits_total", "Cache hits by tier");
    describe_counter!("cache_misses_total", "Cache lookups that missed both tiers");
    describe_counter!("cache_remote_errors_total", "Failed or timed out remote cache calls");
    describe_counter!("cache_local_evictions_total", "Entries evicted from the local tier");
    describe_gauge!("cache_degraded", "1 while the cache runs local-tier only");

    describe_counter!("rate_limit_checks_total", "Admission decisions by limiter");
    describe_gauge!("rate_limit_tracked_keys", "Keys with a live rate window");

    describe_counter!(
        "catalog_upstream_requests_total",
        "Metadata API calls by endpoint kind and outcome"
    );
    describe_counter!("catalog_stale_served_total", "Stale catalog payloads served");

    describe_counter!("resolver_outcomes_total", "Playback resolutions by outcome");
    describe_histogram!(
        "resolver_fetch_duration_seconds",
        "Video host page fetch duration in seconds"
    );
    describe_counter!("resolver_probes_total", "Availability probes by result");

    describe_counter!("cinegate_errors_total", "Errors constructed, by code");
}

/// Request timing for HTTP handlers.
pub struct RequestTimer {
    start: Instant,
    method: String,
    path: String,
}

impl RequestTimer {
    /// Start timing a request.
    pub fn start(method: &str, path: &str) -> Self {
        Self {
            start: Instant::now(),
            method: method.to_string(),
            path: path.to_string(),
        }
    }

    /// Finish timing and record the duration and count.
    pub fn finish(self, status_code: u16) {
        let labels = [
            ("method", self.method),
            ("path", self.path),
            ("status_code", status_code.to_string()),
        ];
        histogram!("http_request_duration_seconds", &labels[..])
            .record(self.start.elapsed().as_secs_f64());
        counter!("http_requests_total", &labels[..]).increment(1);
    }
}

/// `GET /metrics` handler.
pub async fn prometheus_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        MetricsRegistry::render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_config_defaults() {
        let config = MetricsConfig::default();
        assert!(config.enabled);
        assert_eq!(config.duration_buckets.len(), 11);
    }

    #[test]
    fn test_disabled_metrics_is_noop() {
        let config = MetricsConfig {
            enabled: false,
            ..Default::default()
        };
        init_metrics(&config).unwrap();
    }

    #[test]
    fn test_request_timer_without_recorder() {
        let timer = RequestTimer::start("GET", "/api/v1/catalog/popular");
        timer.finish(200);
    }
}
