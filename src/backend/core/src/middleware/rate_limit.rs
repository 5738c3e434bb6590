//! Sliding-window admission control.
//!
//! Every client key owns the list of instants it was admitted at within the
//! trailing window. A request is admitted iff fewer than `max_requests`
//! instants remain after pruning; a rejection reports how long until the
//! oldest instant leaves the window.
//!
//! # Example
//!
//! ```rust,ignore
//! use cinegate_core::middleware::rate_limit::{LimiterConfig, RateLimitLayer, SlidingWindowLimiter};
//!
//! let limiter = Arc::new(SlidingWindowLimiter::new("catalog", LimiterConfig::new(Duration::from_secs(60), 120))?);
//!
//! let app = Router::new()
//!     .route("/api/v1/catalog/:kind", get(get_catalog))
//!     .layer(RateLimitLayer::new(limiter, &config.rate_limit));
//! ```

use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    http::{HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use futures::future::BoxFuture;
use metrics::{counter, gauge};
use serde::Deserialize;
use std::{
    borrow::Cow,
    collections::VecDeque,
    net::{IpAddr, SocketAddr},
    sync::atomic::{AtomicU64, Ordering},
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};
use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tower::{Layer, Service};
use tracing::{debug, info};

use crate::error::{CinegateError, Result};
use crate::telemetry::redact_secret;

/// Key used for requests without a usable client identity.
pub const GLOBAL_KEY: &str = "__global__";

const API_KEY_PREFIX: &str = "key:";

/// Idle keys are swept on every this-many `allow` calls.
const SWEEP_EVERY: u64 = 1024;

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// Window and budget of a single limiter instance.
#[derive(Debug, Clone, Deserialize)]
pub struct LimiterConfig {
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    pub max_requests: u32,
}

impl LimiterConfig {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self { window, max_requests }
    }

    pub fn validate(&self, name: &str) -> Result<()> {
        if self.window.is_zero() {
            return Err(CinegateError::configuration(format!(
                "rate_limit.{}.window must be greater than 0",
                name
            )));
        }
        if self.max_requests == 0 {
            return Err(CinegateError::configuration(format!(
                "rate_limit.{}.max_requests must be greater than 0",
                name
            )));
        }
        Ok(())
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Enable admission control on inbound routes
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Catalog routes
    #[serde(default = "default_catalog")]
    pub catalog: LimiterConfig,

    /// Playback resolution routes
    #[serde(default = "default_playback")]
    pub playback: LimiterConfig,

    /// Outbound availability probes against the video host
    #[serde(default = "default_probe")]
    pub probe: LimiterConfig,

    /// Headers carrying the client address when running behind a proxy
    #[serde(default = "default_trusted_proxy_headers")]
    pub trusted_proxy_headers: Vec<String>,

    /// Interval of the idle-key sweep
    #[serde(default = "default_sweep_interval", with = "humantime_serde")]
    pub sweep_interval: Duration,
}

fn default_enabled() -> bool { true }
fn default_catalog() -> LimiterConfig { LimiterConfig::new(Duration::from_secs(60), 120) }
fn default_playback() -> LimiterConfig { LimiterConfig::new(Duration::from_secs(60), 30) }
fn default_probe() -> LimiterConfig { LimiterConfig::new(Duration::from_secs(60), 60) }
fn default_trusted_proxy_headers() -> Vec<String> {
    vec!["X-Forwarded-For".to_string(), "X-Real-IP".to_string()]
}
fn default_sweep_interval() -> Duration { Duration::from_secs(60) }

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            catalog: default_catalog(),
            playback: default_playback(),
            probe: default_probe(),
            trusted_proxy_headers: default_trusted_proxy_headers(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<()> {
        self.catalog.validate("catalog")?;
        self.playback.validate("playback")?;
        self.probe.validate("probe")?;
        if self.sweep_interval.is_zero() {
            return Err(CinegateError::configuration(
                "rate_limit.sweep_interval must be greater than 0",
            ));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Limiter
// ═══════════════════════════════════════════════════════════════════════════════

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub admitted: bool,
    /// Time until the next request could be admitted; set only on rejection
    pub retry_after_ms: Option<u64>,
    pub limit: u32,
    pub remaining: u32,
}

impl Decision {
    /// Retry delay rounded up to whole seconds, as used by `Retry-After`.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after_ms.map(|ms| ms.div_ceil(1000).max(1))
    }
}

#[derive(Debug, Default)]
struct RateWindow {
    timestamps: VecDeque<Instant>,
}

impl RateWindow {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.timestamps.front() {
            if now.duration_since(oldest) >= window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Per-key sliding-window limiter.
///
/// The prune/decide/record sequence for one key runs under that key's shard
/// lock, so concurrent calls never over-admit. Unrelated keys only contend
/// when they hash to the same shard.
pub struct SlidingWindowLimiter {
    name: String,
    config: LimiterConfig,
    windows: DashMap<String, RateWindow>,
    calls: AtomicU64,
}

impl SlidingWindowLimiter {
    pub fn new(name: impl Into<String>, config: LimiterConfig) -> Result<Self> {
        let name = name.into();
        config.validate(&name)?;
        Ok(Self {
            name,
            config,
            windows: DashMap::new(),
            calls: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Decide whether a request for `key` is admitted, recording it if so.
    pub fn allow(&self, key: &str) -> Decision {
        let key = if key.trim().is_empty() { GLOBAL_KEY } else { key };
        let now = Instant::now();
        let limit = self.config.max_requests;

        let decision = {
            let mut window = self.windows.entry(key.to_owned()).or_default();
            window.prune(now, self.config.window);

            let used = window.timestamps.len();
            if used < limit as usize {
                window.timestamps.push_back(now);
                Decision {
                    admitted: true,
                    retry_after_ms: None,
                    limit,
                    remaining: limit.saturating_sub(used as u32 + 1),
                }
            } else {
                let retry_after = window
                    .timestamps
                    .front()
                    .map(|&oldest| (oldest + self.config.window).saturating_duration_since(now))
                    .unwrap_or(self.config.window);
                Decision {
                    admitted: false,
                    retry_after_ms: Some(ceil_millis(retry_after)),
                    limit,
                    remaining: 0,
                }
            }
        };

        counter!(
            "rate_limit_checks_total",
            "limiter" => self.name.clone(),
            "admitted" => if decision.admitted { "true" } else { "false" }
        )
        .increment(1);

        if !decision.admitted {
            debug!(
                limiter = %self.name,
                key = %loggable_key(key),
                retry_after_ms = ?decision.retry_after_ms,
                "Request rejected"
            );
        }

        if self.calls.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.sweep();
        }

        decision
    }

    /// Remove keys whose window is empty. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let window = self.config.window;
        let before = self.windows.len();
        self.windows.retain(|_, w| {
            w.prune(now, window);
            !w.timestamps.is_empty()
        });
        let tracked = self.windows.len();
        gauge!("rate_limit_tracked_keys", "limiter" => self.name.clone()).set(tracked as f64);
        before.saturating_sub(tracked)
    }

    /// Number of keys currently holding a window.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

fn ceil_millis(d: Duration) -> u64 {
    let millis = d.as_nanos().div_ceil(1_000_000);
    u64::try_from(millis).unwrap_or(u64::MAX).max(1)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Client Identity
// ═══════════════════════════════════════════════════════════════════════════════

/// Derive the limiter key for an inbound request.
///
/// `X-API-Key` wins, then the first address of a trusted proxy header, then
/// the socket address. Without any of these the global key is used.
pub fn client_key(
    headers: &HeaderMap,
    remote_addr: Option<SocketAddr>,
    trusted_proxy_headers: &[String],
) -> String {
    if let Some(api_key) = headers
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
    {
        return format!("{}{}", API_KEY_PREFIX, api_key);
    }

    match client_ip(headers, remote_addr, trusted_proxy_headers) {
        Some(ip) => format!("ip:{}", ip),
        None => GLOBAL_KEY.to_string(),
    }
}

/// Limiter key safe for log output: API keys are masked, addresses kept.
pub fn loggable_key(key: &str) -> Cow<'_, str> {
    match key.strip_prefix(API_KEY_PREFIX) {
        Some(api_key) => Cow::Owned(format!("{}{}", API_KEY_PREFIX, redact_secret(api_key))),
        None => Cow::Borrowed(key),
    }
}

fn client_ip(
    headers: &HeaderMap,
    remote_addr: Option<SocketAddr>,
    trusted_proxy_headers: &[String],
) -> Option<IpAddr> {
    for header_name in trusted_proxy_headers {
        let Some(value) = headers.get(header_name.as_str()).and_then(|v| v.to_str().ok()) else {
            continue;
        };
        // X-Forwarded-For lists the originating client first
        let first = value.split(',').next().unwrap_or(value).trim();
        if let Ok(ip) = first.parse() {
            return Some(ip);
        }
    }

    remote_addr.map(|addr| addr.ip())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer and Service
// ═══════════════════════════════════════════════════════════════════════════════

/// Admission control layer for a group of routes.
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<SlidingWindowLimiter>,
    enabled: bool,
    trusted_proxy_headers: Arc<[String]>,
}

impl RateLimitLayer {
    pub fn new(limiter: Arc<SlidingWindowLimiter>, config: &RateLimitConfig) -> Self {
        Self {
            limiter,
            enabled: config.enabled,
            trusted_proxy_headers: config.trusted_proxy_headers.clone().into(),
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            layer: self.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    layer: RateLimitLayer,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, std::result::Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let layer = self.layer.clone();

        Box::pin(async move {
            if !layer.enabled {
                return inner.call(request).await;
            }

            let remote_addr = request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0);
            let key = client_key(request.headers(), remote_addr, &layer.trusted_proxy_headers);
            let decision = layer.limiter.allow(&key);

            if decision.admitted {
                let mut response = inner.call(request).await?;
                set_limit_headers(response.headers_mut(), &decision);
                return Ok(response);
            }

            let mut response = CinegateError::rate_limited(decision.retry_after_ms.unwrap_or(1000))
                .with_context("limiter", layer.limiter.name())
                .into_response();
            set_limit_headers(response.headers_mut(), &decision);
            Ok(response)
        })
    }
}

fn set_limit_headers(headers: &mut HeaderMap, decision: &Decision) {
    let mut put = |name: &'static str, value: u64| {
        if let Ok(value) = HeaderValue::from_str(&value.to_string()) {
            headers.insert(name, value);
        }
    };
    put("X-RateLimit-Limit", decision.limit as u64);
    put("X-RateLimit-Remaining", decision.remaining as u64);
    if let Some(secs) = decision.retry_after_secs() {
        put("X-RateLimit-Reset", secs);
        put("Retry-After", secs);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Background Cleanup Task
// ═══════════════════════════════════════════════════════════════════════════════

/// Periodically drop idle keys until `shutdown` is cancelled.
pub fn start_cleanup_task(
    limiter: Arc<SlidingWindowLimiter>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    info!(limiter = %limiter.name(), interval_secs = interval.as_secs(), "Starting rate limit cleanup task");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = limiter.sweep();
                    if removed > 0 {
                        debug!(limiter = %limiter.name(), removed = removed, "Cleaned up idle rate limit keys");
                    }
                }
            }
        }
        info!(limiter = %limiter.name(), "Rate limit cleanup task stopped");
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
