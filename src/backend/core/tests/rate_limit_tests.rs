//! Sliding-window limiter integration tests.
//!
//! Covers:
//! - Budget exhaustion and retry-after reporting
//! - Window expiry re-admitting a key
//! - Concurrent callers on one key never over-admitting
//! - Idle key sweeping and the cleanup task
//! - The tower layer returning 429 with rate limit headers

use axum::{body::Body, http::Request, http::StatusCode, routing::get, Router};
use cinegate_core::middleware::rate_limit::{
    start_cleanup_task, LimiterConfig, RateLimitConfig, RateLimitLayer, SlidingWindowLimiter,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

fn limiter(window_ms: u64, max: u32) -> Arc<SlidingWindowLimiter> {
    Arc::new(
        SlidingWindowLimiter::new("test", LimiterConfig::new(Duration::from_millis(window_ms), max))
            .unwrap(),
    )
}

// ============================================================================
// Admission
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_fourth_request_in_window_is_rejected() {
    let limiter = limiter(1000, 3);

    for expected_remaining in [2, 1, 0] {
        let decision = limiter.allow("ip:10.0.0.1");
        assert!(decision.admitted);
        assert_eq!(decision.remaining, expected_remaining);
    }

    let rejected = limiter.allow("ip:10.0.0.1");
    assert!(!rejected.admitted);
    let retry = rejected.retry_after_ms.unwrap();
    assert!(retry > 0 && retry <= 1000, "retry_after_ms = {}", retry);
    assert_eq!(rejected.retry_after_secs(), Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_window_expiry_readmits() {
    let limiter = limiter(1000, 3);
    for _ in 0..3 {
        assert!(limiter.allow("k").admitted);
    }
    assert!(!limiter.allow("k").admitted);

    tokio::time::advance(Duration::from_millis(1001)).await;

    assert!(limiter.allow("k").admitted);
}

#[tokio::test(start_paused = true)]
async fn test_window_slides_per_request() {
    let limiter = limiter(1000, 2);

    assert!(limiter.allow("k").admitted);
    tokio::time::advance(Duration::from_millis(600)).await;
    assert!(limiter.allow("k").admitted);
    assert!(!limiter.allow("k").admitted);

    // Only the first admission has left the window
    tokio::time::advance(Duration::from_millis(450)).await;
    assert!(limiter.allow("k").admitted);
    let rejected = limiter.allow("k");
    assert!(!rejected.admitted);
    assert_eq!(rejected.retry_after_ms, Some(550));
}

#[tokio::test(start_paused = true)]
async fn test_keys_are_independent() {
    let limiter = limiter(1000, 1);

    assert!(limiter.allow("a").admitted);
    assert!(!limiter.allow("a").admitted);
    assert!(limiter.allow("b").admitted);
}

#[tokio::test(start_paused = true)]
async fn test_blank_key_shares_global_budget() {
    let limiter = limiter(1000, 1);

    assert!(limiter.allow("").admitted);
    assert!(!limiter.allow("   ").admitted);
    assert_eq!(limiter.tracked_keys(), 1);
}

#[test]
fn test_invalid_config_is_rejected() {
    assert!(SlidingWindowLimiter::new("bad", LimiterConfig::new(Duration::ZERO, 5)).is_err());
    assert!(SlidingWindowLimiter::new("bad", LimiterConfig::new(Duration::from_secs(1), 0)).is_err());
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_never_over_admit() {
    let limiter = limiter(60_000, 50);

    let handles: Vec<_> = (0..200)
        .map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.allow("shared").admitted })
        })
        .collect();

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            admitted += 1;
        }
    }

    assert_eq!(admitted, 50);
}

// ============================================================================
// Sweeping
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_sweep_drops_idle_keys() {
    let limiter = limiter(1000, 5);
    limiter.allow("old");
    tokio::time::advance(Duration::from_millis(800)).await;
    limiter.allow("recent");
    tokio::time::advance(Duration::from_millis(300)).await;

    assert_eq!(limiter.sweep(), 1);
    assert_eq!(limiter.tracked_keys(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_task_sweeps_and_stops() {
    let limiter = limiter(100, 5);
    limiter.allow("a");
    limiter.allow("b");

    let shutdown = CancellationToken::new();
    let handle = start_cleanup_task(limiter.clone(), Duration::from_millis(500), shutdown.clone());

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(limiter.tracked_keys(), 0);

    shutdown.cancel();
    handle.await.unwrap();
}

// ============================================================================
// Tower layer
// ============================================================================

fn app(limiter: Arc<SlidingWindowLimiter>, config: &RateLimitConfig) -> Router {
    Router::new()
        .route("/limited", get(|| async { "ok" }))
        .layer(RateLimitLayer::new(limiter, config))
}

fn request_from(ip: &str) -> Request<Body> {
    Request::builder()
        .uri("/limited")
        .header("X-Forwarded-For", ip)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_layer_rejects_with_429_and_headers() {
    let app = app(limiter(60_000, 2), &RateLimitConfig::default());

    for _ in 0..2 {
        let response = app.clone().oneshot(request_from("203.0.113.7")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["X-RateLimit-Limit"], "2");
    }

    let response = app.clone().oneshot(request_from("203.0.113.7")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["X-RateLimit-Remaining"], "0");
    let retry: u64 = response.headers()["Retry-After"].to_str().unwrap().parse().unwrap();
    assert!(retry >= 1 && retry <= 60);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "RATE_LIMITED");

    // A different client still has budget
    let response = app.oneshot(request_from("198.51.100.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_api_key_identity_overrides_address() {
    let app = app(limiter(60_000, 1), &RateLimitConfig::default());

    let keyed = |ip: &str| {
        Request::builder()
            .uri("/limited")
            .header("X-API-Key", "partner-1")
            .header("X-Forwarded-For", ip)
            .body(Body::empty())
            .unwrap()
    };

    assert_eq!(app.clone().oneshot(keyed("10.0.0.1")).await.unwrap().status(), StatusCode::OK);
    assert_eq!(
        app.oneshot(keyed("10.0.0.2")).await.unwrap().status(),
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn test_disabled_layer_admits_everything() {
    let config = RateLimitConfig {
        enabled: false,
        ..RateLimitConfig::default()
    };
    let app = app(limiter(60_000, 1), &config);

    for _ in 0..5 {
        let response = app.clone().oneshot(request_from("10.0.0.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
