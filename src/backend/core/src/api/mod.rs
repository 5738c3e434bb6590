//! HTTP API.
//!
//! # Routes
//!
//! | Method | Path                                             | Limiter  |
//! |--------|--------------------------------------------------|----------|
//! | GET    | `/api/v1/catalog/:kind`                          | catalog  |
//! | DELETE | `/api/v1/catalog/:kind`                          | catalog  |
//! | GET    | `/api/v1/playback/:media/:id`                    | playback |
//! | GET    | `/api/v1/playback/:media/:id/availability`       | playback |
//! | GET    | `/health`, `/health/live`, `/health/ready`, `/health/cache` | none |
//! | GET    | `/metrics`                                       | none     |

mod handlers;

use axum::{
    extract::{MatchedPath, Request},
    http::HeaderValue,
    middleware::{self as axum_middleware, Next},
    response::Response,
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::Instrument;
use uuid::Uuid;

use crate::cache::TieredCache;
use crate::catalog::CatalogAggregator;
use crate::error::CinegateError;
use crate::health::{health_routes, SharedHealthService};
use crate::middleware::{RateLimitConfig, RateLimitLayer, SlidingWindowLimiter};
use crate::resolver::VideoSourceResolver;
use crate::telemetry::{prometheus_metrics, RequestTimer};

/// Limiters guarding the inbound route groups.
#[derive(Clone)]
pub struct RouteLimiters {
    pub catalog: Arc<SlidingWindowLimiter>,
    pub playback: Arc<SlidingWindowLimiter>,
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<TieredCache>,
    pub catalog: Arc<CatalogAggregator>,
    pub resolver: Arc<VideoSourceResolver>,
    pub limiters: RouteLimiters,
    pub rate_limit: Arc<RateLimitConfig>,
}

/// Build the full router: API routes with their limiters, health, metrics and
/// the shared tower-http stack.
///
/// # Example
///
/// ```rust,ignore
/// let app = build_router(state, health);
/// axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
/// ```
pub fn build_router(state: AppState, health: SharedHealthService) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let catalog = Router::new()
        .route(
            "/catalog/:kind",
            get(handlers::get_catalog).delete(handlers::invalidate_catalog),
        )
        .route_layer(RateLimitLayer::new(state.limiters.catalog.clone(), &state.rate_limit));

    let playback = Router::new()
        .route("/playback/:media/:id", get(handlers::resolve_playback))
        .route("/playback/:media/:id/availability", get(handlers::check_availability))
        .route_layer(RateLimitLayer::new(state.limiters.playback.clone(), &state.rate_limit));

    Router::new()
        .nest("/api/v1", catalog.merge(playback))
        .fallback(handlers::not_found)
        .with_state(state)
        .merge(health_routes(health))
        .route("/metrics", get(prometheus_metrics))
        .layer(axum_middleware::from_fn(track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
}

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Record `http_requests_total` and request duration by matched route, and
/// propagate (or assign) the request id.
async fn track_requests(request: Request, next: Next) -> Response {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let span = tracing::info_span!("request", request_id = %request_id, route = %path);
    let timer = RequestTimer::start(request.method().as_str(), &path);

    let mut response = next.run(request).instrument(span).await;
    timer.finish(response.status().as_u16());
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_code: None,
        }
    }

    /// Unsuccessful outcome that still carries a body, e.g. a resolution that found nothing.
    pub fn failure(data: T, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Some(data),
            error: Some(message.into()),
            error_code: None,
        }
    }

    pub fn from_error(err: &CinegateError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.user_message().to_string()),
            error_code: Some(err.code().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_response_success() {
        let response = ApiResponse::success("payload");
        assert!(response.success);
        assert_eq!(response.data, Some("payload"));
        assert!(response.error.is_none());
    }

    #[test]
    fn test_api_response_failure_keeps_data() {
        let response = ApiResponse::failure(serde_json::json!({"page_url": "https://h/movie/1"}), "no stream found");
        let body = serde_json::to_value(&response).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["data"]["page_url"], "https://h/movie/1");
        assert_eq!(body["error"], "no stream found");
    }

    #[test]
    fn test_api_response_from_error() {
        let err = CinegateError::validation("bad id");
        let response: ApiResponse<()> = ApiResponse::from_error(&err);
        assert_eq!(response.error_code.as_deref(), Some("ValidationError"));
    }
}
