//! Health check HTTP routes

use super::{HealthService, LivenessResponse, ReadinessResponse};
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use std::sync::Arc;

pub type SharedHealthService = Arc<HealthService>;

pub fn health_routes(service: SharedHealthService) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness_check))
        .route("/health/ready", get(readiness_check))
        .route("/health/cache", get(cache_health))
        .with_state(service)
}

/// GET /health
pub async fn health_check(State(service): State<SharedHealthService>) -> impl IntoResponse {
    let report = service.check_health().await;
    (report.status.http_status(), Json(report))
}

/// GET /health/ready
pub async fn readiness_check(State(service): State<SharedHealthService>) -> impl IntoResponse {
    let report = service.check_health().await;
    let response = ReadinessResponse::from_report(&report);
    let status = if response.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

/// GET /health/live
pub async fn liveness_check() -> impl IntoResponse {
    (StatusCode::OK, Json(LivenessResponse::alive()))
}

/// GET /health/cache
pub async fn cache_health(State(service): State<SharedHealthService>) -> impl IntoResponse {
    match service.cache_health() {
        Some(health) => Json(health).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
