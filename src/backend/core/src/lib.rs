#![allow(clippy::result_large_err)]
//! # Cinegate Core
//!
//! Caching catalog aggregator and video source resolver for a media client.
//!
//! ## Architecture
//!
//! - **Tiered Cache**: process-local tier backed by a shared Redis tier, degrading to local-only when Redis is unreachable
//! - **Rate Limiting**: per-client sliding-window admission control for inbound routes and outbound probes
//! - **Catalog**: cached, transformed views of the metadata API with volatility-based TTLs and stale-on-error
//! - **Resolver**: stream URL extraction from third-party player pages with optional availability probes
//! - **Health**: liveness, readiness and the cache health surface
//! - **Telemetry**: structured logging and Prometheus metrics

pub mod api;
pub mod cache;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod health;
pub mod middleware;
pub mod resolver;
pub mod telemetry;

pub use error::{CinegateError, ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::api::{build_router, ApiResponse, AppState, RouteLimiters};
    pub use crate::cache::{
        CacheBackendKind, CacheConfig, CacheEntry, CacheHealth, CacheStats, RedisRemote, RemoteCache,
        StaleValue, TieredCache,
    };
    pub use crate::catalog::{
        CacheKeyBuilder, CatalogAggregator, CatalogConfig, CatalogParams, CatalogPayload, EndpointKind,
        MediaType, MetadataSource, PayloadSource, TimeWindow, TmdbClient, UpstreamConfig,
    };
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::config::Config;
    pub use crate::error::{CinegateError, ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, Result};
    pub use crate::health::{HealthChecker, HealthReport, HealthService, HealthStatus};
    pub use crate::middleware::{
        Decision, LimiterConfig, RateLimitConfig, RateLimitLayer, SlidingWindowLimiter, GLOBAL_KEY,
    };
    pub use crate::resolver::{
        MediaKind, PlaybackRequest, Quality, Resolution, ResolveOptions, ResolvedSource, ResolverConfig,
        VideoSourceResolver,
    };
}
