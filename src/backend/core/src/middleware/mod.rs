//! Request middleware for the cinegate API.
pub mod rate_limit;

pub use rate_limit::{
    client_key, loggable_key, start_cleanup_task, Decision, LimiterConfig, RateLimitConfig, RateLimitLayer,
    SlidingWindowLimiter, GLOBAL_KEY,
};
