//! Error handling for Cinegate Core.
//!
//! This module provides:
//! - A single error type carrying a stable, machine-readable code
//! - HTTP status code mapping for API responses
//! - User-safe messages kept apart from detailed internal messages
//! - Severity-aware logging and error metrics
//!
//! Routine absence is never an error here: a cache miss is `None`, a limiter
//! rejection is a [`Decision`](crate::middleware::rate_limit::Decision) and an
//! empty playback page is a [`Resolution`](crate::resolver::Resolution) variant.
//!
//! # Usage
//!
//! ```rust,ignore
//! use cinegate_core::error::{CinegateError, Result, ErrorContext};
//!
//! fn load() -> Result<String> {
//!     std::fs::read_to_string("catalog.json").context("Failed to read catalog snapshot")
//! }
//! ```

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Cinegate operations.
pub type Result<T> = std::result::Result<T, CinegateError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes for API responses.
///
/// These codes are stable and can be used by clients for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Upstream Errors (1000-1099)
    UpstreamUnavailable,
    UpstreamMalformed,
    UpstreamNotFound,
    UpstreamRateLimited,

    // Cache Errors (2100-2199)
    RemoteCacheUnavailable,
    CacheError,

    // Serialization Errors (2200-2299)
    SerializationError,
    DeserializationError,

    // Admission Errors (3000-3099)
    RateLimited,

    // Validation Errors (4100-4199)
    ValidationError,
    InvalidInput,
    MissingRequiredField,

    // Configuration Errors (5000-5099)
    ConfigurationError,
    MissingConfiguration,
    InvalidConfiguration,

    // Internal Errors (9000-9099)
    InternalError,
    UnknownError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::UpstreamUnavailable => 1000,
            Self::UpstreamMalformed => 1001,
            Self::UpstreamNotFound => 1002,
            Self::UpstreamRateLimited => 1003,

            Self::RemoteCacheUnavailable => 2100,
            Self::CacheError => 2101,

            Self::SerializationError => 2200,
            Self::DeserializationError => 2201,

            Self::RateLimited => 3000,

            Self::ValidationError => 4100,
            Self::InvalidInput => 4101,
            Self::MissingRequiredField => 4102,

            Self::ConfigurationError => 5000,
            Self::MissingConfiguration => 5001,
            Self::InvalidConfiguration => 5002,

            Self::InternalError => 9000,
            Self::UnknownError => 9099,
        }
    }

    /// Get the HTTP status code for this error.
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::UpstreamNotFound => StatusCode::NOT_FOUND,

            Self::ValidationError | Self::InvalidInput | Self::MissingRequiredField => {
                StatusCode::UNPROCESSABLE_ENTITY
            }

            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,

            Self::UpstreamUnavailable
            | Self::UpstreamRateLimited
            | Self::RemoteCacheUnavailable => StatusCode::SERVICE_UNAVAILABLE,

            Self::UpstreamMalformed => StatusCode::BAD_GATEWAY,

            Self::CacheError
            | Self::SerializationError
            | Self::DeserializationError
            | Self::ConfigurationError
            | Self::MissingConfiguration
            | Self::InvalidConfiguration
            | Self::InternalError
            | Self::UnknownError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this error is retryable.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnavailable
                | Self::UpstreamRateLimited
                | Self::RemoteCacheUnavailable
                | Self::RateLimited
        )
    }

    /// Whether the failure means "try again shortly" rather than "the payload is wrong".
    ///
    /// Only these failures are eligible for stale-on-error fallback.
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable | Self::UpstreamRateLimited)
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "upstream",
            2100..=2199 => "cache",
            2200..=2299 => "serialization",
            3000..=3099 => "admission",
            4100..=4199 => "validation",
            5000..=5099 => "configuration",
            9000..=9099 => "internal",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Caller errors (bad input, unknown ids)
    Low,
    /// Operational issues (upstream outages, rate limits)
    Medium,
    /// System errors (serialization, configuration)
    High,
    /// Critical errors requiring immediate attention
    Critical,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::ValidationError
            | ErrorCode::InvalidInput
            | ErrorCode::MissingRequiredField
            | ErrorCode::UpstreamNotFound
            | ErrorCode::RateLimited => Self::Low,

            ErrorCode::UpstreamUnavailable
            | ErrorCode::UpstreamRateLimited
            | ErrorCode::RemoteCacheUnavailable => Self::Medium,

            ErrorCode::UpstreamMalformed
            | ErrorCode::CacheError
            | ErrorCode::SerializationError
            | ErrorCode::DeserializationError
            | ErrorCode::ConfigurationError
            | ErrorCode::MissingConfiguration
            | ErrorCode::InvalidConfiguration => Self::High,

            ErrorCode::InternalError | ErrorCode::UnknownError => Self::Critical,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Additional structured details about an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Additional context key-value pairs
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    /// Related entity ID (catalog item, cache key, etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    /// Related entity type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    /// Retry information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,

    /// Suggested action for resolution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

impl ErrorDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after_secs = Some(seconds);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggested_action = Some(suggestion.into());
        self
    }

    fn is_empty(&self) -> bool {
        self.context.is_empty()
            && self.entity_id.is_none()
            && self.retry_after_secs.is_none()
            && self.suggested_action.is_none()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Cinegate Core.
#[derive(Error, Debug)]
pub struct CinegateError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-friendly error message (safe to expose to clients)
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// Additional structured details
    details: ErrorDetails,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for CinegateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl CinegateError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an internal error (500).
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::InternalError, "An internal error occurred", message)
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfiguration, message.into())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Upstream Errors
    // ─────────────────────────────────────────────────────────────────────────

    /// The metadata API could not be reached, timed out, or answered with a failure status.
    pub fn upstream_unavailable(reason: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::UpstreamUnavailable,
            "The metadata service is temporarily unavailable",
            reason,
        )
        .with_details(ErrorDetails::new().with_suggestion("Retry the request shortly"))
    }

    /// The metadata API answered with a payload that could not be understood.
    pub fn upstream_malformed(reason: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::UpstreamMalformed,
            "The metadata service returned an unexpected payload",
            reason,
        )
    }

    /// The metadata API does not know the requested resource.
    pub fn upstream_not_found(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(ErrorCode::UpstreamNotFound, "The requested title was not found")
            .with_details(ErrorDetails::new().with_entity("resource", &path))
    }

    /// The metadata API throttled this service (HTTP 429). Never retried internally.
    pub fn upstream_rate_limited(retry_after_secs: Option<u64>) -> Self {
        let mut details = ErrorDetails::new().with_suggestion("Slow down and retry later");
        if let Some(secs) = retry_after_secs {
            details = details.with_retry_after(secs);
        }
        Self::new(
            ErrorCode::UpstreamRateLimited,
            "The metadata service is rate limiting requests",
        )
        .with_details(details)
    }

    /// Admission control rejected the request.
    pub fn rate_limited(retry_after_ms: u64) -> Self {
        Self::new(ErrorCode::RateLimited, "Too many requests")
            .with_context("retry_after_ms", retry_after_ms)
            .with_details_retry_after(retry_after_ms.div_ceil(1000))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Replace error details, keeping any context already attached.
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        let context = std::mem::take(&mut self.details.context);
        self.details = details;
        for (key, value) in context {
            self.details.context.entry(key).or_insert(value);
        }
        self
    }

    /// Add context to details.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.context.insert(key.into(), v);
        }
        self
    }

    fn with_details_retry_after(mut self, seconds: u64) -> Self {
        self.details.retry_after_secs = Some(seconds.max(1));
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the user-friendly message.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Get the internal message (if any).
    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    /// Get the error details.
    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();
        let status = self.http_status().as_u16();

        match self.severity() {
            ErrorSeverity::Critical => {
                error!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    details = ?self.details,
                    source = ?self.source,
                    "CRITICAL ERROR"
                );
            }
            ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    "High severity error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    internal_message = ?self.internal_message,
                    "Medium severity error"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    "Low severity error"
                );
            }
        }
    }

    fn record_metrics(&self) {
        counter!(
            "cinegate_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
            "retryable" => self.is_retryable().to_string(),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// API Response
// ═══════════════════════════════════════════════════════════════════════════════

/// Error response for API clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Whether the request was successful (always false for errors)
    pub success: bool,

    /// Error information
    pub error: ErrorInfo,
}

/// Detailed error information for API responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// Numeric error code
    pub numeric_code: u32,

    /// User-friendly error message
    pub message: String,

    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,

    /// Timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&CinegateError> for ErrorResponse {
    fn from(error: &CinegateError) -> Self {
        Self {
            success: false,
            error: ErrorInfo {
                code: error.code,
                numeric_code: error.code.numeric_code(),
                message: error.user_message.to_string(),
                details: if error.details.is_empty() {
                    None
                } else {
                    Some(error.details.clone())
                },
                timestamp: chrono::Utc::now(),
            },
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Axum Integration
// ═══════════════════════════════════════════════════════════════════════════════

impl IntoResponse for CinegateError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.http_status();
        let body = ErrorResponse::from(&self);
        let mut response = (status, Json(body)).into_response();

        if let Some(secs) = self.details.retry_after_secs {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Context Extension Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Add context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with error code.
    fn with_error_code(self, code: ErrorCode) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| CinegateError::internal(message.into()).with_source(e))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.map_err(|e| CinegateError::new(code, e.to_string()).with_source(e))
    }
}

impl<T> ErrorContext<T> for Option<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| CinegateError::new(ErrorCode::MissingRequiredField, message.into()))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.ok_or_else(|| CinegateError::new(code, "Required value is missing"))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Common Error Types
// ═══════════════════════════════════════════════════════════════════════════════

impl From<redis::RedisError> for CinegateError {
    fn from(error: redis::RedisError) -> Self {
        let (code, user_msg) = if error.is_connection_refusal()
            || error.is_connection_dropped()
            || error.is_timeout()
            || error.is_io_error()
        {
            (ErrorCode::RemoteCacheUnavailable, "Remote cache is unreachable")
        } else {
            (ErrorCode::CacheError, "A cache error occurred")
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<serde_json::Error> for CinegateError {
    fn from(error: serde_json::Error) -> Self {
        let code = if error.is_syntax() || error.is_data() || error.is_eof() {
            ErrorCode::DeserializationError
        } else {
            ErrorCode::SerializationError
        };

        Self::with_internal(code, "Failed to process JSON data", error.to_string()).with_source(error)
    }
}

impl From<reqwest::Error> for CinegateError {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            match status.as_u16() {
                429 => return Self::upstream_rate_limited(None).with_source(error),
                404 => {
                    let path = error.url().map(|u| u.path().to_string()).unwrap_or_default();
                    return Self::upstream_not_found(path).with_source(error);
                }
                _ => {}
            }
        }

        let reason = if error.is_timeout() {
            "request timed out".to_string()
        } else if error.is_connect() {
            "connection failed".to_string()
        } else if error.is_decode() {
            return Self::upstream_malformed(error.to_string()).with_source(error);
        } else {
            error.to_string()
        };

        Self::upstream_unavailable(reason).with_source(error)
    }
}

impl From<tokio::time::error::Elapsed> for CinegateError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        Self::upstream_unavailable("operation timed out").with_source(error)
    }
}

impl From<std::io::Error> for CinegateError {
    fn from(error: std::io::Error) -> Self {
        Self::with_internal(ErrorCode::InternalError, "An I/O error occurred", error.to_string())
            .with_source(error)
    }
}

impl From<anyhow::Error> for CinegateError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<CinegateError>() {
            Ok(inner) => inner,
            Err(error) => Self::with_internal(
                ErrorCode::InternalError,
                "An internal error occurred",
                error.to_string(),
            ),
        }
    }
}

impl From<config::ConfigError> for CinegateError {
    fn from(error: config::ConfigError) -> Self {
        let (code, user_msg) = match &error {
            config::ConfigError::NotFound(_) => {
                (ErrorCode::MissingConfiguration, "Required configuration not found")
            }
            config::ConfigError::PathParse(_) | config::ConfigError::FileParse { .. } => {
                (ErrorCode::InvalidConfiguration, "Configuration file is invalid")
            }
            _ => (ErrorCode::ConfigurationError, "Configuration error occurred"),
        };
        Self::with_internal(code, user_msg, error.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(ErrorCode::UpstreamNotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::ValidationError.http_status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(ErrorCode::UpstreamMalformed.http_status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ErrorCode::UpstreamRateLimited.http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ErrorCode::RateLimited.http_status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_unavailable_class() {
        assert!(ErrorCode::UpstreamUnavailable.is_unavailable());
        assert!(ErrorCode::UpstreamRateLimited.is_unavailable());
        assert!(!ErrorCode::UpstreamMalformed.is_unavailable());
        assert!(!ErrorCode::UpstreamNotFound.is_unavailable());
    }

    #[test]
    fn test_error_code_is_retryable() {
        assert!(ErrorCode::UpstreamUnavailable.is_retryable());
        assert!(!ErrorCode::UpstreamMalformed.is_retryable());
        assert!(!ErrorCode::ValidationError.is_retryable());
    }

    #[test]
    fn test_error_context() {
        let error = CinegateError::new(ErrorCode::ValidationError, "Invalid input")
            .with_context("field", "season")
            .with_context("reason", "must be present for episodes");

        assert!(error.details().context.contains_key("field"));
        assert!(error.details().context.contains_key("reason"));
    }

    #[test]
    fn test_with_details_keeps_context() {
        let error = CinegateError::new(ErrorCode::UpstreamRateLimited, "slow down")
            .with_context("kind", "popular")
            .with_details(ErrorDetails::new().with_retry_after(7));

        assert_eq!(error.details().retry_after_secs, Some(7));
        assert!(error.details().context.contains_key("kind"));
    }

    #[test]
    fn test_rate_limited_rounds_retry_after_up() {
        let error = CinegateError::rate_limited(1_200);
        assert_eq!(error.details().retry_after_secs, Some(2));

        let error = CinegateError::rate_limited(10);
        assert_eq!(error.details().retry_after_secs, Some(1));
    }

    #[test]
    fn test_error_response_serialization() {
        let error = CinegateError::upstream_malformed("missing results array");
        let response = ErrorResponse::from(&error);
        let json = serde_json::to_string(&response).unwrap();

        assert!(json.contains("UPSTREAM_MALFORMED"));
        assert!(json.contains("1001"));
        assert!(!json.contains("missing results array"));
    }

    #[test]
    fn test_error_severity() {
        assert_eq!(
            ErrorSeverity::from_code(&ErrorCode::ValidationError),
            ErrorSeverity::Low
        );
        assert_eq!(
            ErrorSeverity::from_code(&ErrorCode::UpstreamUnavailable),
            ErrorSeverity::Medium
        );
        assert_eq!(
            ErrorSeverity::from_code(&ErrorCode::UpstreamMalformed),
            ErrorSeverity::High
        );
        assert_eq!(
            ErrorSeverity::from_code(&ErrorCode::InternalError),
            ErrorSeverity::Critical
        );
    }

    #[test]
    fn test_category() {
        assert_eq!(ErrorCode::UpstreamMalformed.category(), "upstream");
        assert_eq!(ErrorCode::RemoteCacheUnavailable.category(), "cache");
        assert_eq!(ErrorCode::InvalidConfiguration.category(), "configuration");
    }

    #[test]
    fn test_codes_have_known_categories_and_unique_numbers() {
        use ErrorCode::*;
        let codes = [
            UpstreamUnavailable,
            UpstreamMalformed,
            UpstreamNotFound,
            UpstreamRateLimited,
            RemoteCacheUnavailable,
            CacheError,
            SerializationError,
            DeserializationError,
            RateLimited,
            ValidationError,
            InvalidInput,
            MissingRequiredField,
            ConfigurationError,
            MissingConfiguration,
            InvalidConfiguration,
            InternalError,
            UnknownError,
        ];

        let mut numbers: Vec<u32> = codes.iter().map(|c| c.numeric_code()).collect();
        numbers.sort_unstable();
        numbers.dedup();
        assert_eq!(numbers.len(), codes.len());

        for code in codes {
            assert_ne!(code.category(), "unknown", "{} has no category", code);
        }
    }

    #[test]
    fn test_into_response_sets_retry_after() {
        let response = CinegateError::upstream_rate_limited(Some(30)).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "30");
    }

    #[test]
    fn test_option_context() {
        let missing: Option<u32> = None;
        let err = missing.context("season is required").unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingRequiredField);
    }
}
