//! Structured logging with JSON/pretty formats and third-party noise control.
//!
//! Logging state is process-wide and owned by a [`LoggingGuard`]:
//!
//! - [`init_logging`] installs the subscriber once; a second call returns an error
//! - noisy dependency targets are capped through [`LoggingConfig::quiet_targets`]
//!   as ordinary `EnvFilter` directives
//! - dropping the guard flushes the optional OTLP exporter

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

static OTLP_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Global log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty, compact)
    #[serde(default)]
    pub format: LogFormat,

    /// Per-module log levels
    #[serde(default)]
    pub module_levels: HashMap<String, String>,

    /// Dependency targets capped at `quiet_level`
    #[serde(default = "default_quiet_targets")]
    pub quiet_targets: Vec<String>,

    /// Level applied to `quiet_targets`
    #[serde(default = "default_quiet_level")]
    pub quiet_level: String,

    /// Whether to include file/line information
    #[serde(default)]
    pub include_location: bool,

    /// Whether to include target (module path)
    #[serde(default = "default_include_target")]
    pub include_target: bool,

    /// Log span close events (with timings)
    #[serde(default)]
    pub span_close_events: bool,

    /// OTLP collector endpoint; spans are exported when set
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    /// Service name reported to the collector
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            module_levels: HashMap::new(),
            quiet_targets: default_quiet_targets(),
            quiet_level: default_quiet_level(),
            include_location: false,
            include_target: default_include_target(),
            span_close_events: false,
            otlp_endpoint: None,
            service_name: default_service_name(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format for production/structured logging
    #[default]
    Json,
    /// Pretty format for development
    Pretty,
    /// Compact single-line format
    Compact,
}

fn default_log_level() -> String {
    std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
}

fn default_quiet_targets() -> Vec<String> {
    ["hyper", "reqwest", "redis", "h2", "rustls", "tower_http"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_quiet_level() -> String {
    "warn".to_string()
}

fn default_include_target() -> bool {
    true
}

fn default_service_name() -> String {
    "cinegate".to_string()
}

/// Build the filter: global level, then quiet targets, then explicit module levels.
///
/// Explicit `module_levels` win over `quiet_targets` for the same target.
pub fn build_env_filter(config: &LoggingConfig) -> anyhow::Result<EnvFilter> {
    let mut filter = EnvFilter::try_new(&config.level)?;

    for target in &config.quiet_targets {
        if config.module_levels.contains_key(target) {
            continue;
        }
        let directive = format!("{}={}", target, config.quiet_level);
        filter = filter.add_directive(directive.parse()?);
    }

    for (module, level) in &config.module_levels {
        let directive = format!("{}={}", module, level);
        filter = filter.add_directive(directive.parse()?);
    }

    Ok(filter)
}

/// Owns the process-wide logging state.
///
/// Dropping the guard flushes and shuts down the span exporter.
#[must_use = "dropping the guard tears down span export"]
#[derive(Debug)]
pub struct LoggingGuard {
    otlp: bool,
}

impl LoggingGuard {
    /// Whether spans are being exported over OTLP.
    pub fn exports_spans(&self) -> bool {
        self.otlp
    }
}

impl Drop for LoggingGuard {
    fn drop(&mut self) {
        if self.otlp && OTLP_INSTALLED.swap(false, Ordering::SeqCst) {
            opentelemetry::global::shutdown_tracer_provider();
        }
    }
}

fn build_tracer(
    endpoint: &str,
    service_name: &str,
) -> anyhow::Result<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry_otlp::WithExportConfig;

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .with_trace_config(opentelemetry_sdk::trace::config().with_resource(
            opentelemetry_sdk::Resource::new(vec![
                opentelemetry::KeyValue::new("service.name", service_name.to_string()),
                opentelemetry::KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            ]),
        ))
        .install_batch(opentelemetry_sdk::runtime::Tokio)?;

    Ok(tracer)
}

/// Initialize the logging subsystem.
///
/// # Errors
///
/// Returns an error if a filter directive is invalid or a global subscriber is
/// already installed.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    let filter = build_env_filter(config)?;

    let tracer = match config.otlp_endpoint.as_deref() {
        Some(endpoint) => Some(build_tracer(endpoint, &config.service_name)?),
        None => None,
    };
    let otlp = tracer.is_some();
    let otel_layer = tracer.map(|t| tracing_opentelemetry::layer().with_tracer(t));

    let span_events = if config.span_close_events {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    match config.format {
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_span_events(span_events)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_target(config.include_target);

            tracing_subscriber::registry()
                .with(filter)
                .with(otel_layer)
                .with(fmt_layer)
                .try_init()?;
        }
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .pretty()
                .with_span_events(span_events)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_target(config.include_target);

            tracing_subscriber::registry()
                .with(filter)
                .with(otel_layer)
                .with(fmt_layer)
                .try_init()?;
        }
        LogFormat::Compact => {
            let fmt_layer = fmt::layer()
                .compact()
                .with_span_events(span_events)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_target(config.include_target);

            tracing_subscriber::registry()
                .with(filter)
                .with(otel_layer)
                .with(fmt_layer)
                .try_init()?;
        }
    }

    if otlp {
        OTLP_INSTALLED.store(true, Ordering::SeqCst);
    }

    Ok(LoggingGuard { otlp })
}

/// Mask credentials before they reach a log line.
///
/// URL passwords become `***`; bare secrets keep only their last four characters.
pub fn redact_secret(value: &str) -> String {
    if let Ok(mut url) = reqwest::Url::parse(value) {
        if url.password().is_some() && url.set_password(Some("***")).is_ok() {
            return url.to_string();
        }
        if url.has_host() {
            return value.to_string();
        }
    }

    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return "***".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("***{}", tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.quiet_targets.iter().any(|t| t == "hyper"));
        assert!(config.otlp_endpoint.is_none());
    }

    #[test]
    fn test_quiet_targets_become_directives() {
        let config = LoggingConfig {
            level: "info".to_string(),
            ..Default::default()
        };
        let filter = build_env_filter(&config).unwrap().to_string();

        assert!(filter.contains("hyper=warn"));
        assert!(filter.contains("reqwest=warn"));
    }

    #[test]
    fn test_module_levels_override_quiet_targets() {
        let mut config = LoggingConfig {
            level: "info".to_string(),
            ..Default::default()
        };
        config
            .module_levels
            .insert("reqwest".to_string(), "debug".to_string());

        let filter = build_env_filter(&config).unwrap().to_string();
        assert!(filter.contains("reqwest=debug"));
        assert!(!filter.contains("reqwest=warn"));
    }

    #[test]
    fn test_invalid_level_rejected() {
        let mut config = LoggingConfig::default();
        config
            .module_levels
            .insert("cinegate_core".to_string(), "loud".to_string());
        assert!(build_env_filter(&config).is_err());
    }

    #[test]
    fn test_redact_secret() {
        assert_eq!(
            redact_secret("redis://:hunter2@cache.internal:6379"),
            "redis://:***@cache.internal:6379"
        );
        assert_eq!(redact_secret("redis://localhost:6379"), "redis://localhost:6379");
        assert_eq!(redact_secret("abcdef0123456789"), "***6789");
        assert_eq!(redact_secret("short"), "***");
    }
}
