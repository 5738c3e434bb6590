//! Telemetry: structured logging, span export and Prometheus metrics.
//!
//! # Example
//!
//! ```rust,no_run
//! use cinegate_core::telemetry::{init_telemetry, LoggingConfig, MetricsConfig};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let handle = init_telemetry(&LoggingConfig::default(), &MetricsConfig::default())?;
//! // ... serve ...
//! handle.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{build_env_filter, init_logging, redact_secret, LogFormat, LoggingConfig, LoggingGuard};
pub use metrics::{init_metrics, prometheus_metrics, MetricsConfig, MetricsRegistry, RequestTimer};

/// Initialize logging and metrics.
///
/// Must be called once, from inside the Tokio runtime when span export is configured.
pub fn init_telemetry(
    logging: &LoggingConfig,
    metrics: &MetricsConfig,
) -> anyhow::Result<TelemetryHandle> {
    let guard = init_logging(logging)?;
    init_metrics(metrics)?;
    Ok(TelemetryHandle { logging: guard })
}

/// Handle for managing telemetry lifecycle.
pub struct TelemetryHandle {
    logging: LoggingGuard,
}

impl TelemetryHandle {
    /// Flush exporters and tear down process-wide telemetry state.
    pub fn shutdown(self) {
        let exported = self.logging.exports_spans();
        drop(self.logging);
        ::tracing::info!(span_export = exported, "Telemetry shutdown complete");
    }
}
