//! Health status and report types.
//!
//! - **Healthy**: fully operational
//! - **Degraded**: serving, but with reduced capability (e.g. cache running on the local tier only)
//! - **Unhealthy**: not serving

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::cache::CacheHealth;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_operational(&self) -> bool {
        !matches!(self, Self::Unhealthy)
    }

    /// The worse of two statuses.
    pub fn combine(self, other: Self) -> Self {
        match (self, other) {
            (Self::Unhealthy, _) | (_, Self::Unhealthy) => Self::Unhealthy,
            (Self::Degraded, _) | (_, Self::Degraded) => Self::Degraded,
            _ => Self::Healthy,
        }
    }

    pub fn http_status(&self) -> axum::http::StatusCode {
        if self.is_operational() {
            axum::http::StatusCode::OK
        } else {
            axum::http::StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        })
    }
}

/// Result of checking one component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    pub checked_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ComponentHealth {
    pub fn new(name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
            message: None,
            latency_ms: None,
            checked_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn healthy(name: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Healthy)
    }

    pub fn degraded(name: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Degraded)
    }

    pub fn unhealthy(name: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Unhealthy)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency_ms = Some(latency.as_millis() as u64);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.metadata.insert(key.into(), v);
        }
        self
    }
}

/// Aggregated report served at `/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_secs: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ComponentHealth>,
    /// Cache health surface, when a cache is attached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheHealth>,
}

impl HealthReport {
    pub fn new(service: impl Into<String>, uptime: Duration) -> Self {
        Self {
            status: HealthStatus::Healthy,
            service: service.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            uptime_secs: uptime.as_secs(),
            components: Vec::new(),
            cache: None,
        }
    }

    pub fn with_components(mut self, components: Vec<ComponentHealth>) -> Self {
        for component in components {
            self.status = self.status.combine(component.status);
            self.components.push(component);
        }
        self
    }

    pub fn with_cache(mut self, cache: CacheHealth) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn is_operational(&self) -> bool {
        self.status.is_operational()
    }

    pub fn component(&self, name: &str) -> Option<&ComponentHealth> {
        self.components.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResponse {
    pub alive: bool,
    pub timestamp: DateTime<Utc>,
}

impl LivenessResponse {
    pub fn alive() -> Self {
        Self {
            alive: true,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unready_components: Vec<String>,
}

impl ReadinessResponse {
    pub fn from_report(report: &HealthReport) -> Self {
        Self {
            ready: report.is_operational(),
            timestamp: Utc::now(),
            unready_components: report
                .components
                .iter()
                .filter(|c| !c.status.is_operational())
                .map(|c| c.name.clone())
                .collect(),
        }
    }
}
