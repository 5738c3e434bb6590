//! Configuration management.
//!
//! Configuration is layered: serde defaults, then an optional TOML file
//! (`CINEGATE_CONFIG` or `config/cinegate.toml`), then environment variables
//! of the form `CINEGATE__SECTION__KEY`.

use serde::Deserialize;
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::catalog::{CatalogConfig, UpstreamConfig};
use crate::error::{CinegateError, Result};
use crate::middleware::rate_limit::RateLimitConfig;
use crate::resolver::ResolverConfig;
use crate::telemetry::{LoggingConfig, MetricsConfig};

const ENV_PREFIX: &str = "CINEGATE";
const CONFIG_PATH_VAR: &str = "CINEGATE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/cinegate";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Tiered cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Redis (remote cache tier) configuration
    #[serde(default)]
    pub redis: RedisConfig,

    /// Metadata API configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Catalog TTL and stale-on-error policy
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Video host resolver configuration
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Admission control configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-check timeout for the health endpoints
    #[serde(default = "default_health_check_timeout", with = "humantime_serde")]
    pub health_check_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            health_check_timeout: default_health_check_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Whether the remote tier is used at all
    #[serde(default = "default_redis_enabled")]
    pub enabled: bool,

    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Timeout for establishing the connection
    #[serde(default = "default_redis_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: default_redis_enabled(),
            url: default_redis_url(),
            connect_timeout: default_redis_connect_timeout(),
        }
    }
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_health_check_timeout() -> Duration { Duration::from_secs(3) }
fn default_redis_enabled() -> bool { true }
fn default_redis_url() -> String { "redis://localhost:6379".to_string() }
fn default_redis_connect_timeout() -> Duration { Duration::from_secs(2) }

impl Config {
    /// Load configuration from the default file location and the environment.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::build(&path, false)
    }

    /// Load from a specific file path; the file must exist.
    pub fn from_file(path: &str) -> Result<Self> {
        Self::build(path, true)
    }

    fn build(path: &str, required: bool) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(required))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("catalog.stale_on_error")
                    .with_list_parse_key("rate_limit.trusted_proxy_headers")
                    .with_list_parse_key("logging.quiet_targets")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations that would make a component misbehave at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(CinegateError::configuration("server.port must be non-zero"));
        }
        if self.redis.enabled && redis::parse_redis_url(&self.redis.url).is_none() {
            return Err(CinegateError::configuration(format!(
                "redis.url is not a valid redis URL: {}",
                crate::telemetry::redact_secret(&self.redis.url)
            )));
        }
        self.cache.validate()?;
        self.upstream.validate()?;
        self.catalog.validate()?;
        self.resolver.validate()?;
        self.rate_limit.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert!(config.redis.enabled);
        assert!(config.catalog.stale_on_error.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9090

[redis]
enabled = false

[cache]
local_capacity = 64
stale_retention = "10m"

[catalog]
stale_on_error = ["popular", "top_rated"]

[catalog.ttl_overrides]
now_playing = "2m"

[rate_limit.catalog]
window = "1s"
max_requests = 3
"#
        )
        .unwrap();

        let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.server.port, 9090);
        assert!(!config.redis.enabled);
        assert_eq!(config.cache.local_capacity, 64);
        assert_eq!(config.cache.stale_retention, Duration::from_secs(600));
        assert_eq!(config.catalog.stale_on_error, vec!["popular", "top_rated"]);
        assert_eq!(
            config.catalog.ttl_override("now_playing"),
            Some(Duration::from_secs(120))
        );
        assert_eq!(config.rate_limit.catalog.window, Duration::from_secs(1));
        assert_eq!(config.rate_limit.catalog.max_requests, 3);
    }

    #[test]
    fn test_invalid_limiter_rejected() {
        let mut config = Config::default();
        config.rate_limit.playback.max_requests = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_redis_url_rejected() {
        let mut config = Config::default();
        config.redis.url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.redis.enabled = false;
        assert!(config.validate().is_ok());
    }
}
