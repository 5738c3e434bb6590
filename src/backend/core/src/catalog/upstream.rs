//! Metadata API transport.

use async_trait::async_trait;
use reqwest::{header, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::key::CatalogParams;
use crate::error::{CinegateError, Result};

/// Metadata API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API credential; a v4 read token is sent as a bearer token, a v3 key as `api_key`
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Language sent with every request unless the caller sets one
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_image_base_url")]
    pub image_base_url: String,

    #[serde(default = "default_poster_size")]
    pub poster_size: String,

    #[serde(default = "default_backdrop_size")]
    pub backdrop_size: String,

    #[serde(default = "default_profile_size")]
    pub profile_size: String,

    #[serde(default = "default_still_size")]
    pub still_size: String,
}

fn default_base_url() -> String { "https://api.themoviedb.org/3".to_string() }
fn default_timeout() -> Duration { Duration::from_secs(8) }
fn default_language() -> String { "en-US".to_string() }
fn default_image_base_url() -> String { "https://image.tmdb.org/t/p".to_string() }
fn default_poster_size() -> String { "w500".to_string() }
fn default_backdrop_size() -> String { "w1280".to_string() }
fn default_profile_size() -> String { "w185".to_string() }
fn default_still_size() -> String { "w300".to_string() }

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            timeout: default_timeout(),
            language: default_language(),
            image_base_url: default_image_base_url(),
            poster_size: default_poster_size(),
            backdrop_size: default_backdrop_size(),
            profile_size: default_profile_size(),
            still_size: default_still_size(),
        }
    }
}

impl UpstreamConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, url) in [("base_url", &self.base_url), ("image_base_url", &self.image_base_url)] {
            let parsed = Url::parse(url).map_err(|e| {
                CinegateError::configuration(format!("upstream.{} is not a valid URL: {}", name, e))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(CinegateError::configuration(format!(
                    "upstream.{} must be an http(s) URL",
                    name
                )));
            }
        }
        if self.timeout.is_zero() {
            return Err(CinegateError::configuration("upstream.timeout must be greater than 0"));
        }
        Ok(())
    }
}

/// Source of raw catalog JSON.
///
/// Implementations perform exactly one attempt per call; retries are the
/// caller's concern.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch_resource(&self, path: &str, params: &CatalogParams) -> Result<Value>;

    fn name(&self) -> &'static str;
}

/// TMDB-compatible metadata API client.
pub struct TmdbClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl TmdbClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("cinegate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CinegateError::configuration(format!("failed to build HTTP client: {}", e)))?;

        if config.api_key.is_none() {
            warn!("No metadata API credential configured, upstream requests will likely be rejected");
        }

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
        })
    }

    /// v4 read access tokens are JWTs; v3 keys are short hex strings.
    fn is_bearer_token(key: &str) -> bool {
        key.starts_with("eyJ") || key.len() > 64
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl MetadataSource for TmdbClient {
    async fn fetch_resource(&self, path: &str, params: &CatalogParams) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .client
            .get(&url)
            .header(header::ACCEPT, "application/json")
            .query(&params.iter().collect::<Vec<_>>());

        match self.api_key.as_deref() {
            Some(key) if Self::is_bearer_token(key) => request = request.bearer_auth(key),
            Some(key) => request = request.query(&[("api_key", key)]),
            None => {}
        }

        let response = request.send().await?;
        let status = response.status();
        debug!(path = %path, status = status.as_u16(), "Metadata API responded");

        match status {
            s if s.is_success() => {}
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok());
                return Err(CinegateError::upstream_rate_limited(retry_after)
                    .with_context("path", path));
            }
            StatusCode::NOT_FOUND => return Err(CinegateError::upstream_not_found(path)),
            s => {
                return Err(CinegateError::upstream_unavailable(format!(
                    "metadata API returned {} for {}",
                    s, path
                )));
            }
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| {
            CinegateError::upstream_malformed(format!("invalid JSON from {}: {}", path, e))
        })
    }

    fn name(&self) -> &'static str {
        "tmdb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_detection() {
        assert!(TmdbClient::is_bearer_token("eyJhbGciOiJIUzI1NiJ9.payload.sig"));
        assert!(!TmdbClient::is_bearer_token("0123456789abcdef0123456789abcdef"));
    }

    #[test]
    fn test_validate_rejects_bad_urls() {
        let mut config = UpstreamConfig::default();
        assert!(config.validate().is_ok());

        config.base_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());

        config.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }
}
