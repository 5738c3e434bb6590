//! Catalog aggregation over the metadata API.
//!
//! [`CatalogAggregator::fetch`] looks a request up in the [`TieredCache`]
//! under a deterministic key, falls through to the [`MetadataSource`] on a
//! miss, transforms and validates the payload, and stores it with a TTL chosen
//! by the endpoint's volatility.
//!
//! When the upstream is unavailable and the endpoint kind is listed in
//! `catalog.stale_on_error`, the last retained value is served instead,
//! flagged as stale.

pub mod endpoint;
pub mod key;
pub mod upstream;

pub use endpoint::{EndpointKind, MediaType, PayloadShape, TimeWindow, Volatility};
pub use key::{CacheKeyBuilder, CatalogParams};
pub use upstream::{MetadataSource, TmdbClient, UpstreamConfig};

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::cache::TieredCache;
use crate::clock::Clock;
use crate::error::{CinegateError, Result};

/// Catalog cache policy.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogConfig {
    /// TTL per kind name, replacing the built-in default
    #[serde(default)]
    pub ttl_overrides: HashMap<String, humantime_serde::Serde<Duration>>,

    /// Kind names allowed to serve stale values while the upstream is unavailable
    #[serde(default)]
    pub stale_on_error: Vec<String>,
}

impl CatalogConfig {
    pub fn ttl_override(&self, kind: &str) -> Option<Duration> {
        self.ttl_overrides.get(kind).map(|ttl| **ttl)
    }

    pub fn stale_enabled(&self, kind: &str) -> bool {
        self.stale_on_error.iter().any(|k| k == kind)
    }

    pub fn validate(&self) -> Result<()> {
        let unknown = self
            .ttl_overrides
            .keys()
            .chain(self.stale_on_error.iter())
            .find(|name| !EndpointKind::NAMES.contains(&name.as_str()));
        if let Some(name) = unknown {
            return Err(CinegateError::configuration(format!(
                "unknown catalog endpoint kind '{}' in catalog config",
                name
            )));
        }
        if let Some((name, _)) = self.ttl_overrides.iter().find(|(_, ttl)| ttl.is_zero()) {
            return Err(CinegateError::configuration(format!(
                "catalog.ttl_overrides.{} must be greater than 0",
                name
            )));
        }
        Ok(())
    }
}

/// Where a payload was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadSource {
    Cache,
    Upstream,
    Stale,
}

impl PayloadSource {
    /// Value of the `X-Cache` response header.
    pub fn cache_status(&self) -> &'static str {
        match self {
            Self::Cache => "HIT",
            Self::Upstream => "MISS",
            Self::Stale => "STALE",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogPayload {
    pub kind: String,
    pub cache_key: String,
    pub data: Value,
    pub source: PayloadSource,
    pub stale: bool,
    /// When the data was fetched from the upstream
    pub fetched_at: DateTime<Utc>,
}

/// Value stored in the cache for one catalog key.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedCatalog {
    data: Value,
    fetched_at: DateTime<Utc>,
}

/// Image sizes used to build absolute artwork URLs.
#[derive(Debug, Clone)]
struct ImageUrls {
    base: String,
    poster: String,
    backdrop: String,
    profile: String,
    still: String,
}

impl ImageUrls {
    fn from_config(config: &UpstreamConfig) -> Self {
        Self {
            base: config.image_base_url.trim_end_matches('/').to_string(),
            poster: config.poster_size.clone(),
            backdrop: config.backdrop_size.clone(),
            profile: config.profile_size.clone(),
            still: config.still_size.clone(),
        }
    }

    fn url(&self, size: &str, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}/{}{}", self.base, size, path)
        } else {
            format!("{}/{}/{}", self.base, size, path)
        }
    }

    /// Add `*_url` siblings to every `*_path` artwork field, a few levels deep.
    fn annotate(&self, value: &mut Value, depth: usize) {
        if depth == 0 {
            return;
        }
        match value {
            Value::Array(items) => {
                for item in items {
                    self.annotate(item, depth - 1);
                }
            }
            Value::Object(map) => {
                let fields = [
                    ("poster_path", "poster_url", &self.poster),
                    ("backdrop_path", "backdrop_url", &self.backdrop),
                    ("profile_path", "profile_url", &self.profile),
                    ("still_path", "still_url", &self.still),
                ];
                for (path_field, url_field, size) in fields {
                    let url = match map.get(path_field) {
                        Some(Value::String(path)) if !path.is_empty() => Some(self.url(size, path)),
                        _ => None,
                    };
                    if let Some(url) = url {
                        map.insert(url_field.to_string(), Value::String(url));
                    }
                }
                for child in map.values_mut() {
                    if child.is_array() || child.is_object() {
                        self.annotate(child, depth - 1);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Check the payload shape for `kind` and annotate artwork URLs.
fn transform(kind: &EndpointKind, mut raw: Value, images: &ImageUrls) -> Result<Value> {
    let valid = match kind.shape() {
        PayloadShape::List => raw.get("results").is_some_and(Value::is_array),
        PayloadShape::Genres => raw.get("genres").is_some_and(Value::is_array),
        PayloadShape::Object => raw.is_object(),
    };
    if !valid {
        return Err(CinegateError::upstream_malformed(format!(
            "unexpected payload shape for '{}'",
            kind
        )));
    }

    images.annotate(&mut raw, 4);
    Ok(raw)
}

pub struct CatalogAggregator {
    source: Arc<dyn MetadataSource>,
    cache: Arc<TieredCache>,
    config: CatalogConfig,
    images: ImageUrls,
    language: String,
    clock: Arc<dyn Clock>,
}

impl CatalogAggregator {
    pub fn new(
        source: Arc<dyn MetadataSource>,
        cache: Arc<TieredCache>,
        config: CatalogConfig,
        upstream: &UpstreamConfig,
    ) -> Self {
        Self {
            source,
            clock: cache.clock(),
            cache,
            config,
            images: ImageUrls::from_config(upstream),
            language: upstream.language.clone(),
        }
    }

    pub fn ttl_for(&self, kind: &EndpointKind) -> Duration {
        self.config
            .ttl_override(kind.name())
            .unwrap_or_else(|| kind.default_ttl())
    }

    fn effective_params(&self, params: CatalogParams) -> CatalogParams {
        params.with_default("language", &self.language)
    }

    /// The cache key `fetch` uses for this request.
    pub fn cache_key(&self, kind: &EndpointKind, params: &CatalogParams) -> String {
        CacheKeyBuilder::catalog(kind, &self.effective_params(params.clone()))
    }

    #[instrument(skip(self, kind, params), fields(kind = %kind))]
    pub async fn fetch(&self, kind: EndpointKind, params: CatalogParams) -> Result<CatalogPayload> {
        if kind.requires_query() && params.get("query").is_none() {
            return Err(CinegateError::validation("search requires a non-empty 'query' parameter"));
        }

        let params = self.effective_params(params);
        let cache_key = CacheKeyBuilder::catalog(&kind, &params);

        if let Some(cached) = self.cache.get::<CachedCatalog>(&cache_key).await {
            counter!("catalog_upstream_requests_total", "kind" => kind.name(), "outcome" => "cached").increment(1);
            return Ok(self.payload(&kind, cache_key, cached, PayloadSource::Cache));
        }

        let fetched = self
            .source
            .fetch_resource(&kind.upstream_path(), &params)
            .await
            .and_then(|raw| transform(&kind, raw, &self.images));

        match fetched {
            Ok(data) => {
                counter!("catalog_upstream_requests_total", "kind" => kind.name(), "outcome" => "ok").increment(1);
                let cached = CachedCatalog {
                    data,
                    fetched_at: self.clock.now(),
                };
                let ttl = self.ttl_for(&kind);
                if let Err(e) = self.cache.set(&cache_key, &cached, ttl).await {
                    warn!(error = %e, key = %cache_key, "Failed to cache catalog payload");
                }
                debug!(key = %cache_key, ttl_secs = ttl.as_secs(), "Fetched catalog payload from upstream");
                Ok(self.payload(&kind, cache_key, cached, PayloadSource::Upstream))
            }
            Err(e) => {
                counter!(
                    "catalog_upstream_requests_total",
                    "kind" => kind.name(),
                    "outcome" => e.code().category()
                )
                .increment(1);

                if e.code().is_unavailable() && self.config.stale_enabled(kind.name()) {
                    if let Some(stale) = self.cache.get_stale::<CachedCatalog>(&cache_key).await {
                        warn!(
                            key = %cache_key,
                            error = %e,
                            stored_at = %stale.stored_at,
                            "Upstream unavailable, serving stale catalog payload"
                        );
                        counter!("catalog_stale_served_total", "kind" => kind.name()).increment(1);
                        return Ok(self.payload(&kind, cache_key, stale.value, PayloadSource::Stale));
                    }
                }
                Err(e)
            }
        }
    }

    fn payload(
        &self,
        kind: &EndpointKind,
        cache_key: String,
        cached: CachedCatalog,
        source: PayloadSource,
    ) -> CatalogPayload {
        CatalogPayload {
            kind: kind.name().to_string(),
            cache_key,
            data: cached.data,
            source,
            stale: source == PayloadSource::Stale,
            fetched_at: cached.fetched_at,
        }
    }

    /// Drop the cached payload for this request.
    pub async fn invalidate(&self, kind: &EndpointKind, params: &CatalogParams) -> String {
        let key = self.cache_key(kind, params);
        self.cache.invalidate(&key).await;
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn images() -> ImageUrls {
        ImageUrls::from_config(&UpstreamConfig::default())
    }

    #[test]
    fn test_transform_annotates_artwork() {
        let raw = json!({
            "page": 1,
            "results": [{"id": 1, "poster_path": "/p.jpg", "backdrop_path": null}]
        });
        let out = transform(&EndpointKind::Popular(MediaType::Movie), raw, &images()).unwrap();

        assert_eq!(out["results"][0]["poster_url"], "https://image.tmdb.org/t/p/w500/p.jpg");
        assert!(out["results"][0].get("backdrop_url").is_none());
    }

    #[test]
    fn test_transform_annotates_nested_credits() {
        let raw = json!({"id": 5, "cast": [{"name": "A", "profile_path": "/a.jpg"}]});
        let out = transform(&EndpointKind::Credits(MediaType::Movie, 5), raw, &images()).unwrap();
        assert_eq!(out["cast"][0]["profile_url"], "https://image.tmdb.org/t/p/w185/a.jpg");
    }

    #[test]
    fn test_transform_rejects_wrong_shape() {
        let err = transform(&EndpointKind::Popular(MediaType::Tv), json!({"items": []}), &images()).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::UpstreamMalformed);

        let err = transform(&EndpointKind::Genres(MediaType::Tv), json!([]), &images()).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::UpstreamMalformed);
    }

    #[test]
    fn test_config_validation() {
        let mut config = CatalogConfig::default();
        config.stale_on_error.push("popular".to_string());
        assert!(config.validate().is_ok());

        config.stale_on_error.push("most_viewed".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cache_status_header_values() {
        assert_eq!(PayloadSource::Cache.cache_status(), "HIT");
        assert_eq!(PayloadSource::Upstream.cache_status(), "MISS");
        assert_eq!(PayloadSource::Stale.cache_status(), "STALE");
    }
}
