//! Video source resolution.
//!
//! The video host exposes no API: each title has a player page whose markup
//! varies across pages and over time. [`VideoSourceResolver::resolve`] fetches
//! that page with a browser-like identity, runs the [`ExtractorChain`] over the
//! body and normalizes the winning capture into an absolute stream URL.
//!
//! Outcomes are values, not errors:
//!
//! | Situation                               | Result                          |
//! |-----------------------------------------|---------------------------------|
//! | page loaded, a pattern matched          | `Resolution::Found`             |
//! | page loaded, nothing matched            | `Resolution::NotFound`          |
//! | network error, timeout, non-2xx status  | `Resolution::Unavailable`       |
//! | invalid request                         | `Err(ValidationError)`          |

pub mod extractor;

pub use extractor::{ExtractionPattern, ExtractorChain, ExtractorKind, PatternConfig};

use metrics::{counter, histogram};
use reqwest::{header, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use crate::error::{CinegateError, Result};
use crate::middleware::rate_limit::SlidingWindowLimiter;

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    /// Video host base URL; pages live at `{base}/movie/{id}` and `{base}/tv/{id}/{s}/{e}`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Sent on every request; the host rejects unidentified clients
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_accept_language")]
    pub accept_language: String,

    #[serde(default)]
    pub referer: Option<String>,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default = "default_probe_timeout", with = "humantime_serde")]
    pub probe_timeout: Duration,

    /// Page bodies beyond this size are truncated before extraction
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Replaces the built-in extractor chain when set
    #[serde(default)]
    pub patterns: Option<Vec<PatternConfig>>,
}

fn default_base_url() -> String { "https://vidsrc.xyz/embed".to_string() }
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36"
        .to_string()
}
fn default_accept_language() -> String { "en-US,en;q=0.9".to_string() }
fn default_timeout() -> Duration { Duration::from_secs(10) }
fn default_probe_timeout() -> Duration { Duration::from_secs(5) }
fn default_max_body_bytes() -> usize { 2 * 1024 * 1024 }

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            accept_language: default_accept_language(),
            referer: None,
            timeout: default_timeout(),
            probe_timeout: default_probe_timeout(),
            max_body_bytes: default_max_body_bytes(),
            patterns: None,
        }
    }
}

impl ResolverConfig {
    pub fn validate(&self) -> Result<()> {
        let base = Url::parse(&self.base_url).map_err(|e| {
            CinegateError::configuration(format!("resolver.base_url is not a valid URL: {}", e))
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(CinegateError::configuration("resolver.base_url must be an http(s) URL"));
        }
        if self.user_agent.trim().is_empty() {
            return Err(CinegateError::configuration("resolver.user_agent must not be empty"));
        }
        if self.timeout.is_zero() || self.probe_timeout.is_zero() {
            return Err(CinegateError::configuration("resolver timeouts must be greater than 0"));
        }
        if self.max_body_bytes == 0 {
            return Err(CinegateError::configuration("resolver.max_body_bytes must be greater than 0"));
        }
        ExtractorChain::from_config(self.patterns.as_deref())?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Request and Result Types
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Episode,
}

/// What to resolve. Season 0 holds specials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackRequest {
    pub external_id: u64,
    pub media_kind: MediaKind,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

impl PlaybackRequest {
    pub fn movie(external_id: u64) -> Self {
        Self {
            external_id,
            media_kind: MediaKind::Movie,
            season: None,
            episode: None,
        }
    }

    pub fn episode(external_id: u64, season: u32, episode: u32) -> Self {
        Self {
            external_id,
            media_kind: MediaKind::Episode,
            season: Some(season),
            episode: Some(episode),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.external_id == 0 {
            return Err(CinegateError::validation("external id must be positive"));
        }
        if self.media_kind == MediaKind::Episode {
            if self.season.is_none() {
                return Err(CinegateError::validation("episode requests require a season"));
            }
            match self.episode {
                Some(episode) if episode >= 1 => {}
                Some(_) => return Err(CinegateError::validation("episode numbers start at 1")),
                None => return Err(CinegateError::validation("episode requests require an episode")),
            }
        }
        Ok(())
    }

    /// Canonical player page URL on the video host.
    pub fn page_url(&self, base_url: &str) -> Result<String> {
        self.validate()?;
        let base = base_url.trim_end_matches('/');
        Ok(match (self.media_kind, self.season, self.episode) {
            (MediaKind::Episode, Some(season), Some(episode)) => {
                format!("{}/tv/{}/{}/{}", base, self.external_id, season, episode)
            }
            _ => format!("{}/movie/{}", base, self.external_id),
        })
    }
}

/// Quality inferred from the stream URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "2160p")]
    Uhd,
    #[serde(rename = "1080p")]
    FullHd,
    #[serde(rename = "720p")]
    Hd,
    #[serde(rename = "480p")]
    Sd,
    #[serde(rename = "360p")]
    Low,
    #[serde(rename = "auto")]
    Auto,
}

impl Quality {
    pub fn from_url(url: &str) -> Self {
        url.to_ascii_lowercase()
            .split(|c: char| !c.is_ascii_alphanumeric())
            .find_map(|token| match token {
                "2160p" | "4k" | "uhd" => Some(Self::Uhd),
                "1080p" | "fhd" => Some(Self::FullHd),
                "720p" | "hd" => Some(Self::Hd),
                "480p" | "sd" => Some(Self::Sd),
                "360p" => Some(Self::Low),
                _ => None,
            })
            .unwrap_or(Self::Auto)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSource {
    pub stream_url: String,
    pub quality: Quality,
    pub media_kind: MediaKind,
    pub external_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode: Option<u32>,
    pub page_url: String,
    pub extractor: String,
    /// `None` when not probed, or when the probe was rate limited
    pub probed_available: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Resolution {
    Found(ResolvedSource),
    NotFound { page_url: String },
    Unavailable {
        page_url: String,
        reason: String,
        /// HTTP status from the host, when it answered at all
        #[serde(skip_serializing_if = "Option::is_none")]
        http_status: Option<u16>,
    },
}

impl Resolution {
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Found(_) => "found",
            Self::NotFound { .. } => "not_found",
            Self::Unavailable { .. } => "unavailable",
        }
    }

    pub fn page_url(&self) -> &str {
        match self {
            Self::Found(source) => &source.page_url,
            Self::NotFound { page_url } | Self::Unavailable { page_url, .. } => page_url,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOptions {
    /// HEAD the canonical page once a stream is found
    pub probe: bool,
}

struct FetchFailure {
    reason: String,
    status: Option<u16>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Resolver
// ═══════════════════════════════════════════════════════════════════════════════

pub struct VideoSourceResolver {
    client: reqwest::Client,
    config: ResolverConfig,
    origin: Url,
    chain: ExtractorChain,
    probe_limiter: Option<Arc<SlidingWindowLimiter>>,
}

impl VideoSourceResolver {
    pub fn new(config: ResolverConfig) -> Result<Self> {
        config.validate()?;
        let chain = ExtractorChain::from_config(config.patterns.as_deref())?;

        let mut origin = Url::parse(&config.base_url).map_err(|e| {
            CinegateError::configuration(format!("resolver.base_url is not a valid URL: {}", e))
        })?;
        origin.set_path("/");
        origin.set_query(None);
        origin.set_fragment(None);

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CinegateError::configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            origin,
            chain,
            probe_limiter: None,
        })
    }

    /// Gate availability probes behind a limiter.
    pub fn with_probe_limiter(mut self, limiter: Arc<SlidingWindowLimiter>) -> Self {
        self.probe_limiter = Some(limiter);
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn page_url(&self, request: &PlaybackRequest) -> Result<String> {
        request.page_url(&self.config.base_url)
    }

    fn browser_request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .request(method, url)
            .header(header::USER_AGENT, &self.config.user_agent)
            .header(header::ACCEPT, "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header(header::ACCEPT_LANGUAGE, &self.config.accept_language);
        if let Some(referer) = &self.config.referer {
            request = request.header(header::REFERER, referer);
        }
        request
    }

    #[instrument(skip(self))]
    async fn fetch_page(&self, page_url: &str) -> std::result::Result<String, FetchFailure> {
        let started = Instant::now();
        let result = self.fetch_page_inner(page_url).await;
        histogram!("resolver_fetch_duration_seconds").record(started.elapsed().as_secs_f64());
        result
    }

    async fn fetch_page_inner(&self, page_url: &str) -> std::result::Result<String, FetchFailure> {
        let mut response = self
            .browser_request(reqwest::Method::GET, page_url)
            .send()
            .await
            .map_err(|e| FetchFailure {
                reason: describe_transport_error(&e),
                status: None,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure {
                reason: format!("video host returned {}", status),
                status: Some(status.as_u16()),
            });
        }

        let limit = self.config.max_body_bytes;
        let mut body = Vec::new();
        loop {
            let chunk = response.chunk().await.map_err(|e| FetchFailure {
                reason: describe_transport_error(&e),
                status: Some(status.as_u16()),
            })?;
            let Some(chunk) = chunk else { break };

            let room = limit.saturating_sub(body.len());
            if chunk.len() >= room {
                body.extend_from_slice(&chunk[..room]);
                debug!(limit = limit, "Page body truncated");
                break;
            }
            body.extend_from_slice(&chunk);
        }

        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Resolve a playable stream for the request.
    #[instrument(skip(self, request, options), fields(external_id = request.external_id, kind = ?request.media_kind))]
    pub async fn resolve(&self, request: &PlaybackRequest, options: ResolveOptions) -> Result<Resolution> {
        let page_url = self.page_url(request)?;

        let html = match self.fetch_page(&page_url).await {
            Ok(html) => html,
            Err(failure) => {
                warn!(page_url = %page_url, reason = %failure.reason, "Video host unavailable");
                counter!("resolver_outcomes_total", "outcome" => "unavailable", "extractor" => "none").increment(1);
                return Ok(Resolution::Unavailable {
                    page_url,
                    reason: failure.reason,
                    http_status: failure.status,
                });
            }
        };

        let Some(extracted) = self.chain.find(&html, &self.origin) else {
            debug!(page_url = %page_url, body_len = html.len(), "No extractor matched");
            counter!("resolver_outcomes_total", "outcome" => "not_found", "extractor" => "none").increment(1);
            return Ok(Resolution::NotFound { page_url });
        };

        counter!(
            "resolver_outcomes_total",
            "outcome" => "found",
            "extractor" => extracted.kind.as_str()
        )
        .increment(1);
        debug!(extractor = %extracted.pattern, "Resolved stream URL");

        let stream_url = extracted.url.to_string();
        let probed_available = if options.probe {
            self.limited_probe(&page_url).await
        } else {
            None
        };

        Ok(Resolution::Found(ResolvedSource {
            quality: Quality::from_url(&stream_url),
            stream_url,
            media_kind: request.media_kind,
            external_id: request.external_id,
            season: request.season,
            episode: request.episode,
            page_url,
            extractor: extracted.pattern,
            probed_available,
        }))
    }

    /// HEAD the URL; true iff the host answers 200.
    #[instrument(skip(self))]
    pub async fn probe(&self, url: &str) -> bool {
        let result = self
            .browser_request(reqwest::Method::HEAD, url)
            .timeout(self.config.probe_timeout)
            .send()
            .await;

        let available = match result {
            Ok(response) => response.status() == StatusCode::OK,
            Err(e) => {
                debug!(error = %describe_transport_error(&e), "Availability probe failed");
                false
            }
        };
        counter!("resolver_probes_total", "available" => if available { "true" } else { "false" }).increment(1);
        available
    }

    /// Probe the canonical page for the request.
    pub async fn probe_page(&self, request: &PlaybackRequest) -> Result<bool> {
        let page_url = self.page_url(request)?;
        Ok(self.probe(&page_url).await)
    }

    /// Probe unless the probe limiter rejects; `None` when skipped.
    pub async fn limited_probe(&self, url: &str) -> Option<bool> {
        if let Some(limiter) = &self.probe_limiter {
            let host = Url::parse(url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
                .unwrap_or_default();
            if !limiter.allow(&host).admitted {
                debug!(host = %host, "Probe skipped by rate limiter");
                return None;
            }
        }
        Some(self.probe(url).await)
    }
}

fn describe_transport_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "request timed out".to_string()
    } else if error.is_connect() {
        "connection failed".to_string()
    } else {
        error.to_string()
    }
}
