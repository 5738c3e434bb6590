//! Stream URL extraction from unstructured player pages.
//!
//! Extraction is an ordered chain of patterns. Each pattern is tried in turn
//! over the page body; the first capture that normalizes to an http(s) URL
//! wins. The default order reflects how reliably each construct carries the
//! real stream on hosted player pages.

use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CinegateError, Result};

/// Family of markup a pattern targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    /// `data-src` / `data-file` / `data-stream` / `data-url` on the player element
    InlinePlayerAttribute,
    /// `<iframe src=...>`
    IframeSource,
    /// `<source src=...>` inside a `<video>` element
    SourceElement,
    /// `file:` / `source:` in a player setup script
    PlayerDirective,
    /// Any bare `.m3u8` URL
    HlsManifest,
    /// Operator-supplied pattern
    Custom,
}

impl ExtractorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InlinePlayerAttribute => "inline_player_attribute",
            Self::IframeSource => "iframe_source",
            Self::SourceElement => "source_element",
            Self::PlayerDirective => "player_directive",
            Self::HlsManifest => "hls_manifest",
            Self::Custom => "custom",
        }
    }

    fn from_name(name: &str) -> Self {
        match name {
            "inline_player_attribute" => Self::InlinePlayerAttribute,
            "iframe_source" => Self::IframeSource,
            "source_element" => Self::SourceElement,
            "player_directive" => Self::PlayerDirective,
            "hls_manifest" => Self::HlsManifest,
            _ => Self::Custom,
        }
    }

    /// Built-in patterns in priority order.
    ///
    /// Inline attributes only count on player markup: a `<video>`/`<audio>`
    /// element, or any element whose `id` or `class` names a player. Lazy-load
    /// attributes on images and cards never qualify.
    fn defaults() -> [(Self, &'static str); 7] {
        [
            (
                Self::InlinePlayerAttribute,
                r#"(?i)<(?:video|audio)\b[^>]*?\bdata-(?:src|file|stream|url)\s*=\s*["']([^"']+)["']"#,
            ),
            (
                Self::InlinePlayerAttribute,
                r#"(?i)<[a-z][a-z0-9-]*\b[^>]*?\b(?:id|class)\s*=\s*["'][^"']*player[^"']*["'][^>]*?\bdata-(?:src|file|stream|url)\s*=\s*["']([^"']+)["']"#,
            ),
            (
                Self::InlinePlayerAttribute,
                r#"(?i)<[a-z][a-z0-9-]*\b[^>]*?\bdata-(?:src|file|stream|url)\s*=\s*["']([^"']+)["'][^>]*?\b(?:id|class)\s*=\s*["'][^"']*player"#,
            ),
            (Self::IframeSource, r#"(?i)<iframe\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#),
            (Self::SourceElement, r#"(?i)<source\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#),
            (Self::PlayerDirective, r#"(?i)\b(?:file|source)\s*:\s*["']([^"']+)["']"#),
            (
                Self::HlsManifest,
                r#"(?i)((?:https?:)?(?://|\\/\\/)[^\s"'<>]+?\.m3u8(?:\?[^\s"'<>]*)?)"#,
            ),
        ]
    }
}

impl fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator-supplied pattern, as read from configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PatternConfig {
    pub name: String,
    pub regex: String,
    #[serde(default = "default_group")]
    pub group: usize,
}

fn default_group() -> usize {
    1
}

/// One matcher and the capture group holding the URL.
#[derive(Debug, Clone)]
pub struct ExtractionPattern {
    name: String,
    kind: ExtractorKind,
    matcher: Regex,
    group: usize,
}

impl ExtractionPattern {
    pub fn new(name: impl Into<String>, kind: ExtractorKind, regex: &str, group: usize) -> Result<Self> {
        let name = name.into();
        let matcher = Regex::new(regex).map_err(|e| {
            CinegateError::configuration(format!("extractor '{}' has an invalid regex: {}", name, e))
        })?;
        if group >= matcher.captures_len() {
            return Err(CinegateError::configuration(format!(
                "extractor '{}' uses group {} but the regex has only {} groups",
                name,
                group,
                matcher.captures_len() - 1
            )));
        }
        Ok(Self { name, kind, matcher, group })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ExtractorKind {
        self.kind
    }

    /// Unescaped, non-empty captures in document order.
    fn candidates<'h>(&'h self, html: &'h str) -> impl Iterator<Item = String> + 'h {
        self.matcher
            .captures_iter(html)
            .filter_map(move |caps| caps.get(self.group))
            .map(|m| unescape(m.as_str()))
            .filter(|s| !s.is_empty())
    }
}

/// A URL found by the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub url: Url,
    pub kind: ExtractorKind,
    pub pattern: String,
}

/// Ordered, immutable list of extraction patterns.
#[derive(Debug, Clone)]
pub struct ExtractorChain {
    patterns: Vec<ExtractionPattern>,
}

impl ExtractorChain {
    pub fn with_defaults() -> Result<Self> {
        let patterns = ExtractorKind::defaults()
            .into_iter()
            .map(|(kind, regex)| ExtractionPattern::new(kind.as_str(), kind, regex, 1))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Configured patterns replace the defaults entirely when present.
    pub fn from_config(patterns: Option<&[PatternConfig]>) -> Result<Self> {
        match patterns {
            None => Self::with_defaults(),
            Some([]) => Err(CinegateError::configuration("resolver.patterns must not be empty")),
            Some(configs) => {
                let patterns = configs
                    .iter()
                    .map(|c| ExtractionPattern::new(&c.name, ExtractorKind::from_name(&c.name), &c.regex, c.group))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Self { patterns })
            }
        }
    }

    pub fn patterns(&self) -> &[ExtractionPattern] {
        &self.patterns
    }

    /// First capture, in pattern order, that normalizes to an http(s) URL
    /// and is not an image asset.
    pub fn find(&self, html: &str, origin: &Url) -> Option<Extracted> {
        self.patterns.iter().find_map(|pattern| {
            pattern
                .candidates(html)
                .filter_map(|candidate| normalize(&candidate, origin))
                .find(|url| !is_image_asset(url))
                .map(|url| Extracted {
                    url,
                    kind: pattern.kind,
                    pattern: pattern.name.clone(),
                })
        })
    }
}

/// Undo the HTML and JS escaping commonly found around embedded URLs.
pub fn unescape(raw: &str) -> String {
    raw.trim()
        .replace("\\/", "/")
        .replace("&#x2F;", "/")
        .replace("&#x2f;", "/")
        .replace("&#47;", "/")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Resolve a captured value to an absolute http(s) URL.
///
/// Protocol-relative values take the origin's scheme; relative values are
/// joined against the origin. Any other scheme is rejected.
pub fn normalize(candidate: &str, origin: &Url) -> Option<Url> {
    let candidate = candidate.trim();
    if candidate.is_empty() || candidate.starts_with('#') {
        return None;
    }

    let url = if let Some(rest) = candidate.strip_prefix("//") {
        Url::parse(&format!("{}://{}", origin.scheme(), rest)).ok()?
    } else {
        match Url::parse(candidate) {
            Ok(url) => url,
            Err(_) => origin.join(candidate).ok()?,
        }
    };

    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Some(url),
        _ => None,
    }
}

const IMAGE_EXTENSIONS: [&str; 9] = ["jpg", "jpeg", "png", "webp", "gif", "svg", "avif", "ico", "bmp"];

/// Posters, thumbnails and sprites are never streams.
fn is_image_asset(url: &Url) -> bool {
    url.path()
        .rsplit_once('.')
        .map(|(_, ext)| IMAGE_EXTENSIONS.iter().any(|i| ext.eq_ignore_ascii_case(i)))
        .unwrap_or(false)
}
