//! Deterministic cache keys for catalog requests.
//!
//! Keys have the shape `catalog:{kind}:{media}[:{id}...][:{k=v&k=v}]`. Parameters
//! are kept in a sorted map, so two requests that differ only in parameter order
//! share a key.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::endpoint::EndpointKind;

const KEY_PREFIX: &str = "catalog";

/// Normalized query parameters for a catalog request.
///
/// Names are trimmed and lowercased, values trimmed; empty names or values are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogParams(BTreeMap<String, String>);

impl CatalogParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: ToString,
    {
        let mut params = Self::new();
        for (name, value) in pairs {
            params.insert(name, value);
        }
        params
    }

    pub fn insert(&mut self, name: impl AsRef<str>, value: impl ToString) {
        let name = name.as_ref().trim().to_ascii_lowercase();
        let value = value.to_string().trim().to_string();
        if name.is_empty() || value.is_empty() {
            return;
        }
        self.0.insert(name, value);
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, name: impl AsRef<str>, value: impl ToString) -> Self {
        self.insert(name, value);
        self
    }

    /// Set `name` only when it is not already present.
    pub fn with_default(mut self, name: &str, value: impl ToString) -> Self {
        if !self.0.contains_key(&name.trim().to_ascii_lowercase()) {
            self.insert(name, value);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `k=v&k=v` in name order, with separator characters escaped.
    pub fn canonical(&self) -> String {
        self.iter()
            .map(|(k, v)| format!("{}={}", escape(k), escape(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl fmt::Display for CatalogParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

fn escape(part: &str) -> String {
    part.replace('%', "%25").replace('&', "%26").replace('=', "%3D").replace(':', "%3A")
}

/// Builder for catalog cache keys.
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    segments: Vec<String>,
    params: Option<String>,
}

impl CacheKeyBuilder {
    pub fn new() -> Self {
        Self {
            segments: vec![KEY_PREFIX.to_string()],
            params: None,
        }
    }

    /// Key for a catalog endpoint and its parameters.
    pub fn catalog(kind: &EndpointKind, params: &CatalogParams) -> String {
        Self::new()
            .segment(kind.name())
            .segment(kind.media().as_str())
            .segments(kind.id_segments())
            .params(params)
            .build()
    }

    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    pub fn segments(mut self, segments: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.segments.extend(segments.into_iter().map(Into::into));
        self
    }

    pub fn params(mut self, params: &CatalogParams) -> Self {
        self.params = (!params.is_empty()).then(|| params.canonical());
        self
    }

    pub fn build(self) -> String {
        let mut key = self.segments.join(":");
        if let Some(params) = self.params {
            key.push(':');
            key.push_str(&params);
        }
        key
    }
}

impl Default for CacheKeyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::endpoint::MediaType;

    #[test]
    fn test_key_independent_of_param_order() {
        let kind = EndpointKind::Popular(MediaType::Movie);
        let a = CatalogParams::from_pairs([("page", "1"), ("region", "US")]);
        let b = CatalogParams::from_pairs([("region", "US"), ("page", "1")]);

        assert_eq!(CacheKeyBuilder::catalog(&kind, &a), CacheKeyBuilder::catalog(&kind, &b));
        assert_eq!(CacheKeyBuilder::catalog(&kind, &a), "catalog:popular:movie:page=1&region=US");
    }

    #[test]
    fn test_params_normalized() {
        let params = CatalogParams::new()
            .with(" Page ", " 2 ")
            .with("region", "")
            .with("", "x");
        assert_eq!(params.canonical(), "page=2");
    }

    #[test]
    fn test_key_includes_ids() {
        let kind = EndpointKind::Season { series_id: 1399, season: 2 };
        assert_eq!(CacheKeyBuilder::catalog(&kind, &CatalogParams::new()), "catalog:season:tv:1399:2");
    }

    #[test]
    fn test_separators_escaped() {
        let params = CatalogParams::new().with("query", "a&b=c");
        assert_eq!(params.canonical(), "query=a%26b%3Dc");
    }

    #[test]
    fn test_with_default_keeps_existing() {
        let params = CatalogParams::new()
            .with("language", "fr-FR")
            .with_default("language", "en-US")
            .with_default("page", 1);
        assert_eq!(params.get("language"), Some("fr-FR"));
        assert_eq!(params.get("page"), Some("1"));
    }
}
