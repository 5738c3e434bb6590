//! The cache envelope shared by both tiers.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

/// Upper bound for TTL and retention arithmetic (ten years).
const MAX_SPAN_SECS: i64 = 10 * 365 * 24 * 3600;

fn span(d: Duration) -> chrono::Duration {
    chrono::Duration::seconds((d.as_secs() as i64).clamp(0, MAX_SPAN_SECS))
}

/// A cached value with its absolute storage time.
///
/// The same envelope is serialized into the remote tier, so a value read back
/// from there still carries its original `stored_at` and expires on schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub stored_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, value: serde_json::Value, ttl: Duration, now: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            value,
            stored_at: now,
            ttl_seconds: ttl.as_secs(),
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.stored_at + span(Duration::from_secs(self.ttl_seconds))
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    /// Whether the entry should still be kept around for stale reads.
    pub fn is_retained_at(&self, now: DateTime<Utc>, stale_retention: Duration) -> bool {
        now < self.expires_at() + span(stale_retention)
    }

    /// Time left before expiry, `None` once expired.
    pub fn remaining_ttl(&self, now: DateTime<Utc>) -> Option<Duration> {
        (self.expires_at() - now).to_std().ok().filter(|d| !d.is_zero())
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.stored_at).to_std().unwrap_or_default()
    }

    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.value)
    }
}
