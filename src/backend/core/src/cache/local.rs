//! Process-local cache tier.
//!
//! Entries live in a sharded `DashMap`, so unrelated keys never contend on a
//! single lock. Recency is tracked with a monotonically increasing access tick;
//! when the tier is full a batch of the least recently used entries is evicted,
//! dead entries first.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::counter;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::entry::CacheEntry;

/// Fraction of capacity evicted at once when the tier is full.
const EVICTION_BATCH_DIVISOR: usize = 10;

struct Slot {
    entry: CacheEntry,
    last_access: AtomicU64,
}

pub struct LocalTier {
    entries: DashMap<String, Slot>,
    capacity: usize,
    stale_retention: Duration,
    tick: AtomicU64,
    evictions: AtomicU64,
}

impl LocalTier {
    pub fn new(capacity: usize, stale_retention: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
            stale_retention,
            tick: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed)
    }

    /// Return a copy of the entry if it is still retained (fresh or stale).
    ///
    /// Entries past their retention deadline are dropped on access.
    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        let found = {
            let slot = self.entries.get(key)?;
            if slot.entry.is_retained_at(now, self.stale_retention) {
                slot.last_access.store(self.next_tick(), Ordering::Relaxed);
                Some(slot.entry.clone())
            } else {
                None
            }
        };

        if found.is_none() {
            let retention = self.stale_retention;
            self.entries
                .remove_if(key, |_, slot| !slot.entry.is_retained_at(now, retention));
        }
        found
    }

    pub fn insert(&self, entry: CacheEntry, now: DateTime<Utc>) {
        if !self.entries.contains_key(&entry.key) && self.entries.len() >= self.capacity {
            self.evict_batch(now);
        }

        let slot = Slot {
            entry,
            last_access: AtomicU64::new(self.next_tick()),
        };
        self.entries.insert(slot.entry.key.clone(), slot);
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every entry past its retention deadline. Returns how many were removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        let retention = self.stale_retention;
        self.entries
            .retain(|_, slot| slot.entry.is_retained_at(now, retention));
        before.saturating_sub(self.entries.len())
    }

    fn evict_batch(&self, now: DateTime<Utc>) {
        let batch = (self.capacity / EVICTION_BATCH_DIVISOR).max(1);

        // (retained, last_access, key): dead entries sort first, then oldest access.
        let mut candidates: Vec<(bool, u64, String)> = self
            .entries
            .iter()
            .map(|item| {
                let slot = item.value();
                (
                    slot.entry.is_retained_at(now, self.stale_retention),
                    slot.last_access.load(Ordering::Relaxed),
                    item.key().clone(),
                )
            })
            .collect();

        if candidates.len() > batch {
            candidates.select_nth_unstable(batch - 1);
            candidates.truncate(batch);
        }

        let mut removed = 0u64;
        for (_, _, key) in candidates {
            if self.entries.remove(&key).is_some() {
                removed += 1;
            }
        }

        self.evictions.fetch_add(removed, Ordering::Relaxed);
        counter!("cache_local_evictions_total").increment(removed);
        tracing::debug!(evicted = removed, capacity = self.capacity, "Local cache tier evicted batch");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}
