//! Shared test doubles.

#![allow(dead_code)]

use async_trait::async_trait;
use cinegate_core::cache::RemoteCache;
use cinegate_core::error::{CinegateError, ErrorCode, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;

const REACHABLE: u8 = 0;
const REFUSING: u8 = 1;
const HANGING: u8 = 2;

/// In-memory remote tier that can be switched unreachable mid-test.
#[derive(Default)]
pub struct FakeRemote {
    store: Mutex<HashMap<String, (Vec<u8>, Duration)>>,
    mode: AtomicU8,
    calls: AtomicUsize,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reachable(&self, reachable: bool) {
        let mode = if reachable { REACHABLE } else { REFUSING };
        self.mode.store(mode, Ordering::SeqCst);
    }

    /// Calls never complete; only the caller's timeout ends them.
    pub fn hang(&self) {
        self.mode.store(HANGING, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.store.lock().contains_key(key)
    }

    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        self.store.lock().get(key).map(|(_, ttl)| *ttl)
    }

    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.store.lock().get(key).map(|(bytes, _)| bytes.clone())
    }

    /// Write bytes directly, as another instance sharing the remote would.
    pub fn put_raw(&self, key: &str, bytes: Vec<u8>) {
        self.store.lock().insert(key.to_string(), (bytes, Duration::from_secs(3600)));
    }

    async fn gate(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode.load(Ordering::SeqCst) {
            REACHABLE => Ok(()),
            REFUSING => Err(CinegateError::new(ErrorCode::RemoteCacheUnavailable, "connection refused")),
            _ => {
                futures::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl RemoteCache for FakeRemote {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.gate().await?;
        Ok(self.raw(key))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.gate().await?;
        self.store.lock().insert(key.to_string(), (value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.gate().await?;
        self.store.lock().remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.gate().await
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}
