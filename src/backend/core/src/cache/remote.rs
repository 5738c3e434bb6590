//! Remote (shared) cache tier.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::info;

use crate::config::RedisConfig;
use crate::error::{CinegateError, ErrorCode, Result};
use crate::telemetry::redact_secret;

/// A shared byte store reachable over the network.
///
/// Every call may fail with a connectivity error at any time; callers treat
/// such failures as a signal to degrade, never as fatal.
#[async_trait]
pub trait RemoteCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn ping(&self) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Redis-backed remote tier.
///
/// The connection is established on first use and re-established by the
/// connection manager after drops, so a Redis that starts late is picked up
/// without a restart.
pub struct RedisRemote {
    client: redis::Client,
    conn: OnceCell<ConnectionManager>,
    namespace: String,
    connect_timeout: Duration,
}

impl RedisRemote {
    pub fn new(config: &RedisConfig, namespace: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str()).map_err(|e| {
            CinegateError::with_internal(
                ErrorCode::InvalidConfiguration,
                "Failed to create Redis client",
                e.to_string(),
            )
        })?;

        info!(url = %redact_secret(&config.url), "Redis remote cache tier configured");

        Ok(Self {
            client,
            conn: OnceCell::new(),
            namespace: namespace.into(),
            connect_timeout: config.connect_timeout,
        })
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let manager = tokio::time::timeout(
                    self.connect_timeout,
                    ConnectionManager::new(self.client.clone()),
                )
                .await??;
                info!("Connected to Redis remote cache tier");
                Ok::<_, CinegateError>(manager)
            })
            .await?;
        Ok(conn.clone())
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }
}

#[async_trait]
impl RemoteCache for RedisRemote {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(self.full_key(key))
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut conn = self.connection().await?;
        let () = redis::cmd("SET")
            .arg(self.full_key(key))
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: i64 = redis::cmd("DEL")
            .arg(self.full_key(key))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_namespaced() {
        let remote = RedisRemote::new(&RedisConfig::default(), "cinegate").unwrap();
        assert_eq!(remote.full_key("catalog:popular"), "cinegate:catalog:popular");
    }

    #[tokio::test]
    async fn test_unreachable_redis_fails_fast() {
        let config = RedisConfig {
            enabled: true,
            url: "redis://127.0.0.1:1".to_string(),
            connect_timeout: Duration::from_millis(200),
        };
        let remote = RedisRemote::new(&config, "test").unwrap();
        assert!(remote.ping().await.is_err());
        assert!(remote.get("k").await.is_err());
    }
}
