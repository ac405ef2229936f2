//! Redis-backed counter store.
//!
//! Shares counters across every process pointed at the same Redis instance.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tracing::{debug, warn};

use super::CounterStore;
use crate::error::{AccessGateError, Result};

/// Read, create-with-expiry, or increment in one round trip.
///
/// Returns the new count, or -1 when the counter already sits at the ceiling.
/// `INCR` leaves the existing expiry in place, so the window stays fixed.
const INCREMENT_WITHIN_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
    redis.call('SET', KEYS[1], 1, 'EX', ARGV[2])
    return 1
end
if tonumber(current) < tonumber(ARGV[1]) then
    return redis.call('INCR', KEYS[1])
end
return -1
"#;

/// Counter store talking to Redis through a reconnecting connection manager.
#[derive(Clone)]
pub struct RedisCounterStore {
    connection: ConnectionManager,
    increment_within: Script,
}

impl std::fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCounterStore").finish_non_exhaustive()
    }
}

impl RedisCounterStore {
    /// Connect to Redis and verify the connection with a `PING`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            warn!(error = %e, "Failed to create Redis client for counter store");
            AccessGateError::StoreUnavailable(format!("invalid Redis URL: {}", e))
        })?;

        let connection = ConnectionManager::new(client).await.map_err(|e| {
            warn!(error = %e, "Failed to connect to Redis for counter store");
            AccessGateError::StoreUnavailable(format!("failed to connect: {}", e))
        })?;

        let mut conn = connection.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        debug!("Connected to Redis counter store");

        Ok(Self {
            connection,
            increment_within: Script::new(INCREMENT_WITHIN_SCRIPT),
        })
    }
}

fn ttl_seconds(ttl: Duration) -> u64 {
    // Redis rejects EX 0, so sub-second windows round up.
    ttl.as_secs().max(1)
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn get(&self, key: &str) -> Result<Option<u64>> {
        let mut conn = self.connection.clone();
        let value: Option<u64> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: u64, ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: () = conn.set_ex(key, value, ttl_seconds(ttl)).await?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<u64> {
        let mut conn = self.connection.clone();
        let value: u64 = conn.incr(key, 1u64).await?;
        Ok(value)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut conn = self.connection.clone();
        // -2 means missing, -1 means no expiry.
        let seconds: i64 = conn.ttl(key).await?;
        if seconds < 0 {
            Ok(None)
        } else {
            Ok(Some(Duration::from_secs(seconds as u64)))
        }
    }

    async fn increment_within(
        &self,
        key: &str,
        max_count: u64,
        ttl: Duration,
    ) -> Result<Option<u64>> {
        let mut conn = self.connection.clone();
        let result: i64 = self
            .increment_within
            .key(key)
            .arg(max_count)
            .arg(ttl_seconds(ttl))
            .invoke_async(&mut conn)
            .await?;

        if result < 0 {
            Ok(None)
        } else {
            Ok(Some(result as u64))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
    }

    fn unique_key(name: &str) -> String {
        format!("accessgate-test:{}:{}", name, uuid::Uuid::new_v4().simple())
    }

    #[test]
    fn test_ttl_seconds_rounds_up_to_one() {
        assert_eq!(ttl_seconds(Duration::from_millis(200)), 1);
        assert_eq!(ttl_seconds(Duration::from_secs(60)), 60);
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_url() {
        let result = RedisCounterStore::connect("not-a-url").await;
        assert!(matches!(result, Err(AccessGateError::StoreUnavailable(_))));
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server (REDIS_URL)"]
    async fn test_increment_within_against_redis() {
        let store = RedisCounterStore::connect(&redis_url()).await.unwrap();
        let key = unique_key("ceiling");
        let ttl = Duration::from_secs(30);

        assert_eq!(store.increment_within(&key, 2, ttl).await.unwrap(), Some(1));
        assert_eq!(store.increment_within(&key, 2, ttl).await.unwrap(), Some(2));
        assert_eq!(store.increment_within(&key, 2, ttl).await.unwrap(), None);
        assert_eq!(store.get(&key).await.unwrap(), Some(2));

        let remaining = store.ttl(&key).await.unwrap().unwrap();
        assert!(remaining <= ttl);
        assert!(remaining >= Duration::from_secs(28));
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server (REDIS_URL)"]
    async fn test_primitives_against_redis() {
        let store = RedisCounterStore::connect(&redis_url()).await.unwrap();
        let key = unique_key("primitives");

        assert_eq!(store.get(&key).await.unwrap(), None);
        store.set(&key, 1, Duration::from_secs(30)).await.unwrap();
        assert_eq!(store.incr(&key).await.unwrap(), 2);
        assert!(store.ttl(&key).await.unwrap().is_some());
    }
}
