//! Counter store abstraction and backends.
//!
//! The gate only needs a handful of primitives from a shared key-value store:
//! read a counter, create it with an expiry, and bump it. Backends that can
//! do better than the two-call protocol override [`CounterStore::increment_within`].

mod memory;
mod redis;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::{StoreBackend, StoreConfig};
use crate::error::Result;

pub use self::memory::MemoryCounterStore;
pub use self::redis::RedisCounterStore;

/// Trait for counter store implementations.
///
/// Keys are plain strings; any namespacing is applied by the caller.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Read the current value of a counter, `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<u64>>;

    /// Create or overwrite a counter with the given expiry.
    async fn set(&self, key: &str, value: u64, ttl: Duration) -> Result<()>;

    /// Increment a counter by one without touching its expiry.
    ///
    /// A missing key is created with value 1 and no expiry, as Redis `INCR` does.
    async fn incr(&self, key: &str) -> Result<u64>;

    /// Remaining time to live, `None` if the key is absent or never expires.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;

    /// Count one hit against `key` unless it already reached `max_count`.
    ///
    /// Returns the new count, or `None` when the ceiling was already reached
    /// and nothing was written. A fresh key starts at 1 with `ttl`.
    ///
    /// The default body issues separate read and write calls, so concurrent
    /// callers can overshoot the ceiling slightly. Both bundled backends
    /// override it with an atomic version.
    async fn increment_within(
        &self,
        key: &str,
        max_count: u64,
        ttl: Duration,
    ) -> Result<Option<u64>> {
        match self.get(key).await? {
            None => {
                self.set(key, 1, ttl).await?;
                Ok(Some(1))
            }
            Some(count) if count < max_count => self.incr(key).await.map(Some),
            Some(_) => Ok(None),
        }
    }
}

/// In-process state that accumulates expired entries and can drop them.
pub trait ExpirySweep: Send + Sync + 'static {
    /// Drop every expired entry, returning how many were removed.
    fn purge_expired(&self) -> usize;
}

/// Build the counter store selected by configuration.
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn CounterStore>> {
    match config.backend {
        StoreBackend::Memory => {
            info!("Using in-memory counter store");
            let store = Arc::new(MemoryCounterStore::new());
            spawn_sweeper(&store, Duration::from_secs(config.sweep_interval_secs.max(1)));
            Ok(store)
        }
        StoreBackend::Redis => {
            info!(url = %config.redis_url, "Using Redis counter store");
            let store = RedisCounterStore::connect(&config.redis_url).await?;
            Ok(Arc::new(store))
        }
    }
}

/// Periodically drop expired entries from `target`.
///
/// The task ends once `target` has no other owners.
pub fn spawn_sweeper<T: ExpirySweep>(target: &Arc<T>, period: Duration) -> JoinHandle<()> {
    let target = Arc::downgrade(target);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(target) = target.upgrade() else {
                debug!("Sweep target dropped, stopping sweeper");
                break;
            };
            let removed = target.purge_expired();
            if removed > 0 {
                debug!(removed, "Swept expired entries");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sweeper_purges_and_stops_with_target() {
        let store = Arc::new(MemoryCounterStore::new());
        store.set("short", 1, Duration::from_millis(10)).await.unwrap();

        let handle = spawn_sweeper(&store, Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.purge_expired(), 0);

        drop(store);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
