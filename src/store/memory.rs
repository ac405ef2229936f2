//! In-process counter store.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::trace;

use super::{CounterStore, ExpirySweep};
use crate::error::{AccessGateError, Result};

/// A counter value with an optional expiry deadline.
#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    value: u64,
    expires_at: Option<Instant>,
}

impl CounterEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// Expiry deadline `ttl` after `now`, or an error if the clock can't represent it.
fn deadline(now: Instant, ttl: Duration) -> Result<Instant> {
    now.checked_add(ttl).ok_or_else(|| {
        AccessGateError::Config(format!("counter expiry of {}s is out of range", ttl.as_secs()))
    })
}

/// A counter store backed by a concurrent hash map.
///
/// Expired entries are dropped lazily on access and by [`purge_expired`].
/// Only suitable when a single process serves all traffic.
///
/// [`purge_expired`]: MemoryCounterStore::purge_expired
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    entries: DashMap<String, CounterEntry>,
}

impl MemoryCounterStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) counters.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    /// Whether the store holds no live counters.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired counter, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let expired = entry.is_expired(now);
            if expired {
                removed += 1;
            }
            !expired
        });
        trace!(removed, "Purged expired counters");
        removed
    }

    /// Clear all counters.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl ExpirySweep for MemoryCounterStore {
    fn purge_expired(&self) -> usize {
        MemoryCounterStore::purge_expired(self)
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn get(&self, key: &str) -> Result<Option<u64>> {
        let now = Instant::now();
        let value = self.entries.get(key).map(|e| *e);
        match value {
            Some(entry) if entry.is_expired(now) => {
                self.entries.remove_if(key, |_, e| e.is_expired(now));
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: u64, ttl: Duration) -> Result<()> {
        let expires_at = deadline(Instant::now(), ttl)?;
        self.entries.insert(
            key.to_string(),
            CounterEntry {
                value,
                expires_at: Some(expires_at),
            },
        );
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<u64> {
        let now = Instant::now();
        let mut entry = self.entries.entry(key.to_string()).or_insert(CounterEntry {
            value: 0,
            expires_at: None,
        });
        if entry.is_expired(now) {
            *entry = CounterEntry {
                value: 0,
                expires_at: None,
            };
        }
        entry.value += 1;
        Ok(entry.value)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .and_then(|e| e.expires_at)
            .map(|deadline| deadline.saturating_duration_since(now)))
    }

    async fn increment_within(
        &self,
        key: &str,
        max_count: u64,
        ttl: Duration,
    ) -> Result<Option<u64>> {
        let now = Instant::now();
        let expires_at = deadline(now, ttl)?;
        // The entry guard holds the shard lock, so read and write are one step.
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.is_expired(now) {
                    *entry = CounterEntry {
                        value: 1,
                        expires_at: Some(expires_at),
                    };
                    Ok(Some(1))
                } else if entry.value < max_count {
                    entry.value += 1;
                    Ok(Some(entry.value))
                } else {
                    Ok(None)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CounterEntry {
                    value: 1,
                    expires_at: Some(expires_at),
                });
                Ok(Some(1))
            }
        }
    }
}
