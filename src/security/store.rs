//! Shared counter store backing the admission limiter.
//!
//! # Responsibilities
//! - Atomic per-key increment and expiry
//! - Connect to the store on demand
//!
//! # Implementations
//! - `RedisStore`: shared across gateway instances (INCR + EXPIRE)
//! - `MemoryStore`: process-local, for single-instance deployments and tests

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Errors from the counter store. Never surfaced past the limiter.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Atomic counter operations on an established connection.
#[async_trait]
pub trait CounterStore: Send + Sync + 'static {
    /// Increment `key` by one and return the new value (1 if it did not exist).
    async fn incr(&self, key: &str) -> Result<u64, StoreError>;

    /// Expire `key` after `ttl`.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;
}

/// Opens connections to a counter store.
#[async_trait]
pub trait StoreConnector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Arc<dyn CounterStore>, StoreError>;

    /// Human-readable target for logs.
    fn target(&self) -> String;
}

/// Connector for a Redis server.
pub struct RedisConnector {
    client: redis::Client,
}

impl RedisConnector {
    /// Parse `url` (e.g. `redis://127.0.0.1:6379`). Does not connect.
    pub fn new(url: &str) -> Result<Self, StoreError> {
        Ok(Self {
            client: redis::Client::open(url)?,
        })
    }
}

#[async_trait]
impl StoreConnector for RedisConnector {
    async fn connect(&self) -> Result<Arc<dyn CounterStore>, StoreError> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(Arc::new(RedisStore { conn }))
    }

    fn target(&self) -> String {
        let info = self.client.get_connection_info();
        format!("redis://{}", info.addr)
    }
}

/// Counter store on a multiplexed Redis connection.
///
/// The connection is cheap to clone; each operation uses its own handle so
/// many increments run concurrently.
pub struct RedisStore {
    conn: MultiplexedConnection,
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn incr(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let count: u64 = conn.incr(key, 1u64).await?;
        Ok(count)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let secs = i64::try_from(ttl.as_secs().max(1)).unwrap_or(i64::MAX);
        let _: bool = conn.expire(key, secs).await?;
        Ok(())
    }
}

struct MemoryEntry {
    count: u64,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Minimum time between two sweeps of expired entries.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Process-local counter store.
///
/// Expired entries are swept from the write path at most once per
/// [`SWEEP_INTERVAL`], so the map only holds keys of live windows.
pub struct MemoryStore {
    entries: DashMap<String, MemoryEntry>,
    next_sweep: Mutex<Instant>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
            next_sweep: Mutex::new(Instant::now() + SWEEP_INTERVAL),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current count for `key`, ignoring expired entries.
    pub fn count(&self, key: &str) -> Option<u64> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.count)
    }

    /// Whether `key` has an expiry set.
    pub fn has_expiry(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.expires_at.is_some())
    }

    /// Drop expired entries.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| !entry.is_expired(now));
    }

    /// Sweep if the interval has elapsed. Must not run while an entry guard
    /// is held: `retain` locks every shard.
    fn maybe_sweep(&self, now: Instant) {
        {
            let mut next = self
                .next_sweep
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if now < *next {
                return;
            }
            *next = now + SWEEP_INTERVAL;
        }
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.entries.len(), "Swept expired rate limit keys");
        }
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn incr(&self, key: &str) -> Result<u64, StoreError> {
        let now = Instant::now();
        self.maybe_sweep(now);
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert(MemoryEntry {
                count: 0,
                expires_at: None,
            });
        if entry.is_expired(now) {
            entry.count = 0;
            entry.expires_at = None;
        }
        entry.count += 1;
        Ok(entry.count)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }
}

/// Connector handing out one shared [`MemoryStore`].
pub struct MemoryConnector {
    store: Arc<MemoryStore>,
}

impl MemoryConnector {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    async fn connect(&self) -> Result<Arc<dyn CounterStore>, StoreError> {
        Ok(self.store.clone())
    }

    fn target(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_incr_and_expire() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("k").await.unwrap(), 1);
        assert_eq!(store.incr("k").await.unwrap(), 2);
        assert!(!store.has_expiry("k"));

        store.expire("k", Duration::from_millis(20)).await.unwrap();
        assert!(store.has_expiry("k"));
        assert_eq!(store.count("k"), Some(2));

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(store.count("k"), None);
        assert_eq!(store.incr("k").await.unwrap(), 1);

        store.expire("k", Duration::ZERO).await.unwrap();
        store.purge_expired();
        assert_eq!(store.count("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_keys_are_swept_on_write() {
        let store = MemoryStore::new();

        for window in 0..1_000u64 {
            let key = format!("rl:c:/p:{window}");
            assert_eq!(store.incr(&key).await.unwrap(), 1);
            store.expire(&key, Duration::from_secs(60)).await.unwrap();
            tokio::time::advance(Duration::from_secs(60)).await;
        }

        assert!(store.len() <= 2, "entries: {}", store.len());
    }

    #[tokio::test(start_paused = true)]
    async fn live_keys_survive_a_sweep() {
        let store = MemoryStore::new();
        store.incr("live").await.unwrap();
        store.expire("live", Duration::from_secs(60)).await.unwrap();
        store.incr("dead").await.unwrap();
        store.expire("dead", Duration::from_secs(1)).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        store.incr("other").await.unwrap();

        assert_eq!(store.count("live"), Some(1));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn redis_connector_rejects_bad_url() {
        assert!(RedisConnector::new("not-a-url").is_err());
        assert!(RedisConnector::new("redis://127.0.0.1:6379").is_ok());
    }
}
