//! Counter store contract with Redis and in-memory implementations

use crate::types::CounterKey;
use crate::{Error, Result, store_error};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// Durable integer counters
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current value, `None` when the key was never set
    async fn get(&self, key: &CounterKey) -> Result<Option<i64>>;

    /// Atomically add one, returning the new value
    async fn increment(&self, key: &CounterKey) -> Result<i64>;

    /// Overwrite the value (administrative reset only)
    async fn set(&self, key: &CounterKey, value: i64) -> Result<()>;
}

/// Redis-backed counters
///
/// Holds one multiplexed connection for the whole process; clones of the
/// manager share it and reconnect transparently.
#[derive(Clone)]
pub struct RedisCounterStore {
    manager: ConnectionManager,
}

impl RedisCounterStore {
    /// Connect to Redis, failing if the server cannot be reached
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| store_error!("Invalid Redis URL {}: {}", redis_url, e))?;

        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| store_error!("Failed to connect to Redis at {}: {}", redis_url, e))?;

        tracing::info!("🔌 Connected to counter store at {}", redis_url);
        Ok(Self { manager })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn get(&self, key: &CounterKey) -> Result<Option<i64>> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.get(key.as_str()).await?;

        match raw {
            Some(value) => match value.trim().parse::<i64>() {
                Ok(count) => Ok(Some(count)),
                Err(_) => {
                    tracing::warn!("⚠️  Counter {} holds non-integer value {:?}", key, value);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn increment(&self, key: &CounterKey) -> Result<i64> {
        let mut conn = self.manager.clone();
        let total: i64 = conn.incr(key.as_str(), 1i64).await?;
        Ok(total)
    }

    async fn set(&self, key: &CounterKey, value: i64) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: () = conn.set(key.as_str(), value).await?;
        Ok(())
    }
}

/// In-process counters used by tests and local runs
#[derive(Debug)]
pub struct InMemoryCounterStore {
    counters: RwLock<HashMap<String, i64>>,
    available: AtomicBool,
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the store going down or coming back
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Raw value of a key, bypassing availability
    pub fn value(&self, key: &CounterKey) -> Option<i64> {
        self.counters
            .read()
            .ok()
            .and_then(|counters| counters.get(key.as_str()).copied())
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(store_error!("In-memory counter store is unavailable"))
        }
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn get(&self, key: &CounterKey) -> Result<Option<i64>> {
        self.ensure_available()?;

        let counters = self
            .counters
            .read()
            .map_err(|_| Error::internal("Counter store read error"))?;

        Ok(counters.get(key.as_str()).copied())
    }

    async fn increment(&self, key: &CounterKey) -> Result<i64> {
        self.ensure_available()?;

        let mut counters = self
            .counters
            .write()
            .map_err(|_| Error::internal("Counter store write error"))?;

        let counter = counters.entry(key.as_str().to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn set(&self, key: &CounterKey, value: i64) -> Result<()> {
        self.ensure_available()?;

        let mut counters = self
            .counters
            .write()
            .map_err(|_| Error::internal("Counter store write error"))?;

        counters.insert(key.as_str().to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Candidate;

    #[tokio::test]
    async fn test_increment_and_get() {
        let store = InMemoryCounterStore::new();
        let key = Candidate::One.counter_key();

        assert_eq!(store.get(&key).await.unwrap(), None);
        assert_eq!(store.increment(&key).await.unwrap(), 1);
        assert_eq!(store.increment(&key).await.unwrap(), 2);
        assert_eq!(store.get(&key).await.unwrap(), Some(2));

        store.set(&key, 0).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some(0));
        assert_eq!(store.get(&Candidate::Two.counter_key()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let store = InMemoryCounterStore::new();
        let key = Candidate::Two.counter_key();
        store.increment(&key).await.unwrap();

        store.set_available(false);
        assert!(matches!(
            store.increment(&key).await,
            Err(Error::StoreUnavailable { .. })
        ));
        assert!(store.get(&key).await.is_err());
        assert_eq!(store.value(&key), Some(1));

        store.set_available(true);
        assert_eq!(store.increment(&key).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_increments() {
        let store = std::sync::Arc::new(InMemoryCounterStore::new());
        let key = Candidate::One.counter_key();

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let store = store.clone();
                let key = key.clone();
                tokio::spawn(async move { store.increment(&key).await.unwrap() })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.get(&key).await.unwrap(), Some(50));
    }
}
