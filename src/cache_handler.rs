use crate::config::SessionConfig;
use crate::session_id::SessionId;
use crate::storage_handler::{require_configuration, storage_key, StorageHandler};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// The driver interface of a key/value cache with per-key expiry, e.g. a memcached or redis client.
///
/// The cache is expected to be atomic per key; the [`CacheHandler`] adds no locking of its own.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get the value stored under `key`, if it exists and has not expired.
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, expiring `ttl` from now.
    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> anyhow::Result<()>;

    /// Delete the value stored under `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}

/// # cache-backed storage handler
/// Stores sessions in a [`CacheBackend`] under `<prefix><id>`.
///
/// Every write resets the entry's time-to-live to the configured lifetime, and the cache expires
/// entries on its own, so garbage collection does nothing.
#[derive(Debug)]
pub struct CacheHandler<Backend> {
    config: Option<Arc<SessionConfig>>,
    backend: Arc<Backend>,
}

impl<Backend> Clone for CacheHandler<Backend> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<Backend: CacheBackend> CacheHandler<Backend> {
    /// Create a handler storing sessions in `backend`.
    pub fn new(backend: Backend) -> Self {
        Self::with_shared_backend(Arc::new(backend))
    }

    /// Create a handler storing sessions in a backend that is shared with other code.
    pub fn with_shared_backend(backend: Arc<Backend>) -> Self {
        Self {
            config: None,
            backend,
        }
    }

    /// The cache backend.
    pub fn backend(&self) -> &Backend {
        &self.backend
    }
}

#[async_trait]
impl<Backend: CacheBackend> StorageHandler for CacheHandler<Backend> {
    fn set_configuration(&mut self, config: Arc<SessionConfig>) {
        self.config = Some(config);
    }

    async fn open(&mut self, _location: &Path) -> Result {
        require_configuration(&self.config)?;
        Ok(())
    }

    async fn close(&mut self) -> Result {
        Ok(())
    }

    async fn read(&mut self, id: &SessionId) -> Result<Vec<u8>> {
        let key = storage_key(require_configuration(&self.config)?, id);
        Ok(self.backend.get(&key).await?.unwrap_or_default())
    }

    async fn write(&mut self, id: &SessionId, payload: &[u8]) -> Result {
        let config = require_configuration(&self.config)?;
        let key = storage_key(config, id);
        let ttl = Duration::from_secs(config.lifetime());
        self.backend.set_with_ttl(&key, payload, ttl).await?;
        Ok(())
    }

    async fn destroy(&mut self, id: &SessionId) -> Result {
        let key = storage_key(require_configuration(&self.config)?, id);
        self.backend.delete(&key).await?;
        Ok(())
    }

    async fn garbage_collect(&mut self, _max_lifetime_hint: u64) -> Result<usize> {
        require_configuration(&self.config)?;
        Ok(0)
    }
}

/// An in-process [`CacheBackend`] that honours time-to-live like a cache server would.
///
/// Expired entries are dropped lazily when they are accessed.
/// Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

#[derive(Debug)]
struct CacheEntry {
    value: Vec<u8>,
    expires_at: DateTime<Utc>,
}

impl InMemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Default::default()
    }

    /// The remaining time-to-live of `key`, if it exists and has not expired.
    pub fn time_to_live(&self, key: &str) -> Option<Duration> {
        let entries = self.entries.lock();
        let remaining = entries.get(key)?.expires_at.signed_duration_since(Utc::now());
        remaining.to_std().ok().filter(|remaining| !remaining.is_zero())
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Utc::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> anyhow::Result<()> {
        let ttl = chrono::Duration::from_std(ttl)?;
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.entries.lock().insert(
            key.to_string(),
            CacheEntry {
                value: value.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}
