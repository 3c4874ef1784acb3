use crate::config::SessionConfig;
use crate::session_id::SessionId;
use crate::storage_handler::{oldest_kept, require_configuration, StorageHandler};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// # in-memory storage handler
/// Because there is no external
/// persistence, this handler is ephemeral and will be cleared
/// on server restart.
///
/// Clones share the same sessions, so one handler can be cloned into every request.
///
/// # ***READ THIS BEFORE USING IN A PRODUCTION DEPLOYMENT***
///
/// Storing sessions only in memory brings the following problems:
///
/// 1. All sessions must fit in available memory (important for high load services)
/// 2. Expired sessions are only removed by [`garbage_collect`](StorageHandler::garbage_collect).
///    If it never runs, memory grows without bound
/// 3. All sessions will be lost on shutdown
/// 4. If the service is clustered particular session will be stored only on a single instance.
///    This might be solved by using load balancers with sticky sessions.
#[derive(Debug, Clone, Default)]
pub struct MemoryHandler {
    config: Option<Arc<SessionConfig>>,
    entries: Arc<Mutex<HashMap<SessionId, MemoryEntry>>>,
}

#[derive(Debug)]
struct MemoryEntry {
    payload: Vec<u8>,
    written_at: DateTime<Utc>,
}

impl MemoryHandler {
    /// Create a new empty memory handler.
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns the number of stored sessions.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if no sessions are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Returns true if a payload is stored under `id`.
    pub fn contains(&self, id: &SessionId) -> bool {
        self.entries.lock().contains_key(id)
    }

    /// Store a payload with an explicit write time.
    /// Used to seed sessions, e.g. in tests of the expiry sweep.
    pub fn insert_written_at(&self, id: SessionId, payload: Vec<u8>, written_at: DateTime<Utc>) {
        self.entries.lock().insert(
            id,
            MemoryEntry {
                payload,
                written_at,
            },
        );
    }
}

#[async_trait]
impl StorageHandler for MemoryHandler {
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
        require_configuration(&self.config)?;
        Ok(self
            .entries
            .lock()
            .get(id)
            .map(|entry| entry.payload.clone())
            .unwrap_or_default())
    }

    async fn write(&mut self, id: &SessionId, payload: &[u8]) -> Result {
        require_configuration(&self.config)?;
        self.insert_written_at(id.clone(), payload.to_vec(), Utc::now());
        Ok(())
    }

    async fn destroy(&mut self, id: &SessionId) -> Result {
        require_configuration(&self.config)?;
        self.entries.lock().remove(id);
        Ok(())
    }

    async fn garbage_collect(&mut self, max_lifetime_hint: u64) -> Result<usize> {
        let config = require_configuration(&self.config)?;
        let cutoff = oldest_kept(config, max_lifetime_hint);

        let mut entries = self.entries.lock();
        let initial_len = entries.len();
        entries.retain(|_, entry| entry.written_at >= cutoff);
        let removed = initial_len - entries.len();
        log::trace!("Deleted {removed} expired sessions from memory");
        Ok(removed)
    }
}
