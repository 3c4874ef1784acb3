use crate::config::SessionConfig;
use crate::session_id::SessionId;
use crate::storage_handler::{require_configuration, StorageHandler};
use crate::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// A storage handler that stores nothing.
///
/// Every session starts empty and all writes are discarded.
/// Useful for stateless endpoints and tests that only care about cookies.
#[derive(Debug, Clone, Default)]
pub struct NullHandler {
    config: Option<Arc<SessionConfig>>,
}

impl NullHandler {
    /// Create a new null handler.
    pub fn new() -> Self {
        Default::default()
    }
}

#[async_trait]
impl StorageHandler for NullHandler {
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

    async fn read(&mut self, _id: &SessionId) -> Result<Vec<u8>> {
        require_configuration(&self.config)?;
        Ok(Vec::new())
    }

    async fn write(&mut self, _id: &SessionId, _payload: &[u8]) -> Result {
        require_configuration(&self.config)?;
        Ok(())
    }

    async fn destroy(&mut self, _id: &SessionId) -> Result {
        require_configuration(&self.config)?;
        Ok(())
    }

    async fn garbage_collect(&mut self, _max_lifetime_hint: u64) -> Result<usize> {
        require_configuration(&self.config)?;
        Ok(0)
    }
}
