use crate::config::SessionConfig;
use crate::session_id::SessionId;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::path::Path;
use std::sync::Arc;

/// This is the backend-facing interface of the session manager.
/// It persists encoded session payloads keyed by their identifier, and reclaims expired ones.
///
/// A handler is driven through `open`, any number of `read`/`write`/`destroy` calls, and `close`.
/// The configuration is attached once with [`set_configuration`](Self::set_configuration) before
/// anything else; every other operation fails with [`Error::NotConfigured`] without it.
/// It may only be replaced between full lifecycles, never while a session is open.
///
/// Payloads are opaque bytes. Encoding and encryption happen in the
/// [`PayloadCodec`](crate::PayloadCodec) before a payload reaches the handler.
#[async_trait]
pub trait StorageHandler: Send {
    /// Attach the shared configuration.
    fn set_configuration(&mut self, config: Arc<SessionConfig>);

    /// Prepare the backend. `location` is the configured save path.
    ///
    /// File-based handlers create the directory here. Failing to create or access it is an error.
    async fn open(&mut self, location: &Path) -> Result;

    /// Release the per-session resources. Closing twice is not an error.
    async fn close(&mut self) -> Result;

    /// Read the payload stored under `id`.
    ///
    /// Returns an empty payload if nothing was stored yet.
    async fn read(&mut self, id: &SessionId) -> Result<Vec<u8>>;

    /// Store `payload` under `id`, replacing any previous payload.
    async fn write(&mut self, id: &SessionId, payload: &[u8]) -> Result;

    /// Remove the payload stored under `id`. Destroying a missing payload is not an error.
    async fn destroy(&mut self, id: &SessionId) -> Result;

    /// Remove all payloads that were last written longer ago than the configured lifetime,
    /// or `max_lifetime_hint` seconds if that is longer.
    ///
    /// Returns the number of removed payloads. Backends with native expiry return zero.
    async fn garbage_collect(&mut self, max_lifetime_hint: u64) -> Result<usize>;
}

pub(crate) fn require_configuration(
    config: &Option<Arc<SessionConfig>>,
) -> Result<&Arc<SessionConfig>> {
    config.as_ref().ok_or(Error::NotConfigured)
}

pub(crate) fn storage_key(config: &SessionConfig, id: &SessionId) -> String {
    format!("{}{}", config.key_prefix(), id)
}

/// The write time before which entries are garbage.
/// Entries younger than the configured lifetime are never collected, whatever the hint says.
pub(crate) fn oldest_kept(config: &SessionConfig, max_lifetime_hint: u64) -> DateTime<Utc> {
    let threshold = i64::try_from(config.lifetime().max(max_lifetime_hint)).unwrap_or(i64::MAX);
    Duration::try_seconds(threshold)
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
