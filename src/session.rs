use crate::record::{SessionRecord, SessionValue};
use crate::Result;
use parking_lot::{Mutex, MutexGuard};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// The session of the current request.
///
/// This is a cheap handle onto the record loaded by the [`SessionManager`](crate::SessionManager).
/// Clones refer to the same record. The handle does not persist anything itself: changes are
/// written back when the manager ends the session.
///
/// Handles are only meaningful while their session is active.
/// The [`SessionMiddleware`](crate::SessionMiddleware) guarantees this for request handlers.
///
/// # Example
///
/// ```
/// # fn main() -> session_lifecycle::Result {
/// # async_std::task::block_on(async {
/// use session_lifecycle::{MemoryHandler, SessionConfig, SessionManager};
///
/// let mut manager = SessionManager::new(SessionConfig::default(), MemoryHandler::new());
/// let session = manager.start().await?;
///
/// session.set("views", 1)?;
/// assert!(session.has("views"));
/// assert_eq!(session.get_or("views", 0), 1);
/// assert_eq!(session.get_or("missing", 0), 0);
/// assert!(session.set("invalid", std::collections::HashMap::from([("a", 1)])).is_err());
///
/// manager.end(None).await?;
/// # Ok(()) }) }
/// ```
#[derive(Debug, Clone)]
pub struct Session {
    state: Arc<Mutex<SessionState>>,
}

#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub(crate) record: SessionRecord,
    pub(crate) changed: bool,
    pub(crate) regenerate_requested: bool,
    pub(crate) destroyed: bool,
}

impl Session {
    pub(crate) fn new(record: SessionRecord) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState {
                record,
                ..Default::default()
            })),
        }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock()
    }

    /// Returns true if a value is stored under `key`.
    pub fn has(&self, key: &str) -> bool {
        self.state().record.contains_key(key)
    }

    /// Returns the value stored under `key`, converted to `T`.
    ///
    /// Returns `None` if there is no value or it cannot be converted.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.state()
            .record
            .get(key)
            .and_then(SessionValue::deserialize_into::<T>)
    }

    /// Returns the value stored under `key`, or `default` if there is none.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// Returns the raw value stored under `key`.
    pub fn value(&self, key: &str) -> Option<SessionValue> {
        self.state().record.get(key).cloned()
    }

    /// Store `value` under `key`.
    ///
    /// Fails with [`Error::NonScalarValue`](crate::Error::NonScalarValue) right away if `value`
    /// is not a boolean, number, string or an array of those.
    pub fn set(&self, key: impl Into<String>, value: impl Serialize) -> Result {
        let mut state = self.state();
        state.record.insert(key, value)?;
        state.changed = true;
        Ok(())
    }

    /// Remove and return the value stored under `key`.
    pub fn remove(&self, key: &str) -> Option<SessionValue> {
        let mut state = self.state();
        let removed = state.record.remove(key);
        state.changed |= removed.is_some();
        removed
    }

    /// Remove all values.
    pub fn clear(&self) {
        let mut state = self.state();
        let had_values = !state.record.is_empty();
        state.record.clear();
        state.changed |= had_values;
    }

    /// The keys of all stored values, in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.state().record.keys().map(str::to_string).collect()
    }

    /// Returns the number of stored values.
    pub fn len(&self) -> usize {
        self.state().record.len()
    }

    /// Returns true if no values are stored.
    pub fn is_empty(&self) -> bool {
        self.state().record.is_empty()
    }

    /// Returns true if the values were changed since the session was loaded.
    pub fn is_changed(&self) -> bool {
        self.state().changed
    }

    /// A copy of the current record.
    pub fn record(&self) -> SessionRecord {
        self.state().record.clone()
    }

    /// Issue a new identifier for this session when it ends, keeping its values.
    ///
    /// Call this after privilege changes such as a login, to prevent session fixation.
    pub fn regenerate(&self) {
        self.state().regenerate_requested = true;
    }

    /// Mark this session for destruction.
    /// Its values are cleared now, and the stored session is removed when the session ends.
    /// No cookie is sent for a destroyed session.
    pub fn destroy(&self) {
        let mut state = self.state();
        state.record.clear();
        state.destroyed = true;
    }

    /// Returns true if this session is marked for destruction.
    pub fn is_destroyed(&self) -> bool {
        self.state().destroyed
    }
}
