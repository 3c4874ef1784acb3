use crate::codec::PayloadCodec;
use crate::config::SessionConfig;
use crate::record::{SessionRecord, SessionValue};
use crate::session::{Session, SessionState};
use crate::session_id::generator::{IdGenerator, RandomIdGenerator};
use crate::session_id::SessionId;
use crate::storage_handler::StorageHandler;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::mem;
use std::sync::Arc;

/// Drives the lifecycle of one session per request.
///
/// A manager is either idle or has an active session:
///
/// * [`start`](Self::start) binds an identifier, loads the record through the codec and the
///   storage handler, and applies the timeout policy.
/// * [`end`](Self::end) writes the record back and returns to idle.
/// * [`reset`](Self::reset) replaces the active session by a new empty one under a new identifier.
///
/// Calling an operation in the wrong state is a programming error and fails without side effects.
/// A manager serves a single request at a time and must not be shared between concurrent requests.
/// Concurrent requests for the same session are coordinated by the storage handler.
///
/// # Timeouts
///
/// The record key named by [`SessionConfig::timeout_key`] holds the Unix timestamp after which the
/// session is no longer valid. If it lies in the past when the session starts, the session is reset.
/// Either way it is then set to now plus the lifetime, so every request extends the session.
///
/// # Example
///
/// ```
/// # fn main() -> session_lifecycle::Result {
/// # async_std::task::block_on(async {
/// use session_lifecycle::{MemoryHandler, SessionConfig, SessionManager};
///
/// let handler = MemoryHandler::new();
/// let config = SessionConfig::default().with_name("SESS")?.with_lifetime(900)?;
/// let mut manager = SessionManager::new(config, handler.clone());
///
/// let session = manager.start().await?;
/// session.set("user", "joe")?;
/// let outcome = manager.end(None).await?;
/// assert_eq!(outcome.id.as_str().len(), 80);
///
/// // A later request presents the identifier in its cookie.
/// let mut manager = SessionManager::new(SessionConfig::default(), handler);
/// manager.set_identifier(outcome.id.clone())?;
/// let session = manager.start().await?;
/// assert_eq!(session.get::<String>("user").as_deref(), Some("joe"));
/// # Ok(()) }) }
/// ```
#[derive(Debug)]
pub struct SessionManager<Handler, Generator = RandomIdGenerator> {
    config: Arc<SessionConfig>,
    handler: Handler,
    codec: PayloadCodec,
    generator: Generator,
    state: ManagerState,
    headers_sent: bool,
}

#[derive(Debug)]
enum ManagerState {
    /// No session is active. The identifier to resume may already be known.
    Idle { id: Option<SessionId> },
    /// A session is active and its record is loaded.
    Active(ActiveSession),
}

#[derive(Debug)]
struct ActiveSession {
    id: SessionId,
    session: Session,
    started_at: DateTime<Utc>,
}

/// What remains of a session after it ended. Used to build the session cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    /// The final identifier of the session.
    pub id: SessionId,
    /// When the session was started, or last reset.
    pub started_at: DateTime<Utc>,
    /// True if the session was destroyed, in which case no cookie must be sent.
    pub destroyed: bool,
}

impl<Handler: StorageHandler> SessionManager<Handler> {
    /// Create a manager for the given configuration and storage handler.
    /// The configuration is attached to the handler.
    pub fn new(config: SessionConfig, handler: Handler) -> Self {
        Self::with_shared_config(Arc::new(config), handler)
    }

    /// Create a manager with a configuration that is shared with other managers.
    pub fn with_shared_config(config: Arc<SessionConfig>, mut handler: Handler) -> Self {
        handler.set_configuration(Arc::clone(&config));
        Self {
            config,
            handler,
            codec: PayloadCodec::plain(),
            generator: RandomIdGenerator::default(),
            state: ManagerState::Idle { id: None },
            headers_sent: false,
        }
    }
}

impl<Handler: StorageHandler, Generator: IdGenerator> SessionManager<Handler, Generator> {
    /// Use another identifier generator.
    pub fn with_generator<Other: IdGenerator>(
        self,
        generator: Other,
    ) -> SessionManager<Handler, Other> {
        SessionManager {
            config: self.config,
            handler: self.handler,
            codec: self.codec,
            generator,
            state: self.state,
            headers_sent: self.headers_sent,
        }
    }

    /// Use the given codec, e.g. to encrypt payloads at rest.
    pub fn with_codec(mut self, codec: PayloadCodec) -> Self {
        self.codec = codec;
        self
    }

    /// The configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The storage handler.
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Consume the manager, returning its storage handler.
    pub fn into_handler(self) -> Handler {
        self.handler
    }

    /// Returns true if a session is active.
    pub fn is_active(&self) -> bool {
        matches!(self.state, ManagerState::Active(_))
    }

    /// The identifier of the active session, or the identifier that the next session will resume.
    pub fn id(&self) -> Option<&SessionId> {
        match &self.state {
            ManagerState::Idle { id } => id.as_ref(),
            ManagerState::Active(active) => Some(&active.id),
        }
    }

    /// A handle onto the active session.
    pub fn session(&self) -> Result<Session> {
        Ok(self.active()?.session.clone())
    }

    /// Resume the session with the given identifier on the next [`start`](Self::start).
    ///
    /// Fails with [`Error::IdentifierLocked`] while a session is active.
    pub fn set_identifier(&mut self, id: SessionId) -> Result {
        match &mut self.state {
            ManagerState::Active(_) => Err(Error::IdentifierLocked),
            ManagerState::Idle { id: pending } => {
                *pending = Some(id);
                Ok(())
            }
        }
    }

    /// Record that the response headers were sent. Sessions can no longer be started afterwards,
    /// since their cookie could not reach the client.
    ///
    /// This matters to embedders that keep one manager across several phases of a response.
    /// The [`SessionMiddleware`](crate::SessionMiddleware) uses a fresh manager per request and
    /// calls this once the `Set-Cookie` header is in place.
    pub fn mark_headers_sent(&mut self) {
        self.headers_sent = true;
    }

    /// Returns true if the current identifier does not have the configured length.
    ///
    /// Such an identifier was not issued by this configuration, so it is not trusted for the
    /// lifetime of the session.
    pub fn should_regenerate(&self) -> bool {
        self.id()
            .is_some_and(|id| id.as_str().len() != self.config.id_length())
    }

    /// Start a session, resuming the one named by [`set_identifier`](Self::set_identifier)
    /// or allocating a new identifier.
    ///
    /// Untrusted identifiers are replaced, keeping the data, and expired sessions are reset.
    pub async fn start(&mut self) -> Result<Session> {
        if self.headers_sent {
            return Err(Error::HeadersAlreadySent);
        }
        if self.is_active() {
            return Err(Error::AlreadyStarted);
        }

        self.handler.open(self.config.save_path()).await?;
        self.maybe_collect_garbage().await;

        let (id, record) = match self.bind().await {
            Ok(bound) => bound,
            Err(error) => {
                if let Err(close_error) = self.handler.close().await {
                    log::warn!("Failed to close the storage handler: {close_error}");
                }
                return Err(error);
            }
        };
        self.state = ManagerState::Active(ActiveSession {
            id,
            session: Session::new(record),
            started_at: Utc::now(),
        });

        if self.should_regenerate() {
            log::debug!("Replacing session identifier of untrusted length");
            self.regenerate(true).await?;
        }
        self.apply_timeout_policy().await?;

        self.session()
    }

    /// Replace the identifier of the active session and remove the record stored under the old one.
    /// With `keep_data`, the values are written under the new identifier when the session ends.
    pub async fn regenerate(&mut self, keep_data: bool) -> Result {
        let old_id = self.active()?.id.clone();
        let new_id = self.generator.generate(self.config.id_length())?;
        self.handler.destroy(&old_id).await?;
        log::debug!("Regenerated session {old_id:?} as {new_id:?}");

        let active = self.active_mut()?;
        {
            let mut state = active.session.state();
            if !keep_data {
                state.record.clear();
            }
            state.regenerate_requested = false;
        }
        active.id = new_id;
        Ok(())
    }

    /// Destroy the stored record of the active session and continue with an empty session
    /// under a fresh identifier.
    ///
    /// Handles obtained from [`session`](Self::session) stay valid and see the empty record.
    pub async fn reset(&mut self) -> Result<Session> {
        let old_id = self.active()?.id.clone();
        self.handler.destroy(&old_id).await?;

        let new_id = self.generator.generate(self.config.id_length())?;
        let record = self.load(&new_id).await?;
        log::debug!("Reset session {old_id:?} as {new_id:?}");

        let active = self.active_mut()?;
        *active.session.state() = SessionState {
            record,
            ..Default::default()
        };
        active.id = new_id;
        active.started_at = Utc::now();
        Ok(active.session.clone())
    }

    /// Persist the active session and return to idle.
    ///
    /// `record_override` replaces the session's values before they are written.
    /// Sessions marked with [`Session::destroy`] are destroyed instead, and sessions marked with
    /// [`Session::regenerate`] get a new identifier first.
    pub async fn end(&mut self, record_override: Option<SessionRecord>) -> Result<SessionOutcome> {
        let (destroyed, regenerate_requested) = {
            let state = self.active()?.session.state();
            (state.destroyed, state.regenerate_requested)
        };
        if destroyed {
            return self.destroy().await;
        }
        if regenerate_requested {
            self.regenerate(true).await?;
        }

        let active = self.active()?;
        let record = record_override.unwrap_or_else(|| active.session.record());
        let payload = self.codec.encode(&record)?;
        let id = active.id.clone();
        self.handler.write(&id, &payload).await?;
        self.handler.close().await?;

        let active = self.take_active()?;
        log::trace!("Ended session {:?}", active.id);
        Ok(SessionOutcome {
            id: active.id,
            started_at: active.started_at,
            destroyed: false,
        })
    }

    /// Remove the stored record of the active session and return to idle without writing anything.
    pub async fn destroy(&mut self) -> Result<SessionOutcome> {
        let id = self.active()?.id.clone();
        self.handler.destroy(&id).await?;
        self.handler.close().await?;

        let active = self.take_active()?;
        active.session.destroy();
        log::debug!("Destroyed session {:?}", active.id);
        Ok(SessionOutcome {
            id: active.id,
            started_at: active.started_at,
            destroyed: true,
        })
    }

    async fn bind(&mut self) -> Result<(SessionId, SessionRecord)> {
        let id = match self.id().cloned() {
            Some(id) => id,
            None => {
                log::trace!("Allocating a new session identifier");
                self.generator.generate(self.config.id_length())?
            }
        };
        let record = self.load(&id).await?;
        Ok((id, record))
    }

    async fn load(&mut self, id: &SessionId) -> Result<SessionRecord> {
        let payload = self.handler.read(id).await?;
        Ok(self.codec.decode(&payload))
    }

    async fn apply_timeout_policy(&mut self) -> Result {
        let now = Utc::now().timestamp();
        let timeout_key = self.config.timeout_key();
        let expired = self
            .active()?
            .session
            .state()
            .record
            .get(timeout_key)
            .and_then(SessionValue::as_i64)
            .is_some_and(|not_valid_after| not_valid_after < now);

        let session = if expired {
            log::debug!("Session timed out, starting over");
            self.reset().await?
        } else {
            self.session()?
        };

        let lifetime = i64::try_from(self.config.lifetime()).unwrap_or(i64::MAX);
        session
            .state()
            .record
            .insert(self.config.timeout_key(), now.saturating_add(lifetime))?;
        Ok(())
    }

    async fn maybe_collect_garbage(&mut self) {
        let (probability, divisor) = self.config.gc_probability();
        if probability == 0 {
            return;
        }
        let roll = rand::thread_rng().gen_range(0..divisor);
        if roll >= probability {
            return;
        }

        match self.handler.garbage_collect(self.config.lifetime()).await {
            Ok(removed) => log::debug!("Garbage collection removed {removed} sessions"),
            Err(error) => log::warn!("Session garbage collection failed: {error}"),
        }
    }

    fn active(&self) -> Result<&ActiveSession> {
        match &self.state {
            ManagerState::Active(active) => Ok(active),
            ManagerState::Idle { .. } => Err(Error::NotStarted),
        }
    }

    fn active_mut(&mut self) -> Result<&mut ActiveSession> {
        match &mut self.state {
            ManagerState::Active(active) => Ok(active),
            ManagerState::Idle { .. } => Err(Error::NotStarted),
        }
    }

    fn take_active(&mut self) -> Result<ActiveSession> {
        match mem::replace(&mut self.state, ManagerState::Idle { id: None }) {
            ManagerState::Active(active) => Ok(active),
            idle @ ManagerState::Idle { .. } => {
                self.state = idle;
                Err(Error::NotStarted)
            }
        }
    }
}
