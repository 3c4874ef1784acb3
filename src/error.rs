use std::path::PathBuf;

/// All errors that can occur in this crate.
///
/// Every variant is fatal for the request that produced it.
/// Corrupted session payloads are not represented here: the codec recovers from them
/// locally by yielding an empty record.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A configuration option was given an empty or non-positive value.
    #[error("invalid session configuration option `{option}`: {reason}")]
    InvalidConfiguration {
        /// The name of the offending option.
        option: &'static str,
        /// Why the value was rejected.
        reason: &'static str,
    },

    /// A storage handler was used before a configuration was attached to it.
    #[error("the storage handler was used before a configuration was attached")]
    NotConfigured,

    /// A storage handler was used before it was opened.
    #[error("the storage handler was used before it was opened")]
    NotOpen,

    /// `start` was called while a session was already active.
    #[error("a session is already active, end it before starting a new one")]
    AlreadyStarted,

    /// An operation that requires an active session was called while idle.
    #[error("no session is active")]
    NotStarted,

    /// The identifier was changed while a session was active.
    #[error("the session identifier cannot be changed while a session is active")]
    IdentifierLocked,

    /// The response headers were already committed, so the session cookie can no longer be set.
    #[error("response headers were already sent, the session cookie can no longer be set")]
    HeadersAlreadySent,

    /// A session identifier did not pass validation.
    #[error("invalid session identifier: {0}")]
    InvalidIdentifier(&'static str),

    /// A storage handler failed to access its backing storage.
    #[error("session storage error at `{}`: {source}", path.display())]
    Storage {
        /// The file or directory that could not be accessed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A value that is not a scalar or an array of scalars was stored in a session.
    #[error("session key `{key}` can only hold booleans, numbers, strings or arrays of those")]
    NonScalarValue {
        /// The key the value was assigned to.
        key: String,
    },

    /// The secure random source is unavailable.
    #[error("the secure random source failed: {0}")]
    RandomSource(#[from] rand::Error),

    /// A session record could not be serialized.
    #[error("failed to serialize the session record: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Encrypting a session payload failed.
    #[error("failed to encrypt the session payload")]
    Encryption,

    /// The generated cookie is not a valid header value.
    #[error("the session cookie is not a valid header value")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),

    /// An error reported by a cache backend driver.
    #[error("session backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

impl Error {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }
}

mod expect_impl_error {
    trait ExpectImplError: std::error::Error + Send + Sync + 'static {}

    impl ExpectImplError for super::Error {}
}
