//! Server-side HTTP sessions.
//!
//! This crate issues and tracks a session identifier per client, persists small key/value
//! session records across requests through a pluggable storage handler, enforces session
//! timeouts, and emits the session cookie on responses.
//!
//! # Components
//!
//! * [`SessionManager`] drives the lifecycle of one session per request: it binds an identifier,
//!   loads the record, applies the timeout policy and writes the record back.
//! * [`StorageHandler`] is the backend contract, implemented by [`MemoryHandler`],
//!   [`FileHandler`], [`CacheHandler`] and [`NullHandler`].
//! * [`PayloadCodec`] serializes records and optionally encrypts them at rest.
//! * [`Session`] is the typed accessor that request handlers use.
//! * [`SessionMiddleware`] wires it all into an `http` request/response pipeline.
//!
//! # Security
//!
//! Identifiers are drawn from the operating system's secure random source and carry more than
//! 470 bits of entropy at the default length of 80 characters.
//! Identifiers of a different length are not trusted and are replaced when the session starts.
//! Session records can only hold scalars and arrays of scalars, and are authenticated and
//! encrypted at rest when the codec has an [`EncryptionKey`]. Tampered payloads are discarded.
//!
//! # Example
//!
//! ```
//! use http::header::{COOKIE, SET_COOKIE};
//! use http::{Request, Response};
//! use session_lifecycle::{MemoryHandler, RequestSessionExt, SessionConfig, SessionMiddleware};
//!
//! # fn main() -> session_lifecycle::Result {
//! # async_std::task::block_on(async {
//! let config = SessionConfig::default().with_name("SESS")?.with_lifetime(900)?;
//! let middleware = SessionMiddleware::new(config, MemoryHandler::new());
//!
//! // The first request logs in.
//! let response = middleware
//!     .handle(Request::new(()), |request: Request<()>| async move {
//!         let session = request.session().unwrap();
//!         session.set("user", "joe").unwrap();
//!         session.regenerate();
//!         Response::new(())
//!     })
//!     .await?;
//! let set_cookie = response.headers()[SET_COOKIE].to_str().unwrap();
//! assert!(set_cookie.starts_with("SESS="));
//! assert!(set_cookie.contains("; max-age=900"));
//! let cookie = set_cookie.split(';').next().unwrap().to_string();
//!
//! // The second request presents the cookie and finds the user.
//! let request = Request::builder().header(COOKIE, cookie).body(()).unwrap();
//! middleware
//!     .handle(request, |request: Request<()>| async move {
//!         let session = request.session().unwrap();
//!         assert_eq!(session.get::<String>("user").as_deref(), Some("joe"));
//!         Response::new(())
//!     })
//!     .await?;
//! # Ok(()) }) }
//! ```

#![forbid(unsafe_code)]
#![deny(
    future_incompatible,
    missing_debug_implementations,
    nonstandard_style,
    missing_docs,
    unreachable_pub,
    missing_copy_implementations,
    unused_qualifications
)]

mod cache_handler;
mod codec;
mod config;
mod cookie_header;
mod error;
mod file_handler;
mod manager;
mod memory_handler;
mod middleware;
mod null_handler;
mod record;
mod session;
mod session_id;
mod storage_handler;

pub use cache_handler::{CacheBackend, CacheHandler, InMemoryCache};
pub use codec::{EncryptionKey, PayloadCodec};
pub use config::{
    SameSite, SessionConfig, SessionOptions, DEFAULT_ID_LENGTH, DEFAULT_KEY_PREFIX,
    DEFAULT_LIFETIME, DEFAULT_NAME, DEFAULT_TIMEOUT_KEY, MAX_KEY_PREFIX_LENGTH,
};
pub use cookie_header::{find_cookie, format_set_cookie};
pub use error::Error;
pub use file_handler::FileHandler;
pub use manager::{SessionManager, SessionOutcome};
pub use memory_handler::MemoryHandler;
pub use middleware::{RequestSessionExt, SessionMiddleware};
pub use null_handler::NullHandler;
pub use record::{SessionRecord, SessionValue};
pub use session::Session;
pub use session_id::generator::{IdGenerator, RandomIdGenerator, SequentialIdGenerator};
pub use session_id::{SessionId, MAX_ID_LENGTH};
pub use storage_handler::StorageHandler;

/// A result with this crate's [`Error`] and a default return type of `()`.
pub type Result<T = ()> = std::result::Result<T, Error>;
