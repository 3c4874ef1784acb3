use crate::codec::PayloadCodec;
use crate::config::SessionConfig;
use crate::cookie_header::{find_cookie, format_set_cookie};
use crate::manager::SessionManager;
use crate::session::Session;
use crate::session_id::SessionId;
use crate::storage_handler::StorageHandler;
use crate::Result;
use http::header::SET_COOKIE;
use http::{HeaderValue, Request, Response};
use std::future::Future;
use std::sync::Arc;

/// Runs every request inside a session.
///
/// For each request, the middleware resumes the session named by the session cookie, or starts a
/// new one, and inserts the [`Session`] into the request extensions. After the downstream handler
/// returned, it ends the session and appends the `Set-Cookie` header to the response.
/// Destroyed sessions get no cookie.
///
/// The storage handler is cloned into each request, so handlers must share their backend between
/// clones, as all built-in handlers do.
///
/// # Example
///
/// ```
/// # fn main() -> session_lifecycle::Result {
/// # async_std::task::block_on(async {
/// use http::{Request, Response};
/// use session_lifecycle::{MemoryHandler, RequestSessionExt, SessionConfig, SessionMiddleware};
///
/// let middleware = SessionMiddleware::new(SessionConfig::default(), MemoryHandler::new());
/// let request = Request::new(());
/// let response = middleware
///     .handle(request, |request: Request<()>| async move {
///         let session = request.session().expect("session middleware is installed");
///         session.set("views", session.get_or("views", 0) + 1).expect("views are scalar");
///         Response::new(())
///     })
///     .await?;
/// assert!(response.headers().contains_key(http::header::SET_COOKIE));
/// # Ok(()) }) }
/// ```
#[derive(Debug, Clone)]
pub struct SessionMiddleware<Handler> {
    config: Arc<SessionConfig>,
    handler: Handler,
    codec: PayloadCodec,
}

impl<Handler: StorageHandler + Clone> SessionMiddleware<Handler> {
    /// Create a middleware storing sessions with the given handler.
    pub fn new(config: SessionConfig, handler: Handler) -> Self {
        Self {
            config: Arc::new(config),
            handler,
            codec: PayloadCodec::plain(),
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

    /// A fresh session manager for one request.
    pub fn manager(&self) -> SessionManager<Handler> {
        SessionManager::with_shared_config(Arc::clone(&self.config), self.handler.clone())
            .with_codec(self.codec.clone())
    }

    /// Run `next` inside the session of `request`.
    ///
    /// Any failure to start or end the session is returned as an error, and no cookie is sent.
    pub async fn handle<RequestBody, ResponseBody, Next, NextFuture>(
        &self,
        mut request: Request<RequestBody>,
        next: Next,
    ) -> Result<Response<ResponseBody>>
    where
        Next: FnOnce(Request<RequestBody>) -> NextFuture,
        NextFuture: Future<Output = Response<ResponseBody>>,
    {
        let mut manager = self.manager();
        if let Some(cookie_value) = find_cookie(request.headers(), self.config.name()) {
            if !cookie_value.is_empty() {
                match SessionId::parse(cookie_value) {
                    Ok(id) => manager.set_identifier(id)?,
                    Err(error) => log::warn!("Ignoring session cookie: {error}"),
                }
            }
        }

        let session = manager.start().await?;
        request.extensions_mut().insert(session);
        let mut response = next(request).await;

        let outcome = manager.end(None).await?;
        if !outcome.destroyed {
            let cookie = format_set_cookie(&self.config, &outcome.id, outcome.started_at);
            response
                .headers_mut()
                .append(SET_COOKIE, HeaderValue::from_str(&cookie)?);
        }
        manager.mark_headers_sent();
        Ok(response)
    }
}

/// Access to the session that the [`SessionMiddleware`] attached to a request.
pub trait RequestSessionExt {
    /// The session of this request, if the request passed through the session middleware.
    fn session(&self) -> Option<&Session>;
}

impl<Body> RequestSessionExt for Request<Body> {
    fn session(&self) -> Option<&Session> {
        self.extensions().get::<Session>()
    }
}
