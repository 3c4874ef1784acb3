use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue, Request, Response};
use session_lifecycle::{
    find_cookie, EncryptionKey, FileHandler, MemoryHandler, PayloadCodec, RequestSessionExt,
    SameSite, SessionConfig, SessionId, SessionMiddleware,
};

fn config() -> SessionConfig {
    SessionConfig::default()
        .with_name("SESS")
        .unwrap()
        .with_lifetime(900)
        .unwrap()
}

fn request_with_cookie(cookie: &str) -> Request<()> {
    Request::builder()
        .header(COOKIE, cookie)
        .body(())
        .unwrap()
}

fn set_cookie(response: &Response<()>) -> Option<String> {
    response
        .headers()
        .get(SET_COOKIE)
        .map(|value| value.to_str().unwrap().to_string())
}

fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap().to_string()
}

/// A request without a cookie starts a new session and receives its cookie.
#[async_std::test]
async fn test_new_session_sets_cookie() {
    let middleware = SessionMiddleware::new(config(), MemoryHandler::new());
    let response = middleware
        .handle(Request::new(()), |request: Request<()>| async move {
            assert!(request.session().is_some());
            Response::new(())
        })
        .await
        .unwrap();

    let set_cookie = set_cookie(&response).unwrap();
    let pair = cookie_pair(&set_cookie);
    let id = pair.strip_prefix("SESS=").unwrap();
    assert_eq!(id.len(), 80);
    assert!(set_cookie.contains("; expires="));
    assert!(set_cookie.ends_with(" GMT; max-age=900; path=/; httponly"));
}

/// A returning client resumes its session and keeps its identifier.
#[async_std::test]
async fn test_resume_session() {
    let middleware = SessionMiddleware::new(config(), MemoryHandler::new());
    let response = middleware
        .handle(Request::new(()), |request: Request<()>| async move {
            request.session().unwrap().set("user", "joe").unwrap();
            Response::new(())
        })
        .await
        .unwrap();
    let pair = cookie_pair(&set_cookie(&response).unwrap());

    let response = middleware
        .handle(
            request_with_cookie(&format!("theme=dark; {pair}")),
            |request: Request<()>| async move {
                let session = request.session().unwrap();
                assert_eq!(session.get::<String>("user").as_deref(), Some("joe"));
                Response::new(())
            },
        )
        .await
        .unwrap();
    assert_eq!(cookie_pair(&set_cookie(&response).unwrap()), pair);
}

/// Malformed and empty cookies are ignored, and a new session is started.
#[async_std::test]
async fn test_invalid_cookie_is_ignored() {
    let middleware = SessionMiddleware::new(config(), MemoryHandler::new());
    for cookie in ["SESS=../../etc/passwd", "SESS=", "SESS=a%20b"] {
        let response = middleware
            .handle(request_with_cookie(cookie), |request: Request<()>| async move {
                assert!(request.session().unwrap().keys().len() == 1);
                Response::new(())
            })
            .await
            .unwrap();
        let set_cookie = set_cookie(&response).unwrap();
        assert_eq!(cookie_pair(&set_cookie).len(), "SESS=".len() + 80);
    }
}

/// An overlong cookie on the file backend is ignored, and the request gets a fresh session.
#[async_std::test]
async fn test_overlong_cookie_with_file_handler() {
    let directory = tempfile::tempdir().unwrap();
    let config = config().with_save_path(directory.path()).unwrap();
    let middleware = SessionMiddleware::new(config, FileHandler::new());

    let cookie = format!("SESS={}", "a".repeat(256));
    let response = middleware
        .handle(request_with_cookie(&cookie), |request: Request<()>| async move {
            request.session().unwrap().set("user", "joe").unwrap();
            Response::new(())
        })
        .await
        .unwrap();

    let pair = cookie_pair(&set_cookie(&response).unwrap());
    let id = pair.strip_prefix("SESS=").unwrap();
    assert_eq!(id.len(), 80);
    assert!(directory.path().join(format!("sess_{id}")).exists());
}

/// A session destroyed by the handler is removed, and no cookie is sent.
#[async_std::test]
async fn test_destroyed_session_sets_no_cookie() {
    let handler = MemoryHandler::new();
    let middleware = SessionMiddleware::new(config(), handler.clone());
    let response = middleware
        .handle(Request::new(()), |request: Request<()>| async move {
            request.session().unwrap().set("user", "joe").unwrap();
            Response::new(())
        })
        .await
        .unwrap();
    let pair = cookie_pair(&set_cookie(&response).unwrap());
    assert_eq!(handler.len(), 1);

    let response = middleware
        .handle(request_with_cookie(&pair), |request: Request<()>| async move {
            request.session().unwrap().destroy();
            Response::new(())
        })
        .await
        .unwrap();
    assert_eq!(set_cookie(&response), None);
    assert!(handler.is_empty());
}

/// Configured cookie attributes appear in the header.
#[async_std::test]
async fn test_cookie_attributes() {
    let config = config()
        .with_cookie_path("/app")
        .with_cookie_domain("example.com")
        .with_cookie_secure(true)
        .with_cookie_http_only(false)
        .with_cookie_same_site(Some(SameSite::Strict));
    let middleware = SessionMiddleware::new(config, MemoryHandler::new());
    let response = middleware
        .handle(Request::new(()), |_request: Request<()>| async move {
            Response::new(())
        })
        .await
        .unwrap();

    let set_cookie = set_cookie(&response).unwrap();
    assert!(set_cookie
        .ends_with("; max-age=900; path=/app; domain=example.com; secure; SameSite=Strict"));
    assert!(!set_cookie.contains("httponly"));
}

/// Encrypted file-backed sessions work end to end.
#[async_std::test]
async fn test_encrypted_file_sessions() {
    let directory = tempfile::tempdir().unwrap();
    let config = config().with_save_path(directory.path()).unwrap();
    let middleware = SessionMiddleware::new(config, FileHandler::new())
        .with_codec(PayloadCodec::encrypted(&EncryptionKey::derive("secret")));

    let response = middleware
        .handle(Request::new(()), |request: Request<()>| async move {
            request.session().unwrap().set("cart", vec![4, 2]).unwrap();
            Response::new(())
        })
        .await
        .unwrap();
    let pair = cookie_pair(&set_cookie(&response).unwrap());

    middleware
        .handle(request_with_cookie(&pair), |request: Request<()>| async move {
            let session = request.session().unwrap();
            assert_eq!(session.get::<Vec<i64>>("cart"), Some(vec![4, 2]));
            Response::new(())
        })
        .await
        .unwrap();
}

#[test]
fn test_find_cookie() {
    let mut headers = HeaderMap::new();
    headers.append(COOKIE, HeaderValue::from_static("a=1; SESS=abc%2Dd"));
    headers.append(COOKIE, HeaderValue::from_static("b=2"));
    assert_eq!(find_cookie(&headers, "SESS").as_deref(), Some("abc-d"));
    assert_eq!(find_cookie(&headers, "b").as_deref(), Some("2"));
    assert_eq!(find_cookie(&headers, "missing"), None);
    assert!(SessionId::parse(find_cookie(&headers, "SESS").unwrap()).is_ok());
}
