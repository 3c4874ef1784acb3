use crate::config::SessionConfig;
use crate::session_id::SessionId;
use chrono::{DateTime, Duration, Utc};
use cookie::Cookie;
use http::header::COOKIE;
use http::HeaderMap;

/// The date format of the `expires` attribute, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
const COOKIE_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Format the value of the `Set-Cookie` header for a session.
///
/// The cookie expires `lifetime` seconds after `started_at`. Path, domain, secure, http-only and
/// same-site are only present if configured.
///
/// # Example
///
/// ```
/// # fn main() -> session_lifecycle::Result {
/// use chrono::{TimeZone, Utc};
/// use session_lifecycle::{format_set_cookie, SameSite, SessionConfig, SessionId};
///
/// let config = SessionConfig::default()
///     .with_name("SESS")?
///     .with_lifetime(900)?
///     .with_cookie_same_site(Some(SameSite::Lax));
/// let started_at = Utc.with_ymd_and_hms(1994, 11, 6, 8, 34, 37).unwrap();
///
/// assert_eq!(
///     format_set_cookie(&config, &SessionId::parse("abc")?, started_at),
///     "SESS=abc; expires=Sun, 06 Nov 1994 08:49:37 GMT; max-age=900; path=/; httponly; SameSite=Lax",
/// );
/// # Ok(()) }
/// ```
pub fn format_set_cookie(
    config: &SessionConfig,
    id: &SessionId,
    started_at: DateTime<Utc>,
) -> String {
    let lifetime = i64::try_from(config.lifetime()).unwrap_or(i64::MAX);
    let expires = Duration::try_seconds(lifetime)
        .and_then(|lifetime| started_at.checked_add_signed(lifetime))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    let mut cookie = format!(
        "{}={}; expires={}; max-age={}",
        config.name(),
        urlencoding::encode(id.as_str()),
        expires.format(COOKIE_DATE_FORMAT),
        config.lifetime(),
    );
    if !config.cookie_path().is_empty() {
        cookie.push_str(&format!("; path={}", config.cookie_path()));
    }
    if !config.cookie_domain().is_empty() {
        cookie.push_str(&format!("; domain={}", config.cookie_domain()));
    }
    if config.cookie_secure() {
        cookie.push_str("; secure");
    }
    if config.cookie_http_only() {
        cookie.push_str("; httponly");
    }
    if let Some(same_site) = config.cookie_same_site() {
        cookie.push_str(&format!("; SameSite={same_site}"));
    }
    cookie
}

/// Find the percent-decoded value of the cookie `name` in the `Cookie` headers of a request.
///
/// Malformed cookie pairs are skipped.
pub fn find_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse_encoded)
        .filter_map(|cookie| cookie.ok())
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
}
