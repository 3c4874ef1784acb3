use crate::session_id::MAX_ID_LENGTH;
use crate::{Error, Result};
use serde::Deserialize;
use std::env;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// The default name of the session cookie.
pub const DEFAULT_NAME: &str = "SESSIONID";
/// The default session lifetime, in seconds.
pub const DEFAULT_LIFETIME: u64 = 1440;
/// The default name of the record key that holds the session timeout.
pub const DEFAULT_TIMEOUT_KEY: &str = "__session_timeout";
/// The default length of generated session identifiers.
pub const DEFAULT_ID_LENGTH: usize = 80;
/// The default prefix of session file names and cache keys.
pub const DEFAULT_KEY_PREFIX: &str = "sess_";
/// The longest accepted prefix of session file names and cache keys, in bytes.
pub const MAX_KEY_PREFIX_LENGTH: usize = 64;

/// The `SameSite` policy of the session cookie.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Deserialize)]
pub enum SameSite {
    /// Only sent with same-site requests.
    Strict,
    /// Sent with same-site requests and top-level cross-site navigations.
    Lax,
    /// Always sent. Browsers require the cookie to be secure in this case.
    None,
}

impl Display for SameSite {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        })
    }
}

impl FromStr for SameSite {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "lax" => Ok(Self::Lax),
            "none" => Ok(Self::None),
            _ => Err(Error::InvalidConfiguration {
                option: "cookie_same_site",
                reason: "must be one of `Strict`, `Lax` or `None`",
            }),
        }
    }
}

/// The session configuration.
///
/// It is immutable once handed to a [`SessionManager`](crate::SessionManager), which shares it
/// with its storage handler through an `Arc`.
/// All setters validate their input and fail on empty strings or non-positive numbers.
///
/// # Example
///
/// ```
/// # fn main() -> session_lifecycle::Result {
/// use session_lifecycle::SessionConfig;
///
/// let config = SessionConfig::default()
///     .with_name("SESS")?
///     .with_lifetime(900)?;
/// assert_eq!(config.name(), "SESS");
/// assert!(SessionConfig::default().with_lifetime(0).is_err());
/// # Ok(()) }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    name: String,
    save_path: PathBuf,
    lifetime: u64,
    timeout_key: String,
    cookie_path: String,
    cookie_domain: String,
    cookie_secure: bool,
    cookie_http_only: bool,
    cookie_same_site: Option<SameSite>,
    id_length: usize,
    key_prefix: String,
    gc_probability: u32,
    gc_divisor: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            save_path: env::temp_dir().join("sessions"),
            lifetime: DEFAULT_LIFETIME,
            timeout_key: DEFAULT_TIMEOUT_KEY.to_string(),
            cookie_path: "/".to_string(),
            cookie_domain: String::new(),
            cookie_secure: false,
            cookie_http_only: true,
            cookie_same_site: None,
            id_length: DEFAULT_ID_LENGTH,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            gc_probability: 1,
            gc_divisor: 100,
        }
    }
}

fn non_empty(option: &'static str, value: impl Into<String>) -> Result<String> {
    let value = value.into();
    if value.is_empty() {
        Err(Error::InvalidConfiguration {
            option,
            reason: "must not be empty",
        })
    } else {
        Ok(value)
    }
}

impl SessionConfig {
    /// Build a configuration from named options, falling back to the defaults for every
    /// option that is not given.
    pub fn from_options(options: SessionOptions) -> Result<Self> {
        let mut config = Self::default();
        if let Some(name) = options.name {
            config = config.with_name(name)?;
        }
        if let Some(save_path) = options.save_path {
            config = config.with_save_path(save_path)?;
        }
        if let Some(lifetime) = options.lifetime {
            config = config.with_lifetime(lifetime)?;
        }
        if let Some(timeout_key) = options.timeout_key {
            config = config.with_timeout_key(timeout_key)?;
        }
        if let Some(cookie_path) = options.cookie_path {
            config = config.with_cookie_path(cookie_path);
        }
        if let Some(cookie_domain) = options.cookie_domain {
            config = config.with_cookie_domain(cookie_domain);
        }
        if let Some(secure) = options.cookie_secure {
            config = config.with_cookie_secure(secure);
        }
        if let Some(http_only) = options.cookie_http_only {
            config = config.with_cookie_http_only(http_only);
        }
        if let Some(same_site) = options.cookie_same_site {
            config = config.with_cookie_same_site(Some(same_site));
        }
        Ok(config)
    }

    /// Set the session name, which is also the name of the session cookie.
    pub fn with_name(mut self, name: impl Into<String>) -> Result<Self> {
        self.name = non_empty("name", name)?;
        Ok(self)
    }

    /// Set the storage location descriptor, e.g. the directory of the file handler.
    pub fn with_save_path(mut self, save_path: impl Into<PathBuf>) -> Result<Self> {
        let save_path = save_path.into();
        if save_path.as_os_str().is_empty() {
            return Err(Error::InvalidConfiguration {
                option: "save_path",
                reason: "must not be empty",
            });
        }
        self.save_path = save_path;
        Ok(self)
    }

    /// Set the session lifetime in seconds.
    pub fn with_lifetime(mut self, lifetime: u64) -> Result<Self> {
        if lifetime == 0 {
            return Err(Error::InvalidConfiguration {
                option: "lifetime",
                reason: "must be positive",
            });
        }
        self.lifetime = lifetime;
        Ok(self)
    }

    /// Set the record key that holds the timestamp after which the session is no longer valid.
    pub fn with_timeout_key(mut self, timeout_key: impl Into<String>) -> Result<Self> {
        self.timeout_key = non_empty("timeout_key", timeout_key)?;
        Ok(self)
    }

    /// Set the length of generated session identifiers, at most [`MAX_ID_LENGTH`].
    pub fn with_id_length(mut self, id_length: usize) -> Result<Self> {
        if id_length == 0 {
            return Err(Error::InvalidConfiguration {
                option: "id_length",
                reason: "must be positive",
            });
        }
        if id_length > MAX_ID_LENGTH {
            return Err(Error::InvalidConfiguration {
                option: "id_length",
                reason: "must not exceed the maximum identifier length",
            });
        }
        self.id_length = id_length;
        Ok(self)
    }

    /// Set the prefix of session file names and cache keys.
    /// Garbage collection never touches files without this prefix.
    /// The prefix is at most [`MAX_KEY_PREFIX_LENGTH`] bytes long.
    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Result<Self> {
        let key_prefix = non_empty("key_prefix", key_prefix)?;
        if key_prefix.len() > MAX_KEY_PREFIX_LENGTH {
            return Err(Error::InvalidConfiguration {
                option: "key_prefix",
                reason: "must not be longer than 64 bytes",
            });
        }
        self.key_prefix = key_prefix;
        Ok(self)
    }

    /// Run garbage collection on `probability` out of `divisor` session starts.
    /// A probability of zero disables it.
    pub fn with_gc_probability(mut self, probability: u32, divisor: u32) -> Result<Self> {
        if divisor == 0 {
            return Err(Error::InvalidConfiguration {
                option: "gc_divisor",
                reason: "must be positive",
            });
        }
        self.gc_probability = probability;
        self.gc_divisor = divisor;
        Ok(self)
    }

    /// Set the cookie path. An empty path omits the attribute.
    pub fn with_cookie_path(mut self, path: impl Into<String>) -> Self {
        self.cookie_path = path.into();
        self
    }

    /// Set the cookie domain. An empty domain omits the attribute.
    pub fn with_cookie_domain(mut self, domain: impl Into<String>) -> Self {
        self.cookie_domain = domain.into();
        self
    }

    /// Set whether the cookie is only sent over secure connections.
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    /// Set whether the cookie is hidden from client-side scripts.
    pub fn with_cookie_http_only(mut self, http_only: bool) -> Self {
        self.cookie_http_only = http_only;
        self
    }

    /// Set the `SameSite` policy of the cookie. `None` omits the attribute.
    pub fn with_cookie_same_site(mut self, same_site: Option<SameSite>) -> Self {
        self.cookie_same_site = same_site;
        self
    }

    /// The session name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The storage location descriptor.
    pub fn save_path(&self) -> &Path {
        &self.save_path
    }

    /// The session lifetime in seconds.
    pub fn lifetime(&self) -> u64 {
        self.lifetime
    }

    /// The record key holding the session timeout.
    pub fn timeout_key(&self) -> &str {
        &self.timeout_key
    }

    /// The length of generated session identifiers.
    pub fn id_length(&self) -> usize {
        self.id_length
    }

    /// The prefix of session file names and cache keys.
    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// The garbage collection probability as `(probability, divisor)`.
    pub fn gc_probability(&self) -> (u32, u32) {
        (self.gc_probability, self.gc_divisor)
    }

    /// The cookie path.
    pub fn cookie_path(&self) -> &str {
        &self.cookie_path
    }

    /// The cookie domain.
    pub fn cookie_domain(&self) -> &str {
        &self.cookie_domain
    }

    /// Whether the cookie is secure.
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }

    /// Whether the cookie is http-only.
    pub fn cookie_http_only(&self) -> bool {
        self.cookie_http_only
    }

    /// The `SameSite` policy of the cookie.
    pub fn cookie_same_site(&self) -> Option<SameSite> {
        self.cookie_same_site
    }
}

/// Named session options, each of which overrides the corresponding default when present.
///
/// Options can be deserialized from any serde format, or read from the process environment
/// with [`SessionOptions::from_env`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOptions {
    /// The session and cookie name.
    pub name: Option<String>,
    /// The storage location descriptor.
    pub save_path: Option<PathBuf>,
    /// The session lifetime in seconds.
    pub lifetime: Option<u64>,
    /// The record key holding the session timeout.
    pub timeout_key: Option<String>,
    /// The cookie path.
    pub cookie_path: Option<String>,
    /// The cookie domain.
    pub cookie_domain: Option<String>,
    /// The cookie secure flag.
    pub cookie_secure: Option<bool>,
    /// The cookie http-only flag.
    pub cookie_http_only: Option<bool>,
    /// The cookie same-site policy.
    pub cookie_same_site: Option<SameSite>,
}

impl SessionOptions {
    /// Read the ambient session settings from `SESSION_*` environment variables.
    ///
    /// Unset variables stay `None`. Malformed numbers, flags or same-site policies are errors.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            name: env::var("SESSION_NAME").ok(),
            save_path: env::var_os("SESSION_SAVE_PATH").map(PathBuf::from),
            lifetime: env_parsed("SESSION_LIFETIME", "lifetime", "must be a positive integer")?,
            timeout_key: env::var("SESSION_TIMEOUT_KEY").ok(),
            cookie_path: env::var("SESSION_COOKIE_PATH").ok(),
            cookie_domain: env::var("SESSION_COOKIE_DOMAIN").ok(),
            cookie_secure: env_flag("SESSION_COOKIE_SECURE", "cookie_secure")?,
            cookie_http_only: env_flag("SESSION_COOKIE_HTTPONLY", "cookie_http_only")?,
            cookie_same_site: env::var("SESSION_COOKIE_SAMESITE")
                .ok()
                .map(|value| value.parse())
                .transpose()?,
        })
    }
}

fn env_parsed<T: FromStr>(
    variable: &str,
    option: &'static str,
    reason: &'static str,
) -> Result<Option<T>> {
    env::var(variable)
        .ok()
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| Error::InvalidConfiguration { option, reason })
        })
        .transpose()
}

fn env_flag(variable: &str, option: &'static str) -> Result<Option<bool>> {
    env::var(variable)
        .ok()
        .map(|value| match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "on" | "yes" => Ok(true),
            "0" | "false" | "off" | "no" | "" => Ok(false),
            _ => Err(Error::InvalidConfiguration {
                option,
                reason: "must be a boolean flag",
            }),
        })
        .transpose()
}
