use crate::{Error, Result};
use std::fmt::{Debug, Display, Formatter};

pub(crate) mod generator;

/// The longest session identifier that is accepted from a client or generated.
///
/// Together with [`MAX_KEY_PREFIX_LENGTH`](crate::MAX_KEY_PREFIX_LENGTH), this keeps session
/// file names well below the 255 byte limit of common file systems.
pub const MAX_ID_LENGTH: usize = 128;

/// An opaque session identifier.
///
/// Identifiers only consist of ASCII letters, digits and hyphens, which makes them safe to use
/// in cookies and as file names.
/// The `Debug` output is truncated so that identifiers do not end up in logs.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SessionId(String);

pub(crate) fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-'
}

impl SessionId {
    /// Validate an identifier received from a client.
    ///
    /// # Example
    ///
    /// ```
    /// use session_lifecycle::SessionId;
    ///
    /// assert!(SessionId::parse("abc-123").is_ok());
    /// assert!(SessionId::parse("../etc/passwd").is_err());
    /// assert!(SessionId::parse("").is_err());
    /// ```
    pub fn parse(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() {
            Err(Error::InvalidIdentifier("the identifier is empty"))
        } else if value.len() > MAX_ID_LENGTH {
            Err(Error::InvalidIdentifier("the identifier is too long"))
        } else if !value.chars().all(is_allowed_char) {
            Err(Error::InvalidIdentifier(
                "the identifier contains characters other than letters, digits and hyphens",
            ))
        } else {
            Ok(Self(value))
        }
    }

    /// The identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn from_generated(value: String) -> Self {
        debug_assert!(!value.is_empty() && value.chars().all(is_allowed_char));
        Self(value)
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Debug for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let prefix: String = self.0.chars().take(6).collect();
        write!(f, "SessionId({prefix}…, len={})", self.0.len())
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
