use crate::record::SessionRecord;
use crate::{Error, Result};
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::borrow::Cow;
use std::fmt::{Debug, Formatter};

const NONCE_LENGTH: usize = 12;
const KEY_LENGTH: usize = 32;
const KEY_DERIVATION_CONTEXT: &str =
    "session-lifecycle 2026-10-17 14:00:00 session payload encryption key";

/// A 256 bit key for encrypting session payloads at rest.
#[derive(Clone, Eq, PartialEq)]
#[allow(missing_copy_implementations)]
pub struct EncryptionKey([u8; KEY_LENGTH]);

impl EncryptionKey {
    /// The key length in bytes.
    pub const LENGTH: usize = KEY_LENGTH;

    /// Use the given raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Derive a key from a secret passphrase with BLAKE3 in key derivation mode.
    ///
    /// The same secret always derives the same key, so every server sharing a backend
    /// must be given the same secret.
    pub fn derive(secret: &str) -> Self {
        Self(blake3::derive_key(KEY_DERIVATION_CONTEXT, secret.as_bytes()))
    }
}

impl Debug for EncryptionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// Converts session records to storage-safe bytes and back.
///
/// Records are serialized as JSON. With an [`EncryptionKey`], the JSON is sealed with
/// AES-256-GCM under a fresh random nonce, and `nonce || ciphertext` is stored base64 encoded.
///
/// Decoding never fails: empty, malformed or tampered payloads yield an empty record, since
/// a session that was never written cannot be told apart from an empty one.
///
/// # Example
///
/// ```
/// # fn main() -> session_lifecycle::Result {
/// use session_lifecycle::{EncryptionKey, PayloadCodec, SessionRecord};
///
/// let codec = PayloadCodec::encrypted(&EncryptionKey::derive("correct horse battery staple"));
/// let mut record = SessionRecord::new();
/// record.insert("user", "joe")?;
///
/// let payload = codec.encode(&record)?;
/// assert_eq!(codec.decode(&payload), record);
/// assert!(codec.decode(b"garbage").is_empty());
/// # Ok(()) }
/// ```
#[derive(Clone, Default)]
#[allow(missing_copy_implementations)]
pub struct PayloadCodec {
    cipher: Option<Aes256Gcm>,
}

impl Debug for PayloadCodec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadCodec")
            .field("encrypted", &self.is_encrypted())
            .finish()
    }
}

impl PayloadCodec {
    /// A codec that stores serialized records without encryption.
    pub fn plain() -> Self {
        Self::default()
    }

    /// A codec that encrypts serialized records with the given key.
    pub fn encrypted(key: &EncryptionKey) -> Self {
        Self {
            cipher: Some(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0))),
        }
    }

    /// Returns true if this codec encrypts payloads.
    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    /// Serialize, and possibly encrypt, a record.
    pub fn encode(&self, record: &SessionRecord) -> Result<Vec<u8>> {
        let serialized = serde_json::to_vec(record)?;
        let Some(cipher) = &self.cipher else {
            return Ok(serialized);
        };

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, serialized.as_slice())
            .map_err(|_| Error::Encryption)?;
        let mut sealed = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed).into_bytes())
    }

    /// Decrypt, if configured, and deserialize a payload.
    pub fn decode(&self, payload: &[u8]) -> SessionRecord {
        if payload.is_empty() {
            return SessionRecord::new();
        }

        self.try_decode(payload).unwrap_or_else(|| {
            log::warn!(
                "Discarding corrupted session payload of {} bytes",
                payload.len()
            );
            SessionRecord::new()
        })
    }

    fn try_decode(&self, payload: &[u8]) -> Option<SessionRecord> {
        let plaintext = match &self.cipher {
            None => Cow::Borrowed(payload),
            Some(cipher) => {
                let sealed = STANDARD.decode(payload).ok()?;
                if sealed.len() < NONCE_LENGTH {
                    return None;
                }
                let (nonce, ciphertext) = sealed.split_at(NONCE_LENGTH);
                Cow::Owned(cipher.decrypt(Nonce::from_slice(nonce), ciphertext).ok()?)
            }
        };
        serde_json::from_slice(&plaintext).ok()
    }
}
