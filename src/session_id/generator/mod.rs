use crate::session_id::{is_allowed_char, SessionId, MAX_ID_LENGTH};
use crate::{Error, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};

/// A type with the ability to generate session identifiers.
pub trait IdGenerator {
    /// Generate an identifier of exactly `length` characters.
    ///
    /// Fails with [`Error::InvalidIdentifier`] if `length` is zero or exceeds [`MAX_ID_LENGTH`].
    fn generate(&mut self, length: usize) -> Result<SessionId>;
}

fn check_length(length: usize) -> Result {
    if length == 0 {
        Err(Error::InvalidIdentifier("the identifier length must be positive"))
    } else if length > MAX_ID_LENGTH {
        Err(Error::InvalidIdentifier("the identifier length exceeds the maximum"))
    } else {
        Ok(())
    }
}

/// The default identifier generator with focus on security.
///
/// It draws bytes from a cryptographically secure random source, base64-encodes them and keeps
/// only letters, digits and hyphens, drawing again until the identifier is long enough.
/// This gives `log_2(26+26+10+1) ≥ 5.97` bits of entropy per character.
///
/// The random source is [`OsRng`] by default. Tests may inject a seeded generator, but it must
/// still be a [`CryptoRng`]. If the source fails, the error is returned, never replaced by a
/// weaker source.
#[derive(Debug, Default, Clone)]
pub struct RandomIdGenerator<R = OsRng> {
    rng: R,
}

impl<R: RngCore + CryptoRng> RandomIdGenerator<R> {
    /// Create a generator drawing from the given random source.
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: RngCore + CryptoRng> IdGenerator for RandomIdGenerator<R> {
    fn generate(&mut self, length: usize) -> Result<SessionId> {
        check_length(length)?;
        let mut id = String::with_capacity(length);
        let mut bytes = vec![0; length];

        while id.len() < length {
            self.rng.try_fill_bytes(&mut bytes)?;
            let missing = length - id.len();
            id.extend(
                URL_SAFE_NO_PAD
                    .encode(&bytes)
                    .chars()
                    .filter(|c| is_allowed_char(*c))
                    .take(missing),
            );
        }

        Ok(SessionId::from_generated(id))
    }
}

/// A debug generator that generates an ascending sequence of integers, formatted as strings padded with zeroes.
///
/// **Never use this outside of tests**, its identifiers are trivially predictable.
#[derive(Debug, Default, Clone)]
#[allow(missing_copy_implementations)]
pub struct SequentialIdGenerator {
    next_index: usize,
}

impl IdGenerator for SequentialIdGenerator {
    fn generate(&mut self, length: usize) -> Result<SessionId> {
        check_length(length)?;
        let id = format!("{:0length$}", self.next_index);
        if id.len() != length {
            return Err(Error::InvalidIdentifier(
                "the sequence outgrew the identifier length",
            ));
        }
        self.next_index += 1;
        Ok(SessionId::from_generated(id))
    }
}
