//! Content fingerprints used as mail identity.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::mail::{self, Mail};
use crate::{Error, Result};

/// Maximum fingerprint length, in characters.
pub const MAX_FINGERPRINT_LEN: usize = 64;

/// Deterministic digest identifying a mail.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an existing fingerprint string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedMail`] if the value is empty, longer than
    /// [`MAX_FINGERPRINT_LEN`], or contains control characters.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(Error::MalformedMail("fingerprint is empty".into()));
        }
        if value.chars().any(char::is_control) {
            return Err(Error::MalformedMail(
                "fingerprint contains control characters".into(),
            ));
        }
        if value.chars().count() > MAX_FINGERPRINT_LEN {
            return Err(Error::MalformedMail(format!(
                "fingerprint exceeds {MAX_FINGERPRINT_LEN} characters"
            )));
        }
        Ok(Self(value))
    }

    /// Borrow the fingerprint as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Fingerprint> for String {
    fn from(fingerprint: Fingerprint) -> Self {
        fingerprint.0
    }
}

impl std::str::FromStr for Fingerprint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Computes fingerprints from mail content.
///
/// Implementations must be deterministic and stable across process
/// restarts: the same content always yields the same fingerprint.
pub trait Fingerprinter: Send + Sync {
    /// Fingerprint a mail.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedMail`] if the mail cannot be fingerprinted.
    fn fingerprint<M: Mail + ?Sized>(&self, mail: &M) -> Result<Fingerprint>;
}

/// SHA-256 over the mail's content fields, hex encoded.
///
/// Each field name and value is framed with a big-endian `u64` length
/// prefix, so field boundaries cannot be shifted to forge a collision.
/// The sheet name is not hashed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Fingerprinter;

impl Sha256Fingerprinter {
    /// Create a new fingerprinter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Digest an ordered list of content fields.
    #[must_use]
    pub fn digest_fields(fields: &[(&str, &str)]) -> String {
        let mut hasher = Sha256::new();
        for (name, value) in fields {
            for part in [name.as_bytes(), value.as_bytes()] {
                hasher.update((part.len() as u64).to_be_bytes());
                hasher.update(part);
            }
        }
        hex::encode(hasher.finalize())
    }
}

impl Fingerprinter for Sha256Fingerprinter {
    fn fingerprint<M: Mail + ?Sized>(&self, mail: &M) -> Result<Fingerprint> {
        mail::validate(mail)?;
        Ok(Fingerprint(Self::digest_fields(&mail.content_fields())))
    }
}
