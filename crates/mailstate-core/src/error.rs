//! Error types for the state store.

use thiserror::Error;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A record with this fingerprint already exists.
    ///
    /// Callers should treat the mail as already handled and skip it.
    #[error("Mail already recorded: {fingerprint}")]
    DuplicateKey {
        /// Fingerprint that collided with an existing record.
        fingerprint: String,
    },

    /// The backing database is unreachable or failed the operation.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    /// Mail is missing fields required for fingerprinting or grouping.
    #[error("Malformed mail: {0}")]
    MalformedMail(String),

    /// A stored row could not be decoded.
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl Error {
    /// Returns true if this is a uniqueness violation on the fingerprint.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }

    /// Returns true if the caller may retry the operation with backoff.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
