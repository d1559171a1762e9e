//! State store data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;
use crate::{Error, Result};

/// Disposition of a mail at the time it was first recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailState {
    /// Seen but not processed.
    #[default]
    Unprocessed,
    /// Processed automatically.
    Processed,
    /// Handled manually.
    Manual,
}

impl MailState {
    /// All dispositions, in declaration order.
    pub const ALL: [Self; 3] = [Self::Unprocessed, Self::Processed, Self::Manual];

    /// Parse from database string representation.
    ///
    /// Returns `None` for unknown values.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "unprocessed" => Some(Self::Unprocessed),
            "processed" => Some(Self::Processed),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unprocessed => "unprocessed",
            Self::Processed => "processed",
            Self::Manual => "manual",
        }
    }
}

impl std::fmt::Display for MailState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MailState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| Error::CorruptRecord(format!("unknown mail state '{s}'")))
    }
}

/// Store-assigned identifier of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub i64);

impl RecordId {
    /// Create a new record ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One committed row of the state table.
///
/// Records are written once and never modified, so fields are only
/// exposed through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateRecord {
    id: RecordId,
    created_at: DateTime<Utc>,
    fingerprint: Fingerprint,
    state: MailState,
    sheet_name: String,
}

impl StateRecord {
    pub(crate) const fn new(
        id: RecordId,
        created_at: DateTime<Utc>,
        fingerprint: Fingerprint,
        state: MailState,
        sheet_name: String,
    ) -> Self {
        Self {
            id,
            created_at,
            fingerprint,
            state,
            sheet_name,
        }
    }

    /// Store-assigned identifier.
    #[must_use]
    pub const fn id(&self) -> RecordId {
        self.id
    }

    /// When the record was first inserted.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Content fingerprint of the mail.
    #[must_use]
    pub const fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Disposition recorded for the mail.
    #[must_use]
    pub const fn state(&self) -> MailState {
        self.state
    }

    /// Destination sheet of the mail.
    #[must_use]
    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    /// Check if this mail was processed automatically.
    #[must_use]
    pub const fn is_processed(&self) -> bool {
        matches!(self.state, MailState::Processed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_mail_state_roundtrip() {
        for state in MailState::ALL {
            assert_eq!(MailState::parse(state.as_str()), Some(state));
        }
    }

    #[test]
    fn test_mail_state_unknown() {
        assert_eq!(MailState::parse("archived"), None);
        assert!("archived".parse::<MailState>().is_err());
        assert_eq!("PROCESSED".parse::<MailState>().unwrap(), MailState::Processed);
    }

    #[test]
    fn test_mail_state_default_is_unprocessed() {
        assert_eq!(MailState::default(), MailState::Unprocessed);
    }

    #[test]
    fn test_mail_state_serde() {
        assert_eq!(
            serde_json::to_string(&MailState::Manual).unwrap(),
            r#""manual""#
        );
        let state: MailState = serde_json::from_str(r#""processed""#).unwrap();
        assert_eq!(state, MailState::Processed);
    }
}
