//! Mail contract consumed by the store.
//!
//! The store never parses mail itself. Anything that can name its sheet
//! and list the content that identifies it can be recorded.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Maximum length of a sheet name, in characters.
pub const MAX_SHEET_NAME_LEN: usize = 64;

/// A mail value as seen by the store.
pub trait Mail: Send + Sync {
    /// Destination sheet this mail is assigned to.
    fn sheet_name(&self) -> &str;

    /// Ordered `(name, value)` pairs that identify this mail's content.
    ///
    /// Two mails with equal content fields are the same mail.
    fn content_fields(&self) -> Vec<(&str, &str)>;
}

impl<M: Mail + ?Sized> Mail for &M {
    fn sheet_name(&self) -> &str {
        (**self).sheet_name()
    }

    fn content_fields(&self) -> Vec<(&str, &str)> {
        (**self).content_fields()
    }
}

/// A parsed mail message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    /// Message-ID header.
    #[serde(default)]
    pub message_id: Option<String>,
    /// Sender address.
    #[serde(default)]
    pub from: Option<String>,
    /// Recipient addresses, as written in the header.
    #[serde(default)]
    pub to: Option<String>,
    /// Subject line.
    #[serde(default)]
    pub subject: Option<String>,
    /// Date header, as written.
    #[serde(default)]
    pub date: Option<String>,
    /// Decoded text body.
    #[serde(default)]
    pub body: Option<String>,
    /// Destination sheet.
    pub sheet_name: String,
}

impl MailMessage {
    /// Create a message assigned to the given sheet.
    #[must_use]
    pub fn new(sheet_name: impl Into<String>) -> Self {
        Self {
            sheet_name: sheet_name.into(),
            ..Default::default()
        }
    }

    /// Set the Message-ID.
    #[must_use]
    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// Set the sender.
    #[must_use]
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Set the recipients.
    #[must_use]
    pub fn with_to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    /// Set the subject.
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Set the date header.
    #[must_use]
    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

impl Mail for MailMessage {
    fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    fn content_fields(&self) -> Vec<(&str, &str)> {
        [
            ("message_id", &self.message_id),
            ("from", &self.from),
            ("to", &self.to),
            ("subject", &self.subject),
            ("date", &self.date),
            ("body", &self.body),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_deref().map(|v| (name, v)))
        .collect()
    }
}

/// Validate a sheet name.
///
/// # Errors
///
/// Returns [`Error::MalformedMail`] if the name is blank, too long, or
/// contains control characters.
pub fn validate_sheet_name(sheet_name: &str) -> Result<()> {
    if sheet_name.trim().is_empty() {
        return Err(Error::MalformedMail("sheet name is empty".into()));
    }
    if sheet_name.chars().any(char::is_control) {
        return Err(Error::MalformedMail(
            "sheet name contains control characters".into(),
        ));
    }
    let len = sheet_name.chars().count();
    if len > MAX_SHEET_NAME_LEN {
        return Err(Error::MalformedMail(format!(
            "sheet name is {len} characters, maximum is {MAX_SHEET_NAME_LEN}"
        )));
    }
    Ok(())
}

/// Validate a mail before any storage access.
///
/// # Errors
///
/// Returns [`Error::MalformedMail`] if the sheet name is invalid or the mail
/// carries no content to fingerprint.
pub fn validate<M: Mail + ?Sized>(mail: &M) -> Result<()> {
    validate_sheet_name(mail.sheet_name())?;
    if mail
        .content_fields()
        .iter()
        .all(|(_, value)| value.is_empty())
    {
        return Err(Error::MalformedMail("mail has no content".into()));
    }
    Ok(())
}
