//! Deduplication and processing-state tracking for incoming mail.
//!
//! Every mail is identified by a content [`Fingerprint`](crate::Fingerprint)
//! and recorded at most once, with the disposition it had at that moment:
//! - **Unprocessed**: seen, nothing done yet
//! - **Processed**: handled automatically
//! - **Manual**: handled by a person
//!
//! Records are never updated. Recording a mail a second time fails with
//! [`Error::DuplicateKey`](crate::Error::DuplicateKey), even when the
//! disposition differs.
//!
//! # Example
//!
//! ```ignore
//! use mailstate_core::{MailMessage, MailState, StateStore};
//!
//! let store = StateStore::open("mailstate.db").await?;
//! let mail = MailMessage::new("Sales").with_subject("Order #1");
//!
//! if !store.is_mail_exists(&mail).await? {
//!     match store.record_state(&mail, MailState::Processed).await {
//!         Ok(_) => {}
//!         // Another worker got there first
//!         Err(e) if e.is_duplicate() => {}
//!         Err(e) => return Err(e),
//!     }
//! }
//!
//! let processed = store.count_by_sheet("Sales").await?;
//! ```

mod model;
mod repository;

pub use model::{MailState, RecordId, StateRecord};
pub use repository::StateStore;
