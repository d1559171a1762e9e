//! # mailstate-core
//!
//! Tracks which incoming mails have already been handled.
//!
//! This crate provides:
//! - Content fingerprinting of mail
//! - A durable, uniquely keyed store of mail dispositions (`SQLite`)
//! - Per-sheet counting of processed mail
//! - Store configuration

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
mod error;
pub mod fingerprint;
pub mod mail;
pub mod state;

pub use config::{StoreConfig, default_database_path};
pub use error::{Error, Result};
pub use fingerprint::{Fingerprint, Fingerprinter, Sha256Fingerprinter};
pub use mail::{Mail, MailMessage};
pub use state::{MailState, RecordId, StateRecord, StateStore};
