//! Subcommand execution.

use std::path::Path;

use anyhow::Context;
use mailstate_core::{Error, Fingerprint, Fingerprinter, MailMessage, Sha256Fingerprinter, StateStore};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::info;

use crate::cli::Command;

/// How a subcommand finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Completed normally.
    Done,
    /// The mail had already been recorded.
    Duplicate,
}

/// Run a subcommand against an open store.
pub async fn run(store: &StateStore, command: Command) -> anyhow::Result<Outcome> {
    match command {
        Command::Record { state, sheet, file } => {
            let mut mail = load_mail(file.as_deref()).await?;
            if let Some(sheet) = sheet {
                mail.sheet_name = sheet;
            }

            match store.record_state(&mail, state.into()).await {
                Ok(record) => {
                    info!("Recorded {} as {}", record.fingerprint(), record.state());
                    println!("{}", serde_json::to_string(&record)?);
                    Ok(Outcome::Done)
                }
                Err(Error::DuplicateKey { fingerprint }) => {
                    eprintln!("already recorded: {fingerprint}");
                    Ok(Outcome::Duplicate)
                }
                Err(e) => Err(e).context("failed to record mail state"),
            }
        }
        Command::Exists { file } => {
            let mail = load_mail(file.as_deref()).await?;
            let exists = store
                .is_mail_exists(&mail)
                .await
                .context("failed to check mail")?;
            println!("{exists}");
            Ok(Outcome::Done)
        }
        Command::Count { sheet, since } => {
            let count = match since {
                Some(since) => store.count_by_sheet_since(&sheet, since).await,
                None => store.count_by_sheet(&sheet).await,
            }
            .context("failed to count mails")?;
            println!("{count}");
            Ok(Outcome::Done)
        }
        Command::Fingerprint { file } => print_fingerprint(file.as_deref()).await,
    }
}

/// Print a mail's fingerprint. Needs no store.
pub async fn print_fingerprint(path: Option<&Path>) -> anyhow::Result<Outcome> {
    println!("{}", fingerprint_mail(path).await?);
    Ok(Outcome::Done)
}

async fn fingerprint_mail(path: Option<&Path>) -> anyhow::Result<Fingerprint> {
    let mail = load_mail(path).await?;
    Sha256Fingerprinter
        .fingerprint(&mail)
        .context("failed to fingerprint mail")
}

/// Load a mail from a JSON file, or stdin if no path is given.
async fn load_mail(path: Option<&Path>) -> anyhow::Result<MailMessage> {
    match path {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            read_mail(file).await
        }
        None => read_mail(tokio::io::stdin()).await,
    }
}

/// Parse a mail from a JSON stream.
pub async fn read_mail<R: AsyncRead + Unpin>(mut reader: R) -> anyhow::Result<MailMessage> {
    let mut contents = String::new();
    reader
        .read_to_string(&mut contents)
        .await
        .context("failed to read mail")?;
    serde_json::from_str(&contents).context("mail is not valid JSON")
}
