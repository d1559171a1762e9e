//! `mailstate` - record and query the processing state of incoming mail.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cli;
mod commands;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use mailstate_core::{StateStore, StoreConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command};
use commands::Outcome;

/// Exit status when a mail was already recorded.
const EXIT_DUPLICATE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.verbose {
        "mailstate=debug,mailstate_core=debug"
    } else {
        "mailstate=info,mailstate_core=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(cli).await {
        Ok(Outcome::Done) => ExitCode::SUCCESS,
        Ok(Outcome::Duplicate) => ExitCode::from(EXIT_DUPLICATE),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<Outcome> {
    if let Command::Fingerprint { file } = &cli.command {
        return commands::print_fingerprint(file.as_deref()).await;
    }

    let config = load_config(&cli).await?;
    let store = StateStore::connect(&config)
        .await
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;

    info!("Using database {:?}", config.database_path);
    let outcome = commands::run(&store, cli.command).await;
    store.close().await;
    outcome
}

/// Load store configuration, applying command-line overrides.
async fn load_config(cli: &Cli) -> anyhow::Result<StoreConfig> {
    let mut config = match &cli.config {
        Some(path) => StoreConfig::load(path)
            .await
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => StoreConfig::default(),
    };

    if let Some(database) = &cli.database {
        config.database_path.clone_from(database);
    }

    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fingerprint_leaves_no_database() {
        let dir = tempfile::tempdir().unwrap();
        let mail = dir.path().join("mail.json");
        tokio::fs::write(&mail, r#"{"subject": "Hello", "sheet_name": "Sales"}"#)
            .await
            .unwrap();
        let database = dir.path().join("data").join("mailstate.db");

        let cli = Cli::try_parse_from([
            "mailstate",
            "--database",
            database.to_str().unwrap(),
            "fingerprint",
            "--file",
            mail.to_str().unwrap(),
        ])
        .unwrap();

        assert_eq!(run(cli).await.unwrap(), Outcome::Done);
        assert!(!database.exists());
        assert!(!database.parent().unwrap().exists());
    }

    #[tokio::test]
    async fn test_record_creates_database() {
        let dir = tempfile::tempdir().unwrap();
        let mail = dir.path().join("mail.json");
        tokio::fs::write(&mail, r#"{"subject": "Hello", "sheet_name": "Sales"}"#)
            .await
            .unwrap();
        let database = dir.path().join("mailstate.db");

        let cli = Cli::try_parse_from([
            "mailstate",
            "--database",
            database.to_str().unwrap(),
            "record",
            "--state",
            "processed",
            "--file",
            mail.to_str().unwrap(),
        ])
        .unwrap();

        assert_eq!(run(cli).await.unwrap(), Outcome::Done);
        assert!(database.exists());
    }
}
