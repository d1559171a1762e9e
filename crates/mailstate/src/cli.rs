//! Command-line arguments.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use mailstate_core::MailState;

#[derive(Debug, Parser)]
#[command(name = "mailstate")]
#[command(about = "Record and query the processing state of incoming mail", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Store configuration file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file, overrides the configuration
    #[arg(short, long, global = true)]
    pub database: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Record the disposition of a mail
    Record {
        /// Disposition to record
        #[arg(short, long, value_enum)]
        state: StateArg,

        /// Sheet name, overrides the one in the mail
        #[arg(long)]
        sheet: Option<String>,

        /// Mail JSON file, stdin if omitted
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Check whether a mail has already been recorded
    Exists {
        /// Mail JSON file, stdin if omitted
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Count processed mails for a sheet
    Count {
        /// Sheet name
        #[arg(long)]
        sheet: String,

        /// Only count mails recorded at or after this RFC 3339 time
        #[arg(long)]
        since: Option<DateTime<Utc>>,
    },

    /// Print the fingerprint of a mail
    Fingerprint {
        /// Mail JSON file, stdin if omitted
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Mail disposition as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StateArg {
    /// Seen but not processed
    Unprocessed,
    /// Processed automatically
    Processed,
    /// Handled manually
    Manual,
}

impl From<StateArg> for MailState {
    fn from(arg: StateArg) -> Self {
        match arg {
            StateArg::Unprocessed => Self::Unprocessed,
            StateArg::Processed => Self::Processed,
            StateArg::Manual => Self::Manual,
        }
    }
}
