use std::path::PathBuf;

use chatlens_app::StartMode;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version = env!("CARGO_PKG_VERSION"), about = "Segment chat logs and annotate conversations")]
pub struct Cli {
    /// Path to a TOML configuration file.
    ///
    /// When omitted, `chatlens.toml` in the working directory is used if it
    /// exists. Environment variables prefixed with `CHATLENS_` override both.
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Split an event log into conversations and print statistics
    Segment {
        /// JSON array or JSON Lines file of events
        events: PathBuf,

        /// Write the conversations to this file
        #[arg(long, short)]
        out: Option<PathBuf>,
    },

    /// Keyword-only problem breakdown, no oracle calls
    Problems {
        /// JSON array or JSON Lines file of events
        events: PathBuf,

        /// Number of most frequent problem kinds to list
        #[arg(long, default_value_t = 3)]
        top: usize,
    },

    /// Annotate every conversation through the configured provider
    Analyze {
        /// JSON array or JSON Lines file of events
        events: PathBuf,

        /// Discard the checkpoint and previous results
        #[arg(long, conflicts_with = "resume")]
        fresh: bool,

        /// Continue after the last checkpoint (the default)
        #[arg(long)]
        resume: bool,
    },

    /// Show checkpoint progress
    Status,

    /// Delete the checkpoint and the result store
    Reset,
}

impl Command {
    /// Start mode of an `analyze` invocation.
    pub fn start_mode(&self) -> Option<StartMode> {
        match self {
            Command::Analyze { fresh: true, .. } => Some(StartMode::Fresh),
            Command::Analyze { .. } => Some(StartMode::Resume),
            _ => None,
        }
    }
}
