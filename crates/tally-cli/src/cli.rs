use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tally_core::SyncState;

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Vote on competition submissions, online or offline")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the engine config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Voting API base URL (overrides config and TALLY_API_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub api_url: Option<String>,

    /// Treat the network as unavailable
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Rate a submission from 1 to 10
    Vote {
        /// Submission ID
        submission_id: String,
        /// Rating (1-10)
        rating: i64,
    },
    /// Deliver queued votes now
    Sync,
    /// List the pending vote log
    Pending {
        /// Only show votes in this state
        #[arg(long, value_enum)]
        state: Option<StateFilter>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Requeue votes that ran out of retries
    Retry,
    /// Remove a failed vote from the log
    Dismiss {
        /// Idempotency key of the failed vote
        key: String,
    },
    /// Show competitions (fetched when online, cached otherwise)
    Competitions {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show connectivity and queue counts
    Status,
    /// Keep syncing in the foreground and print each drain report
    Watch,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StateFilter {
    Pending,
    InFlight,
    Synced,
    Failed,
}

impl From<StateFilter> for SyncState {
    fn from(filter: StateFilter) -> Self {
        match filter {
            StateFilter::Pending => Self::Pending,
            StateFilter::InFlight => Self::InFlight,
            StateFilter::Synced => Self::Synced,
            StateFilter::Failed => Self::Failed,
        }
    }
}
