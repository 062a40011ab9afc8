//! Tally CLI - vote on competition submissions from the terminal
//!
//! Votes cast while offline are kept in a local queue and delivered once
//! the voting API is reachable again.

mod cli;
mod commands;
mod error;
mod probe;

#[cfg(test)]
mod tests;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::common::{open_context, GlobalOptions};
use crate::commands::competitions::run_competitions;
use crate::commands::dismiss::run_dismiss;
use crate::commands::pending::run_pending;
use crate::commands::retry::run_retry;
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::commands::vote::run_vote;
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tally=info,tally_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = GlobalOptions {
        db_path: cli.db_path,
        config_path: cli.config,
        api_url: cli.api_url,
        offline: cli.offline,
    };

    let context = open_context(&options).await?;
    match cli.command {
        Commands::Vote {
            submission_id,
            rating,
        } => run_vote(&context, &submission_id, rating).await?,
        Commands::Sync => run_sync(&context).await?,
        Commands::Pending { state, json } => {
            run_pending(&context, state.map(Into::into), json).await?;
        }
        Commands::Retry => run_retry(&context).await?,
        Commands::Dismiss { key } => run_dismiss(&context, &key).await?,
        Commands::Competitions { json } => run_competitions(&context, json).await?,
        Commands::Status => run_status(&context).await?,
        Commands::Watch => run_watch(&context).await?,
    }

    Ok(())
}
