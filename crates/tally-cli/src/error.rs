use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] tally_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid idempotency key: {0}")]
    InvalidKey(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "No voting API configured. Pass --api-url, set TALLY_API_URL, or add api_base_url to the config file."
    )]
    ApiNotConfigured,
}
