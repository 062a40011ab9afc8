use tally_core::IdempotencyKey;

use crate::commands::common::AppContext;
use crate::error::CliError;

pub fn parse_key(raw: &str) -> Result<IdempotencyKey, CliError> {
    raw.trim()
        .parse::<IdempotencyKey>()
        .map_err(|_| CliError::InvalidKey(raw.trim().to_string()))
}

pub async fn run_dismiss(context: &AppContext, raw_key: &str) -> Result<(), CliError> {
    let key = parse_key(raw_key)?;
    context.coordinator.dismiss_failed(&key).await?;
    println!("{key}");
    Ok(())
}
