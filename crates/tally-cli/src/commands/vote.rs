use crate::commands::common::{describe_outcome, AppContext};
use crate::error::CliError;

pub async fn run_vote(
    context: &AppContext,
    submission_id: &str,
    rating: i64,
) -> Result<(), CliError> {
    let outcome = context.coordinator.cast_vote(submission_id, rating).await?;
    println!("{}", describe_outcome(outcome));
    Ok(())
}
