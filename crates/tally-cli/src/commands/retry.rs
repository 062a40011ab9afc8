use crate::commands::common::AppContext;
use crate::error::CliError;

pub async fn run_retry(context: &AppContext) -> Result<(), CliError> {
    let requeued = context.coordinator.retry_failed().await?;
    if requeued == 0 {
        println!("No exhausted votes to retry");
    } else {
        println!("Requeued {requeued} vote(s); run `tally sync` to deliver them");
    }
    Ok(())
}
