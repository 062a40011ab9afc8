use crate::commands::common::AppContext;
use crate::error::CliError;

pub async fn run_sync(context: &AppContext) -> Result<(), CliError> {
    if !context.is_online() {
        let outstanding = context.coordinator.queue_summary().await?.outstanding();
        println!("Offline; {outstanding} vote(s) waiting to sync");
        return Ok(());
    }

    match context.coordinator.drain_now().await? {
        Some(report) if report.is_empty() => println!("Nothing to sync"),
        Some(report) => println!("Sync completed: {}", report.summary()),
        None => println!("A sync is already running"),
    }
    Ok(())
}
