use crate::commands::common::{format_summary, AppContext};
use crate::error::CliError;

pub async fn run_status(context: &AppContext) -> Result<(), CliError> {
    let summary = context.coordinator.queue_summary().await?;

    println!(
        "Connectivity: {}",
        if context.is_online() { "online" } else { "offline" }
    );
    println!(
        "API:          {}",
        context
            .config
            .api_base_url
            .as_deref()
            .unwrap_or("not configured")
    );
    if let Some(path) = context.store.path() {
        println!("Database:     {}", path.display());
    }
    println!("Queue:        {}", format_summary(&summary));
    Ok(())
}
