use tally_core::SyncState;

use crate::commands::common::{
    format_vote_lines, now_millis, vote_to_item, AppContext, PendingVoteItem,
};
use crate::error::CliError;

pub async fn run_pending(
    context: &AppContext,
    state: Option<SyncState>,
    as_json: bool,
) -> Result<(), CliError> {
    let votes = context.coordinator.pending_votes(state).await?;
    let now_ms = now_millis();

    if as_json {
        let json_items = votes
            .iter()
            .map(|vote| vote_to_item(vote, now_ms))
            .collect::<Vec<PendingVoteItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if votes.is_empty() {
        println!("No votes waiting.");
        return Ok(());
    }

    for line in format_vote_lines(&votes, now_ms) {
        println!("{line}");
    }
    Ok(())
}
