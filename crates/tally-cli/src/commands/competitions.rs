use tally_core::{CachedCompetition, CachedSubmission, HttpRemoteAuthority, RemoteError};

use crate::commands::common::{format_competition_lines, now_millis, AppContext};
use crate::error::CliError;

pub async fn run_competitions(context: &AppContext, as_json: bool) -> Result<(), CliError> {
    if context.is_online() {
        if let Some(remote) = context.http.as_ref() {
            match fetch_remote(remote).await {
                Ok((competitions, submissions)) => {
                    context
                        .coordinator
                        .refresh_cache(&competitions, &submissions)
                        .await?;
                }
                Err(error) => {
                    tracing::warn!("Could not refresh competitions, showing cache: {error}");
                }
            }
        }
    } else {
        eprintln!("You're offline. Showing cached competitions.");
    }

    let views = context.coordinator.get_competitions_for_display().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    if views.is_empty() {
        println!("No competitions available offline. Browse competitions while online to cache them.");
        return Ok(());
    }

    for line in format_competition_lines(&views, now_millis()) {
        println!("{line}");
    }
    Ok(())
}

async fn fetch_remote(
    remote: &HttpRemoteAuthority,
) -> Result<(Vec<CachedCompetition>, Vec<CachedSubmission>), RemoteError> {
    let mut competitions = Vec::new();
    let mut submissions = Vec::new();

    for competition in remote.fetch_competitions().await? {
        let fetched = remote.fetch_submissions(&competition.id).await?;
        submissions.extend(
            fetched
                .into_iter()
                .map(|submission| submission.into_cached(&competition.id)),
        );
        competitions.push(competition.into_cached());
    }
    Ok((competitions, submissions))
}
