use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tally_core::models::VoteSubmission;
use tally_core::{
    CompetitionView, ConnectivityMonitor, EngineConfig, HttpRemoteAuthority, LocalStore,
    LocalVoteStatus, ManualStatusSource, PendingVote, QueueSummary, RemoteAuthority, RemoteError,
    SyncCoordinator, VoteOutcome,
};

use crate::error::CliError;

/// Flags shared by every command
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub db_path: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub api_url: Option<String>,
    pub offline: bool,
}

/// Remote used by the CLI; without an API URL every delivery stays queued.
#[derive(Clone)]
pub enum CliRemote {
    Http(HttpRemoteAuthority),
    Unconfigured,
}

impl RemoteAuthority for CliRemote {
    async fn submit_vote(&self, submission: &VoteSubmission) -> Result<(), RemoteError> {
        match self {
            Self::Http(remote) => remote.submit_vote(submission).await,
            Self::Unconfigured => Err(RemoteError::transient("no voting API configured")),
        }
    }
}

/// Everything a command needs
pub struct AppContext {
    pub config: EngineConfig,
    pub store: LocalStore,
    pub http: Option<HttpRemoteAuthority>,
    pub coordinator: SyncCoordinator<CliRemote>,
}

impl AppContext {
    pub fn is_online(&self) -> bool {
        self.coordinator.is_online()
    }

    pub fn require_http(&self) -> Result<&HttpRemoteAuthority, CliError> {
        self.http.as_ref().ok_or(CliError::ApiNotConfigured)
    }
}

pub async fn open_context(options: &GlobalOptions) -> Result<AppContext, CliError> {
    let config = load_config(options)?;
    let store = LocalStore::open_path(resolve_db_path(options.db_path.clone())).await?;

    let http = config
        .api_base_url
        .as_deref()
        .map(|url| HttpRemoteAuthority::new(url, config.remote_timeout()))
        .transpose()?;

    let online = match (&http, options.offline) {
        (Some(remote), false) => remote.probe().await,
        _ => false,
    };
    tracing::debug!("Starting {}", if online { "online" } else { "offline" });

    let monitor = ConnectivityMonitor::new(Arc::new(ManualStatusSource::new(online)));
    let remote = http
        .clone()
        .map_or(CliRemote::Unconfigured, CliRemote::Http);
    let coordinator = SyncCoordinator::new(store.clone(), monitor, Arc::new(remote), &config);

    Ok(AppContext {
        config,
        store,
        http,
        coordinator,
    })
}

pub fn load_config(options: &GlobalOptions) -> Result<EngineConfig, CliError> {
    let path = resolve_config_path(options.config_path.clone());
    let mut config = EngineConfig::load_from_path(&path)?;
    config.apply_env()?;
    if let Some(url) = tally_core::util::normalize_text_option(options.api_url.clone()) {
        config.api_base_url = Some(url);
    }
    config
        .validate()
        .map_err(|error| CliError::Config(format!("{} ({})", error, path.display())))?;
    Ok(config)
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("TALLY_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tally")
        .join("tally.db")
}

pub fn resolve_config_path(cli_config_path: Option<PathBuf>) -> PathBuf {
    cli_config_path.unwrap_or_else(default_config_path)
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tally")
        .join("config.json")
}

#[derive(Debug, Serialize)]
pub struct PendingVoteItem {
    pub idempotency_key: String,
    pub submission_id: String,
    pub rating: u8,
    pub state: String,
    pub attempt_count: u32,
    pub failure: Option<String>,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub relative_time: String,
}

pub fn vote_to_item(vote: &PendingVote, now_ms: i64) -> PendingVoteItem {
    PendingVoteItem {
        idempotency_key: vote.idempotency_key.to_string(),
        submission_id: vote.submission_id.clone(),
        rating: vote.rating.value(),
        state: vote.sync_state.as_str().to_string(),
        attempt_count: vote.attempt_count,
        failure: vote.failure.map(|reason| reason.as_str().to_string()),
        last_error: vote.last_error.clone(),
        created_at: vote.created_at,
        relative_time: format_relative_time(vote.created_at, now_ms),
    }
}

pub fn format_vote_lines(votes: &[PendingVote], now_ms: i64) -> Vec<String> {
    votes
        .iter()
        .map(|vote| {
            let key = vote.idempotency_key.to_string();
            let line = format!(
                "{key}  {:<16}  {:>2}/10  {:<9}  {}",
                vote.submission_id,
                vote.rating.value(),
                vote.sync_state.as_str(),
                format_relative_time(vote.created_at, now_ms)
            );
            match (vote.failure, vote.last_error.as_deref()) {
                (Some(reason), _) => format!("{line}  ({reason})"),
                (None, Some(error)) => format!("{line}  (last error: {error})"),
                (None, None) => line,
            }
        })
        .collect()
}

pub fn format_competition_lines(views: &[CompetitionView], now_ms: i64) -> Vec<String> {
    let mut lines = Vec::new();
    for view in views {
        let competition = &view.competition;
        let category = if competition.category.is_empty() {
            String::new()
        } else {
            format!(" [{}]", competition.category)
        };
        lines.push(format!(
            "{}  {}{category}  (cached {})",
            competition.id,
            competition.title,
            format_relative_time(competition.last_updated, now_ms)
        ));

        for entry in &view.submissions {
            let vote = entry.my_vote.map_or_else(String::new, |vote| {
                let status = match vote.status {
                    LocalVoteStatus::Queued => "queued".to_string(),
                    LocalVoteStatus::Confirmed => "confirmed".to_string(),
                    LocalVoteStatus::Failed { reason } => format!("failed: {reason}"),
                };
                format!("  your vote {}/10 ({status})", vote.rating.value())
            });
            lines.push(format!(
                "  {}  {} by {}{vote}",
                entry.submission.id, entry.submission.title, entry.submission.author
            ));
        }
    }
    lines
}

pub fn format_summary(summary: &QueueSummary) -> String {
    format!(
        "pending {}, in flight {}, synced {}, failed {}",
        summary.pending, summary.in_flight, summary.synced, summary.failed
    )
}

pub const fn describe_outcome(outcome: VoteOutcome) -> &'static str {
    match outcome {
        VoteOutcome::Confirmed => "Confirmed",
        VoteOutcome::QueuedOffline => "Queued offline; it will be submitted when you're back online",
    }
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn now_millis() -> i64 {
    tally_core::util::unix_millis_now()
}
