use std::path::PathBuf;

use pretty_assertions::assert_eq;
use tally_core::models::{FailureReason, SubmissionView, VoteSubmission};
use tally_core::{
    CachedCompetition, CachedSubmission, CompetitionView, ConnectivityEvent, DrainReport,
    LocalVote, LocalVoteStatus, OnlineStatusSource, PendingVote, Rating, RemoteAuthority,
    SyncState, VoteOutcome,
};

use crate::commands::common::{
    default_config_path, default_db_path, describe_outcome, format_competition_lines,
    format_relative_time, format_vote_lines, load_config, open_context, resolve_db_path,
    vote_to_item, CliRemote, GlobalOptions,
};
use crate::commands::dismiss::parse_key;
use crate::commands::watch::{connectivity_notice, report_toast};
use crate::probe::HttpProbeSource;

const MINUTE_MS: i64 = 60_000;

fn offline_options(dir: &tempfile::TempDir) -> GlobalOptions {
    GlobalOptions {
        db_path: Some(dir.path().join("tally.db")),
        config_path: Some(dir.path().join("config.json")),
        api_url: None,
        offline: true,
    }
}

#[test]
fn relative_time_buckets() {
    let now = 1_700_000_000_000;
    assert_eq!(format_relative_time(now - 5_000, now), "just now");
    assert_eq!(format_relative_time(now - 5 * MINUTE_MS, now), "5m ago");
    assert_eq!(format_relative_time(now - 3 * 60 * MINUTE_MS, now), "3h ago");
    assert_eq!(
        format_relative_time(now - 2 * 24 * 60 * MINUTE_MS, now),
        "2d ago"
    );
}

#[test]
fn resolve_db_path_prefers_explicit_path() {
    let explicit = PathBuf::from("/tmp/votes.db");
    assert_eq!(resolve_db_path(Some(explicit.clone())), explicit);
    assert!(default_db_path().ends_with("tally/tally.db"));
    assert!(default_config_path().ends_with("tally/config.json"));
}

#[test]
fn parse_key_validates_uuid() {
    let vote = PendingVote::new("sub-1", Rating::new(5).unwrap());
    let raw = format!("  {}  ", vote.idempotency_key);
    assert_eq!(parse_key(&raw).unwrap(), vote.idempotency_key);
    assert!(parse_key("not-a-key").is_err());
}

#[test]
fn outcome_descriptions() {
    assert_eq!(describe_outcome(VoteOutcome::Confirmed), "Confirmed");
    assert!(describe_outcome(VoteOutcome::QueuedOffline).starts_with("Queued offline"));
}

#[test]
fn vote_lines_show_state_and_failure() {
    let now = 1_700_000_000_000;
    let mut queued = PendingVote::new("sub-1", Rating::new(7).unwrap());
    queued.created_at = now - 2 * MINUTE_MS;
    queued.last_error = Some("timeout".to_string());

    let mut failed = PendingVote::new("sub-2", Rating::new(3).unwrap());
    failed.created_at = now;
    failed.sync_state = SyncState::Failed;
    failed.failure = Some(FailureReason::RetriesExhausted);

    let lines = format_vote_lines(&[queued.clone(), failed], now);
    assert!(lines[0].contains(" 7/10"));
    assert!(lines[0].contains("pending"));
    assert!(lines[0].contains("2m ago"));
    assert!(lines[0].ends_with("(last error: timeout)"));
    assert!(lines[1].contains("failed"));
    assert!(lines[1].contains("just now"));

    let item = vote_to_item(&queued, now);
    assert_eq!(item.state, "pending");
    assert_eq!(item.rating, 7);
    assert_eq!(item.idempotency_key, queued.idempotency_key.to_string());
}

#[test]
fn competition_lines_include_local_votes() {
    let now = 1_700_000_000_000;
    let mut competition = CachedCompetition::new("comp-a", "Sunsets", "Golden hour", "photo");
    competition.last_updated = now - 10 * MINUTE_MS;
    let views = vec![CompetitionView {
        competition,
        submissions: vec![
            SubmissionView {
                submission: CachedSubmission::new("sub-x", "comp-a", "Beach", "ana"),
                my_vote: Some(LocalVote {
                    rating: Rating::new(7).unwrap(),
                    status: LocalVoteStatus::Queued,
                }),
            },
            SubmissionView {
                submission: CachedSubmission::new("sub-y", "comp-a", "Harbor", "li"),
                my_vote: None,
            },
        ],
    }];

    let lines = format_competition_lines(&views, now);
    assert_eq!(lines[0], "comp-a  Sunsets [photo]  (cached 10m ago)");
    assert_eq!(lines[1], "  sub-x  Beach by ana  your vote 7/10 (queued)");
    assert_eq!(lines[2], "  sub-y  Harbor by li");
}

#[test]
fn load_config_applies_cli_url() {
    let dir = tempfile::tempdir().unwrap();
    let options = GlobalOptions {
        api_url: Some("https://votes.example.com".to_string()),
        ..offline_options(&dir)
    };
    let config = load_config(&options).unwrap();
    assert_eq!(
        config.api_base_url.as_deref(),
        Some("https://votes.example.com")
    );

    let invalid = GlobalOptions {
        api_url: Some("votes.example.com".to_string()),
        ..offline_options(&dir)
    };
    assert!(load_config(&invalid).is_err());
}

#[test]
fn probe_source_reports_changes_once() {
    let source = HttpProbeSource::new(false);
    let changes = source.changes();
    assert!(source.record(true));
    assert!(!source.record(true));
    assert!(source.is_online());
    assert!(changes.has_changed().unwrap());
}

#[test]
fn watch_messages() {
    let online = ConnectivityEvent {
        online: true,
        transition: 1,
    };
    assert!(connectivity_notice(online).starts_with("Back online"));

    let report = DrainReport {
        synced: 2,
        ..DrainReport::default()
    };
    let toast = report_toast(&report, 0);
    assert_eq!(toast, "[1970-01-01 00:00:00 UTC] 2 synced, 0 will retry, 0 failed");
}

#[tokio::test(flavor = "multi_thread")]
async fn unconfigured_remote_is_transient() {
    let submission = VoteSubmission {
        submission_id: "sub-1".to_string(),
        rating: 5,
        idempotency_key: "key".to_string(),
    };
    let error = CliRemote::Unconfigured
        .submit_vote(&submission)
        .await
        .unwrap_err();
    assert!(error.is_transient());
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_context_queues_votes() {
    let dir = tempfile::tempdir().unwrap();
    let context = open_context(&offline_options(&dir)).await.unwrap();
    assert!(!context.is_online());
    assert!(context.require_http().is_err());

    let outcome = context.coordinator.cast_vote("sub-1", 8).await.unwrap();
    assert_eq!(outcome, VoteOutcome::QueuedOffline);
    drop(context);

    // Reopening the same database still sees the queued vote
    let reopened = open_context(&offline_options(&dir)).await.unwrap();
    let pending = reopened.coordinator.pending_votes(None).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].submission_id, "sub-1");
}
