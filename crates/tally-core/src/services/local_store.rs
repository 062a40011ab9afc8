//! Durable local store shared by the queue, the coordinator and the UI.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{
    CompetitionRepository, Database, LibSqlCompetitionRepository, LibSqlVoteRepository,
    VoteRepository,
};
use crate::models::{
    CachedCompetition, CachedSubmission, CompetitionView, FailureReason, IdempotencyKey,
    LocalVote, LocalVoteStatus, PendingVote, QueueSummary, SubmissionView, SyncState, VoteReceipt,
};
use crate::{Error, Result};

/// Thread-safe handle to the cache tables and the pending vote log.
///
/// Every operation commits before returning; the lock is never held across
/// a remote call.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl LocalStore {
    /// Open the store at the given filesystem path.
    ///
    /// An unreadable database file is moved aside and reported as
    /// `Error::Storage` naming the backup; the caller decides whether to
    /// start over, since the backup may still hold undelivered votes.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = match Database::open(&db_path).await {
            Ok(db) => db,
            Err(error) if Self::is_corrupted_db_error(&error) => {
                tracing::error!("Local store at {} is unreadable: {error}", db_path.display());
                let backup = Self::quarantine_corrupted_db_files(&db_path)?;
                return Err(Error::Storage(format!(
                    "local store at {} is unreadable ({error}); it was moved to {}. \
                     Queued votes in it were not delivered",
                    db_path.display(),
                    backup.display()
                )));
            }
            Err(error) => return Err(error),
        };

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Filesystem location, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn is_corrupted_db_error(error: &Error) -> bool {
        let message = error.to_string().to_ascii_lowercase();
        message.contains("file is not a database")
            || message.contains("database disk image is malformed")
    }

    /// Move an unreadable database aside; the backup keeps any queued votes for inspection.
    fn quarantine_corrupted_db_files(db_path: &Path) -> Result<PathBuf> {
        let timestamp = crate::util::unix_millis_now();
        let base_name = db_path
            .file_name()
            .map_or_else(|| "tally.db".into(), |name| name.to_string_lossy());
        let backup_path = db_path.with_file_name(format!("{base_name}.corrupt-{timestamp}"));

        if db_path.exists() {
            std::fs::rename(db_path, &backup_path)?;
            tracing::warn!(
                "Moved corrupted local store from {} to {}",
                db_path.display(),
                backup_path.display()
            );
        }

        for suffix in ["-wal", "-shm"] {
            let mut sidecar = db_path.as_os_str().to_owned();
            sidecar.push(suffix);
            let sidecar = PathBuf::from(sidecar);
            if sidecar.exists() {
                std::fs::remove_file(&sidecar)?;
                tracing::warn!("Removed stale sidecar file {}", sidecar.display());
            }
        }

        Ok(backup_path)
    }

    /// All cached competitions, most recently cached first.
    pub async fn get_cached_competitions(&self) -> Result<Vec<CachedCompetition>> {
        let db = self.db.lock().await;
        let repo = LibSqlCompetitionRepository::new(db.connection());
        repo.list_competitions().await
    }

    /// One cached competition.
    pub async fn get_cached_competition(&self, id: &str) -> Result<Option<CachedCompetition>> {
        let db = self.db.lock().await;
        let repo = LibSqlCompetitionRepository::new(db.connection());
        repo.get_competition(id).await
    }

    /// Write or overwrite a cached competition.
    pub async fn put_cached_competition(&self, competition: &CachedCompetition) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlCompetitionRepository::new(db.connection());
        repo.upsert_competition(competition).await
    }

    /// Evict a competition from the cache.
    pub async fn evict_cached_competition(&self, id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let repo = LibSqlCompetitionRepository::new(db.connection());
        repo.evict_competition(id).await
    }

    /// Write or overwrite a cached submission.
    pub async fn put_cached_submission(&self, submission: &CachedSubmission) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlCompetitionRepository::new(db.connection());
        repo.upsert_submission(submission).await
    }

    /// Cached submissions of one competition.
    pub async fn get_cached_submissions(
        &self,
        competition_id: &str,
    ) -> Result<Vec<CachedSubmission>> {
        let db = self.db.lock().await;
        let repo = LibSqlCompetitionRepository::new(db.connection());
        repo.list_submissions(competition_id).await
    }

    /// Append a vote to the pending log.
    ///
    /// Fails with `Error::LocalDuplicateVote` when the submission already has
    /// a logged or acknowledged vote.
    pub async fn enqueue_vote(&self, vote: &PendingVote) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlVoteRepository::new(db.connection());
        repo.insert(vote).await?;
        tracing::debug!(
            "Queued vote {} for submission {}",
            vote.idempotency_key,
            vote.submission_id
        );
        Ok(())
    }

    /// Logged votes, oldest first, optionally restricted to one state.
    pub async fn list_pending_votes(&self, filter: Option<SyncState>) -> Result<Vec<PendingVote>> {
        let db = self.db.lock().await;
        let repo = LibSqlVoteRepository::new(db.connection());
        repo.list(filter).await
    }

    /// One logged vote.
    pub async fn get_vote(&self, key: &IdempotencyKey) -> Result<Option<PendingVote>> {
        let db = self.db.lock().await;
        let repo = LibSqlVoteRepository::new(db.connection());
        repo.get(key).await
    }

    /// Move a logged vote to `state`, optionally counting a delivery attempt.
    pub async fn update_vote_state(
        &self,
        key: &IdempotencyKey,
        state: SyncState,
        attempt_increment: bool,
    ) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlVoteRepository::new(db.connection());
        repo.update_state(key, state, attempt_increment).await
    }

    /// Count a failed delivery attempt; exhausts the vote at `max_retries`.
    pub async fn record_failed_attempt(
        &self,
        key: &IdempotencyKey,
        message: &str,
        max_retries: u32,
    ) -> Result<PendingVote> {
        let db = self.db.lock().await;
        let repo = LibSqlVoteRepository::new(db.connection());
        repo.record_failed_attempt(key, message, max_retries).await
    }

    /// Move a logged vote to terminal `Failed`.
    pub async fn fail_vote(
        &self,
        key: &IdempotencyKey,
        reason: FailureReason,
        message: Option<&str>,
    ) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlVoteRepository::new(db.connection());
        repo.mark_failed(key, reason, message).await
    }

    /// Mark a logged vote `Synced` and record its receipt.
    pub async fn mark_vote_synced(&self, key: &IdempotencyKey) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlVoteRepository::new(db.connection());
        repo.mark_synced(key).await
    }

    /// Delete a vote from the log.
    pub async fn remove_vote(&self, key: &IdempotencyKey) -> Result<bool> {
        let db = self.db.lock().await;
        let repo = LibSqlVoteRepository::new(db.connection());
        repo.remove(key).await
    }

    /// Requeue every retries-exhausted vote.
    pub async fn requeue_exhausted(&self) -> Result<usize> {
        let db = self.db.lock().await;
        let repo = LibSqlVoteRepository::new(db.connection());
        repo.requeue_exhausted().await
    }

    /// Vote counts per sync state.
    pub async fn queue_summary(&self) -> Result<QueueSummary> {
        let db = self.db.lock().await;
        let repo = LibSqlVoteRepository::new(db.connection());
        repo.summary().await
    }

    /// Record a vote the remote authority acknowledged directly.
    pub async fn record_receipt(&self, receipt: &VoteReceipt) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlVoteRepository::new(db.connection());
        repo.insert_receipt(receipt).await
    }

    /// Whether the submission already has a logged or acknowledged vote.
    pub async fn has_vote_for(&self, submission_id: &str) -> Result<bool> {
        Ok(self.local_vote(submission_id).await?.is_some())
    }

    /// The user's own vote for a submission as known locally.
    pub async fn local_vote(&self, submission_id: &str) -> Result<Option<LocalVote>> {
        let db = self.db.lock().await;
        let repo = LibSqlVoteRepository::new(db.connection());

        if let Some(vote) = repo.find_by_submission(submission_id).await? {
            return Ok(Some(LocalVote::from_log(
                vote.rating,
                vote.sync_state,
                vote.failure,
            )));
        }

        Ok(repo
            .get_receipt(submission_id)
            .await?
            .map(|receipt| LocalVote {
                rating: receipt.rating,
                status: LocalVoteStatus::Confirmed,
            }))
    }

    /// Cached competitions joined with cached submissions and local vote status.
    pub async fn competition_views(&self) -> Result<Vec<CompetitionView>> {
        let competitions = self.get_cached_competitions().await?;

        let mut views = Vec::with_capacity(competitions.len());
        for competition in competitions {
            let submissions = self.get_cached_submissions(&competition.id).await?;
            let mut submission_views = Vec::with_capacity(submissions.len());
            for submission in submissions {
                let my_vote = self.local_vote(&submission.id).await?;
                submission_views.push(SubmissionView {
                    submission,
                    my_vote,
                });
            }
            views.push(CompetitionView {
                competition,
                submissions: submission_views,
            });
        }
        Ok(views)
    }
}
