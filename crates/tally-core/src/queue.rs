//! Durable vote mutation queue.
//!
//! Votes wait in the `pending_votes` log until a drain delivers them to the
//! remote authority. A drain walks the log oldest first, one record at a
//! time, and classifies every outcome on the record itself; only a failure
//! to write the log aborts the cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::models::{DrainReport, FailureReason, PendingVote, SyncState, VoteSubmission};
use crate::remote::{RemoteAuthority, RemoteError};
use crate::services::LocalStore;

/// Call the remote authority, turning an elapsed timeout into a transient failure.
pub(crate) async fn submit_with_timeout<R: RemoteAuthority>(
    remote: &R,
    timeout: Duration,
    submission: &VoteSubmission,
) -> std::result::Result<(), RemoteError> {
    tokio::time::timeout(timeout, remote.submit_vote(submission))
        .await
        .unwrap_or_else(|_| {
            Err(RemoteError::transient(format!(
                "remote call timed out after {}s",
                timeout.as_secs()
            )))
        })
}

/// Resets the in-progress flag when the drain finishes, errors or is cancelled.
struct DrainGuard<'a>(&'a AtomicBool);

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Queue of votes awaiting delivery.
pub struct MutationQueue<R> {
    store: LocalStore,
    remote: Arc<R>,
    max_retries: u32,
    remote_timeout: Duration,
    draining: AtomicBool,
}

impl<R: RemoteAuthority> MutationQueue<R> {
    pub fn new(store: LocalStore, remote: Arc<R>, config: &EngineConfig) -> Self {
        Self {
            store,
            remote,
            max_retries: config.max_retries.max(1),
            remote_timeout: config.remote_timeout(),
            draining: AtomicBool::new(false),
        }
    }

    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Whether a drain is currently running
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Persist a vote for later delivery.
    pub async fn enqueue(&self, vote: &PendingVote) -> Result<()> {
        self.store.enqueue_vote(vote).await
    }

    /// Every logged vote, oldest first.
    pub async fn pending(&self) -> Result<Vec<PendingVote>> {
        self.store.list_pending_votes(None).await
    }

    /// Deliver every deliverable vote.
    ///
    /// Returns `Ok(None)` without touching the log when another drain is
    /// already running. Individual delivery failures are recorded on their
    /// records and counted in the report; an `Err` means the log itself
    /// could not be written, and everything processed before that point
    /// stays committed.
    pub async fn drain(&self) -> Result<Option<DrainReport>> {
        let Some(_guard) = DrainGuard::acquire(&self.draining) else {
            tracing::warn!("Drain already in progress; ignoring overlapping trigger");
            return Ok(None);
        };

        let mut report = DrainReport::default();
        let mut deliverable = Vec::new();
        for vote in self.store.list_pending_votes(None).await? {
            match vote.sync_state {
                SyncState::Pending | SyncState::InFlight
                    if vote.attempt_count >= self.max_retries =>
                {
                    self.exhaust_leftover(vote, &mut report).await?;
                }
                SyncState::Pending => deliverable.push(vote),
                SyncState::InFlight => {
                    tracing::warn!(
                        "Vote {} was in flight when the last run stopped; resending",
                        vote.idempotency_key
                    );
                    deliverable.push(vote);
                }
                SyncState::Synced => {
                    // Acknowledged before the crash; the receipt already exists
                    self.store.remove_vote(&vote.idempotency_key).await?;
                    tracing::debug!("Removed leftover synced vote {}", vote.idempotency_key);
                    report.synced += 1;
                    report.synced_submissions.push(vote.submission_id);
                }
                SyncState::Failed => {}
            }
        }

        if deliverable.is_empty() {
            tracing::debug!("Drain found nothing to deliver");
            return Ok(Some(report));
        }

        tracing::info!("Draining {} queued vote(s)", deliverable.len());
        for vote in deliverable {
            self.deliver(vote, &mut report).await?;
        }
        tracing::info!("Drain finished: {}", report.summary());

        Ok(Some(report))
    }

    async fn deliver(&self, vote: PendingVote, report: &mut DrainReport) -> Result<()> {
        let key = vote.idempotency_key;
        self.store
            .update_vote_state(&key, SyncState::InFlight, false)
            .await?;
        tracing::debug!("Vote {key} in flight (attempt {})", vote.attempt_count + 1);

        match submit_with_timeout(self.remote.as_ref(), self.remote_timeout, &vote.submission())
            .await
        {
            Ok(()) => {
                self.store.mark_vote_synced(&key).await?;
                self.store.remove_vote(&key).await?;
                tracing::debug!("Vote {key} synced");
                report.synced += 1;
                report.synced_submissions.push(vote.submission_id);
            }
            Err(RemoteError::Transient(message)) => {
                let updated = self
                    .store
                    .record_failed_attempt(&key, &message, self.max_retries)
                    .await?;
                let attempts = updated.attempt_count;

                if updated.sync_state == SyncState::Failed {
                    tracing::warn!(
                        "Vote {key} failed after {attempts} attempt(s), giving up: {message}"
                    );
                    report.failed += 1;
                    report.failed_submissions.push(vote.submission_id);
                } else {
                    tracing::warn!("Vote {key} will retry (attempt {attempts}): {message}");
                    report.retried += 1;
                }
            }
            Err(RemoteError::Rejected { rejection, message }) => {
                tracing::warn!("Vote {key} rejected ({rejection}): {message}");
                self.store
                    .fail_vote(&key, FailureReason::Rejected(rejection), Some(&message))
                    .await?;
                report.failed += 1;
                report.failed_submissions.push(vote.submission_id);
            }
        }
        Ok(())
    }

    /// Close out a record whose attempt budget was spent before the last run stopped.
    async fn exhaust_leftover(&self, vote: PendingVote, report: &mut DrainReport) -> Result<()> {
        tracing::warn!(
            "Vote {} already used {} attempt(s); marking it failed",
            vote.idempotency_key,
            vote.attempt_count
        );
        self.store
            .fail_vote(&vote.idempotency_key, FailureReason::RetriesExhausted, None)
            .await?;
        report.failed += 1;
        report.failed_submissions.push(vote.submission_id);
        Ok(())
    }
}
