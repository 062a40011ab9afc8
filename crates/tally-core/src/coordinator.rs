//! Sync coordinator: the single entry point the UI layer talks to.
//!
//! Ties connectivity, the local store and the mutation queue together:
//! votes go straight to the remote authority while online and fall back to
//! the durable queue otherwise, and every genuine "came online" transition
//! triggers exactly one drain whose report is broadcast to subscribers.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::config::EngineConfig;
use crate::connectivity::{ConnectivityEvent, ConnectivityMonitor, Subscription};
use crate::error::{Error, Result};
use crate::models::{
    CachedCompetition, CachedSubmission, CompetitionView, DrainReport, IdempotencyKey,
    PendingVote, QueueSummary, Rating, SyncState, VoteOutcome, VoteReceipt,
};
use crate::queue::{submit_with_timeout, MutationQueue};
use crate::remote::{RemoteAuthority, RemoteError};
use crate::services::LocalStore;

/// Tag registered with the background trigger after an offline enqueue
pub const BACKGROUND_SYNC_TAG: &str = "sync-votes";

const REPORT_CHANNEL_CAPACITY: usize = 16;

/// Host hook that runs a drain even when the app is not in the foreground.
pub trait BackgroundSyncTrigger: Send + Sync {
    fn register(&self, tag: &str) -> std::result::Result<(), String>;
}

/// Marks a submission as having a direct remote call in progress.
struct SubmissionClaim<'a> {
    claims: &'a Mutex<HashSet<String>>,
    submission_id: String,
}

impl<'a> SubmissionClaim<'a> {
    fn acquire(claims: &'a Mutex<HashSet<String>>, submission_id: &str) -> Option<Self> {
        let mut held = claims.lock().unwrap_or_else(PoisonError::into_inner);
        held.insert(submission_id.to_string()).then(|| Self {
            claims,
            submission_id: submission_id.to_string(),
        })
    }
}

impl Drop for SubmissionClaim<'_> {
    fn drop(&mut self) {
        self.claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.submission_id);
    }
}

/// Orchestrates connectivity, the local store and the mutation queue.
pub struct SyncCoordinator<R> {
    store: LocalStore,
    monitor: ConnectivityMonitor,
    queue: MutationQueue<R>,
    remote: Arc<R>,
    remote_timeout: Duration,
    retry_interval: Option<Duration>,
    trigger: Option<Arc<dyn BackgroundSyncTrigger>>,
    reports: broadcast::Sender<DrainReport>,
    last_drained_transition: AtomicU64,
    claims: Mutex<HashSet<String>>,
}

impl<R: RemoteAuthority> SyncCoordinator<R> {
    pub fn new(
        store: LocalStore,
        monitor: ConnectivityMonitor,
        remote: Arc<R>,
        config: &EngineConfig,
    ) -> Self {
        let (reports, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);
        Self {
            queue: MutationQueue::new(store.clone(), Arc::clone(&remote), config),
            store,
            monitor,
            remote,
            remote_timeout: config.remote_timeout(),
            retry_interval: config.retry_interval(),
            trigger: None,
            reports,
            last_drained_transition: AtomicU64::new(0),
            claims: Mutex::new(HashSet::new()),
        }
    }

    /// Attach the host's background retry hook.
    #[must_use]
    pub fn with_background_trigger(mut self, trigger: Arc<dyn BackgroundSyncTrigger>) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    pub const fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    pub const fn queue(&self) -> &MutationQueue<R> {
        &self.queue
    }

    pub fn is_online(&self) -> bool {
        self.monitor.current()
    }

    /// Cast the user's vote for a submission.
    ///
    /// Online, the vote is sent directly; a transient failure or timeout
    /// falls back to the queue with the same idempotency key. Offline, the
    /// vote is queued without a network call. A vote already queued,
    /// confirmed or being sent for this submission is rejected with
    /// `Error::LocalDuplicateVote` before any network call.
    pub async fn cast_vote(&self, submission_id: &str, rating: i64) -> Result<VoteOutcome> {
        let rating = Rating::new(rating)?;
        let submission_id = submission_id.trim();
        if submission_id.is_empty() {
            return Err(Error::InvalidInput(
                "submission id must not be empty".to_string(),
            ));
        }

        let Some(_claim) = SubmissionClaim::acquire(&self.claims, submission_id) else {
            return Err(Error::LocalDuplicateVote(submission_id.to_string()));
        };
        if self.store.has_vote_for(submission_id).await? {
            return Err(Error::LocalDuplicateVote(submission_id.to_string()));
        }

        let mut vote = PendingVote::new(submission_id, rating);
        if self.monitor.current() {
            match submit_with_timeout(self.remote.as_ref(), self.remote_timeout, &vote.submission())
                .await
            {
                Ok(()) => {
                    self.store
                        .record_receipt(&VoteReceipt {
                            submission_id: vote.submission_id.clone(),
                            rating,
                            idempotency_key: vote.idempotency_key,
                            confirmed_at: crate::util::unix_millis_now(),
                        })
                        .await?;
                    tracing::info!("Vote for {submission_id} confirmed");
                    return Ok(VoteOutcome::Confirmed);
                }
                Err(RemoteError::Rejected { rejection, message }) => {
                    tracing::warn!("Vote for {submission_id} rejected ({rejection}): {message}");
                    return Err(Error::PermanentRejection(rejection));
                }
                Err(RemoteError::Transient(message)) => {
                    tracing::warn!("Direct vote for {submission_id} failed, queueing: {message}");
                    vote.last_error = Some(message);
                }
            }
        }

        self.store.enqueue_vote(&vote).await?;
        tracing::info!("Vote for {submission_id} queued offline");
        self.request_background_sync();
        Ok(VoteOutcome::QueuedOffline)
    }

    fn request_background_sync(&self) {
        let Some(trigger) = &self.trigger else {
            return;
        };
        if let Err(error) = trigger.register(BACKGROUND_SYNC_TAG) {
            tracing::warn!("Background sync registration failed: {error}");
        }
    }

    /// Cached competitions with their submissions and the user's local votes.
    ///
    /// Always served from the cache; while online, callers fetch fresh data
    /// and hand it to [`Self::refresh_cache`] first.
    pub async fn get_competitions_for_display(&self) -> Result<Vec<CompetitionView>> {
        self.store.competition_views().await
    }

    /// Write freshly fetched remote data into the cache.
    pub async fn refresh_cache(
        &self,
        competitions: &[CachedCompetition],
        submissions: &[CachedSubmission],
    ) -> Result<()> {
        for competition in competitions {
            self.store.put_cached_competition(competition).await?;
        }
        for submission in submissions {
            self.store.put_cached_submission(submission).await?;
        }
        tracing::debug!(
            "Cached {} competition(s) and {} submission(s)",
            competitions.len(),
            submissions.len()
        );
        Ok(())
    }

    /// Receiver of every non-empty drain report.
    pub fn subscribe_reports(&self) -> broadcast::Receiver<DrainReport> {
        self.reports.subscribe()
    }

    /// React to a connectivity transition.
    ///
    /// Drains once per online transition; offline events and transitions
    /// already drained are ignored.
    pub async fn handle_connectivity(
        &self,
        event: ConnectivityEvent,
    ) -> Result<Option<DrainReport>> {
        if !event.online {
            return Ok(None);
        }
        let previous = self
            .last_drained_transition
            .fetch_max(event.transition, Ordering::AcqRel);
        if previous >= event.transition {
            tracing::debug!("Transition {} already drained", event.transition);
            return Ok(None);
        }
        self.drain_now().await
    }

    /// Run one drain and publish its report.
    pub async fn drain_now(&self) -> Result<Option<DrainReport>> {
        let report = self.queue.drain().await?;
        if let Some(report) = report.as_ref().filter(|report| !report.is_empty()) {
            // No subscribers is fine
            let _ = self.reports.send(report.clone());
        }
        Ok(report)
    }

    /// Put every retries-exhausted vote back in the queue.
    pub async fn retry_failed(&self) -> Result<usize> {
        let requeued = self.store.requeue_exhausted().await?;
        if requeued > 0 {
            tracing::info!("Requeued {requeued} exhausted vote(s)");
        }
        Ok(requeued)
    }

    /// Drop a failed vote the user has acknowledged.
    pub async fn dismiss_failed(&self, key: &IdempotencyKey) -> Result<()> {
        let vote = self
            .store
            .get_vote(key)
            .await?
            .ok_or_else(|| Error::NotFound(key.to_string()))?;
        if vote.sync_state != SyncState::Failed {
            return Err(Error::InvalidInput(format!(
                "vote {key} is {} and cannot be dismissed",
                vote.sync_state.as_str()
            )));
        }
        self.store.remove_vote(key).await?;
        tracing::info!("Dismissed failed vote {key}");
        Ok(())
    }

    pub async fn pending_votes(&self, filter: Option<SyncState>) -> Result<Vec<PendingVote>> {
        self.store.list_pending_votes(filter).await
    }

    pub async fn queue_summary(&self) -> Result<QueueSummary> {
        self.store.queue_summary().await
    }
}

impl<R: RemoteAuthority + 'static> SyncCoordinator<R> {
    /// Spawn the reconciliation loop.
    ///
    /// Drains once right away when online, once per online transition, and
    /// on the retry interval while online. The loop stops when the returned
    /// handle is stopped or dropped.
    pub fn start(self: &Arc<Self>) -> CoordinatorHandle {
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let subscription = self.monitor.subscribe(move |event| {
            let _ = events_tx.send(event);
        });

        let coordinator = Arc::clone(self);
        let initial = self.monitor.state();
        let task = tokio::spawn(async move {
            if initial.online {
                coordinator
                    .last_drained_transition
                    .fetch_max(initial.transitions, Ordering::AcqRel);
                coordinator.log_drain(coordinator.drain_now().await);
            }

            let mut ticker = coordinator.retry_interval.map(|period| {
                let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker
            });

            loop {
                tokio::select! {
                    event = events.recv() => {
                        let Some(event) = event else { break };
                        coordinator.log_drain(coordinator.handle_connectivity(event).await);
                    }
                    () = next_tick(&mut ticker) => {
                        if coordinator.monitor.current() {
                            coordinator.log_drain(coordinator.drain_now().await);
                        }
                    }
                }
            }
            tracing::debug!("Coordinator loop stopped");
        });

        CoordinatorHandle {
            task,
            _subscription: subscription,
        }
    }

    fn log_drain(&self, result: Result<Option<DrainReport>>) {
        match result {
            Ok(Some(report)) if !report.is_empty() => {
                tracing::debug!("Drain report: {}", report.summary());
            }
            Ok(_) => {}
            Err(error) => tracing::error!("Drain aborted: {error}"),
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Running coordinator loop; dropping it unsubscribes and stops the loop.
pub struct CoordinatorHandle {
    task: JoinHandle<()>,
    _subscription: Subscription,
}

impl CoordinatorHandle {
    pub fn stop(self) {
        drop(self);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for CoordinatorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
