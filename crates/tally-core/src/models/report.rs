//! Results handed back to the UI layer

use serde::{Deserialize, Serialize};

use super::vote::SyncState;

/// How `cast_vote` disposed of a vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteOutcome {
    /// The remote authority accepted the vote directly
    Confirmed,
    /// The vote was persisted locally and will be delivered on reconnect
    QueuedOffline,
}

/// Summary of one drain cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    /// Votes acknowledged and removed from the log
    pub synced: usize,
    /// Votes that failed transiently and went back to `Pending`
    pub retried: usize,
    /// Votes moved to terminal `Failed`
    pub failed: usize,
    /// Submissions whose vote was acknowledged in this cycle
    pub synced_submissions: Vec<String>,
    /// Submissions whose vote became terminal in this cycle
    pub failed_submissions: Vec<String>,
}

impl DrainReport {
    /// Whether the cycle touched no records
    pub const fn is_empty(&self) -> bool {
        self.synced == 0 && self.retried == 0 && self.failed == 0
    }

    pub const fn total(&self) -> usize {
        self.synced + self.retried + self.failed
    }

    /// Whether the vote for `submission_id` was confirmed in this cycle
    pub fn confirms(&self, submission_id: &str) -> bool {
        self.synced_submissions.iter().any(|id| id == submission_id)
    }

    /// Whether the vote for `submission_id` became terminal in this cycle
    pub fn fails(&self, submission_id: &str) -> bool {
        self.failed_submissions.iter().any(|id| id == submission_id)
    }

    /// One-line toast text
    pub fn summary(&self) -> String {
        format!(
            "{} synced, {} will retry, {} failed",
            self.synced, self.retried, self.failed
        )
    }
}

/// Record counts per sync state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSummary {
    pub pending: usize,
    pub in_flight: usize,
    pub synced: usize,
    pub failed: usize,
}

impl QueueSummary {
    pub(crate) fn add(&mut self, state: SyncState, count: usize) {
        match state {
            SyncState::Pending => self.pending += count,
            SyncState::InFlight => self.in_flight += count,
            SyncState::Synced => self.synced += count,
            SyncState::Failed => self.failed += count,
        }
    }

    /// Votes still expected to reach the remote authority
    pub const fn outstanding(&self) -> usize {
        self.pending + self.in_flight
    }
}
