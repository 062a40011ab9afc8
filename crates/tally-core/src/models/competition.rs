//! Cached read models for competitions and their submissions

use serde::{Deserialize, Serialize};

use super::vote::{FailureReason, Rating, SyncState};

/// A competition as last seen online
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedCompetition {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    /// When this copy was cached (Unix ms)
    pub last_updated: i64,
}

impl CachedCompetition {
    /// Create a cache entry stamped with the current time
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            category: category.into(),
            last_updated: crate::util::unix_millis_now(),
        }
    }
}

/// A submission as last seen online
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSubmission {
    pub id: String,
    pub competition_id: String,
    pub title: String,
    pub author: String,
    /// When this copy was cached (Unix ms)
    pub last_updated: i64,
}

impl CachedSubmission {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        competition_id: impl Into<String>,
        title: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            competition_id: competition_id.into(),
            title: title.into(),
            author: author.into(),
            last_updated: crate::util::unix_millis_now(),
        }
    }
}

/// Where the user's own vote for a submission stands locally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LocalVoteStatus {
    /// Recorded locally, waiting to be delivered
    Queued,
    /// Acknowledged by the remote authority
    Confirmed,
    /// Could not be submitted
    Failed { reason: FailureReason },
}

/// The user's own vote as known locally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalVote {
    pub rating: Rating,
    #[serde(flatten)]
    pub status: LocalVoteStatus,
}

impl LocalVote {
    /// Status for a row still in the pending log
    pub const fn from_log(
        rating: Rating,
        state: SyncState,
        failure: Option<FailureReason>,
    ) -> Self {
        let status = match (state, failure) {
            (SyncState::Synced, _) => LocalVoteStatus::Confirmed,
            (SyncState::Failed, Some(reason)) => LocalVoteStatus::Failed { reason },
            (SyncState::Failed, None) => LocalVoteStatus::Failed {
                reason: FailureReason::RetriesExhausted,
            },
            (SyncState::Pending | SyncState::InFlight, _) => LocalVoteStatus::Queued,
        };
        Self { rating, status }
    }
}

/// A cached submission with the user's local vote attached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionView {
    pub submission: CachedSubmission,
    pub my_vote: Option<LocalVote>,
}

/// What the UI renders for a competition while offline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitionView {
    pub competition: CachedCompetition,
    pub submissions: Vec<SubmissionView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_competition_stamped() {
        let competition = CachedCompetition::new("c1", "Best Photo", "Show us", "photography");
        assert!(competition.last_updated > 0);
        assert_eq!(competition.category, "photography");
    }

    #[test]
    fn test_local_vote_from_log() {
        let rating = Rating::new(4).unwrap();
        assert_eq!(
            LocalVote::from_log(rating, SyncState::InFlight, None).status,
            LocalVoteStatus::Queued
        );
        assert_eq!(
            LocalVote::from_log(rating, SyncState::Synced, None).status,
            LocalVoteStatus::Confirmed
        );
        assert_eq!(
            LocalVote::from_log(rating, SyncState::Failed, None).status,
            LocalVoteStatus::Failed {
                reason: FailureReason::RetriesExhausted
            }
        );
    }
}
