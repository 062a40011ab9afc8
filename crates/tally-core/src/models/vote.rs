//! Vote models: the pending mutation log entry and its wire form

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Stable key attached to every delivery of a vote, using UUID v7 (time-sortable).
///
/// Generated once when the vote is created and never regenerated on retry,
/// so the remote authority can collapse redelivered submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(Uuid);

impl IdempotencyKey {
    /// Create a new unique key using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this key
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for IdempotencyKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for IdempotencyKey {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A 1-10 rating
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    /// Validate a raw rating value
    pub fn new(value: i64) -> Result<Self> {
        u8::try_from(value)
            .ok()
            .filter(|value| (Self::MIN..=Self::MAX).contains(value))
            .map(Self)
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "rating must be between {} and {}, got {value}",
                    Self::MIN,
                    Self::MAX
                ))
            })
    }

    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Every valid rating, lowest first
    pub fn all() -> impl Iterator<Item = Self> {
        (Self::MIN..=Self::MAX).map(Self)
    }
}

impl TryFrom<i64> for Rating {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivery state of a queued vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Waiting for the next drain
    Pending,
    /// Handed to the remote authority, result not yet recorded
    InFlight,
    /// Acknowledged; the row is deleted right after
    Synced,
    /// Terminal; surfaced to the user and never auto-retried
    Failed,
}

impl SyncState {
    pub const ALL: [Self; 4] = [Self::Pending, Self::InFlight, Self::Synced, Self::Failed];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Synced => "synced",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| Error::Storage(format!("unknown sync state '{s}'")))
    }
}

/// Why the remote authority refused a vote for good
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// The remote already counted a vote from this user for the submission
    AlreadyVoted,
    /// Voting closed before the vote arrived
    CompetitionEnded,
    /// Any other non-retryable refusal (validation, auth)
    Refused,
}

impl Rejection {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AlreadyVoted => "already_voted",
            Self::CompetitionEnded => "competition_ended",
            Self::Refused => "refused",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyVoted => f.write_str("already voted"),
            Self::CompetitionEnded => f.write_str("competition has ended"),
            Self::Refused => f.write_str("refused by server"),
        }
    }
}

/// Why a queued vote ended up `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Transient failures hit the retry ceiling; the user may requeue it
    RetriesExhausted,
    /// Permanent refusal from the remote authority
    Rejected(Rejection),
}

impl FailureReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RetriesExhausted => "retries_exhausted",
            Self::Rejected(rejection) => rejection.as_str(),
        }
    }

    /// Whether a manual retry may put this vote back in the queue
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::RetriesExhausted)
    }
}

impl FromStr for FailureReason {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "retries_exhausted" => Ok(Self::RetriesExhausted),
            "already_voted" => Ok(Self::Rejected(Rejection::AlreadyVoted)),
            "competition_ended" => Ok(Self::Rejected(Rejection::CompetitionEnded)),
            "refused" => Ok(Self::Rejected(Rejection::Refused)),
            other => Err(Error::Storage(format!("unknown failure reason '{other}'"))),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetriesExhausted => f.write_str("gave up after repeated network failures"),
            Self::Rejected(rejection) => write!(f, "{rejection}"),
        }
    }
}

/// A vote recorded locally that still has to reach the remote authority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingVote {
    /// Stable delivery key, also the primary key of the log
    pub idempotency_key: IdempotencyKey,
    /// Submission being rated (weak reference by id)
    pub submission_id: String,
    pub rating: Rating,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    pub sync_state: SyncState,
    /// Transient delivery failures so far
    pub attempt_count: u32,
    /// Set once `sync_state` is `Failed`
    pub failure: Option<FailureReason>,
    /// Last error message reported for this vote
    pub last_error: Option<String>,
}

impl PendingVote {
    /// Create a new pending vote with a fresh idempotency key
    #[must_use]
    pub fn new(submission_id: impl Into<String>, rating: Rating) -> Self {
        Self {
            idempotency_key: IdempotencyKey::new(),
            submission_id: submission_id.into(),
            rating,
            created_at: crate::util::unix_millis_now(),
            sync_state: SyncState::Pending,
            attempt_count: 0,
            failure: None,
            last_error: None,
        }
    }

    /// Wire form sent to the remote authority
    #[must_use]
    pub fn submission(&self) -> VoteSubmission {
        VoteSubmission {
            submission_id: self.submission_id.clone(),
            rating: self.rating.value(),
            idempotency_key: self.idempotency_key.as_str(),
        }
    }
}

/// Request body of the remote vote-submission operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteSubmission {
    pub submission_id: String,
    pub rating: u8,
    pub idempotency_key: String,
}

/// Local memory of a vote the remote authority acknowledged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub submission_id: String,
    pub rating: Rating,
    pub idempotency_key: IdempotencyKey,
    /// Acknowledgement timestamp (Unix ms)
    pub confirmed_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotency_key_unique() {
        assert_ne!(IdempotencyKey::new(), IdempotencyKey::new());
    }

    #[test]
    fn test_idempotency_key_parse() {
        let key = IdempotencyKey::new();
        let parsed: IdempotencyKey = key.as_str().parse().unwrap();
        assert_eq!(key, parsed);
    }

    #[test]
    fn test_rating_bounds() {
        assert!(Rating::new(0).is_err());
        assert!(Rating::new(11).is_err());
        assert!(Rating::new(-3).is_err());
        assert_eq!(Rating::new(1).unwrap().value(), 1);
        assert_eq!(Rating::new(10).unwrap().value(), 10);
        assert_eq!(Rating::all().count(), 10);
    }

    #[test]
    fn test_rating_serde_rejects_out_of_range() {
        assert!(serde_json::from_str::<Rating>("7").is_ok());
        assert!(serde_json::from_str::<Rating>("12").is_err());
    }

    #[test]
    fn test_sync_state_text_roundtrip() {
        for state in SyncState::ALL {
            assert_eq!(state.as_str().parse::<SyncState>().unwrap(), state);
        }
        assert!("done".parse::<SyncState>().is_err());
    }

    #[test]
    fn test_failure_reason_retryable() {
        assert!(FailureReason::RetriesExhausted.is_retryable());
        assert!(!FailureReason::Rejected(Rejection::AlreadyVoted).is_retryable());
        assert_eq!(
            "competition_ended".parse::<FailureReason>().unwrap(),
            FailureReason::Rejected(Rejection::CompetitionEnded)
        );
    }

    #[test]
    fn test_pending_vote_new() {
        let vote = PendingVote::new("sub-1", Rating::new(7).unwrap());
        assert_eq!(vote.sync_state, SyncState::Pending);
        assert_eq!(vote.attempt_count, 0);
        assert!(vote.created_at > 0);

        let wire = vote.submission();
        assert_eq!(wire.rating, 7);
        assert_eq!(wire.idempotency_key, vote.idempotency_key.as_str());
    }
}
