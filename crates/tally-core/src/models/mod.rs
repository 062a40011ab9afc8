//! Data models for Tally

mod competition;
mod report;
mod vote;

pub use competition::{
    CachedCompetition, CachedSubmission, CompetitionView, LocalVote, LocalVoteStatus,
    SubmissionView,
};
pub use report::{DrainReport, QueueSummary, VoteOutcome};
pub use vote::{
    FailureReason, IdempotencyKey, PendingVote, Rating, Rejection, SyncState, VoteReceipt,
    VoteSubmission,
};
