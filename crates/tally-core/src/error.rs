//! Error types for tally-core

use thiserror::Error;

use crate::models::Rejection;
use crate::remote::RemoteError;

/// Result type alias using tally-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tally-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted row could not be written or decoded
    #[error("Storage error: {0}")]
    Storage(String),

    /// A vote for this submission is already queued or confirmed locally
    #[error("Already voted on submission {0}")]
    LocalDuplicateVote(String),

    /// The remote authority refused the vote for good
    #[error("Vote rejected: {0}")]
    PermanentRejection(Rejection),

    /// Remote call failed outside the vote path
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl Error {
    /// Whether this error means local persistence failed.
    ///
    /// Storage failures are fatal to the requested operation: a vote that
    /// could not be written must never be reported as accepted.
    pub const fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::LibSql(_) | Self::Io(_) | Self::Storage(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_failures_are_classified() {
        assert!(Error::Storage("disk full".into()).is_storage_failure());
        assert!(Error::Database("locked".into()).is_storage_failure());
        assert!(!Error::LocalDuplicateVote("sub-1".into()).is_storage_failure());
        assert!(!Error::PermanentRejection(Rejection::AlreadyVoted).is_storage_failure());
    }

    #[test]
    fn duplicate_vote_message_names_submission() {
        let error = Error::LocalDuplicateVote("sub-42".into());
        assert_eq!(error.to_string(), "Already voted on submission sub-42");
    }
}
