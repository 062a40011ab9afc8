//! Remote authority boundary.
//!
//! The remote authority owns the real vote count. The core only needs its
//! vote-submission operation; competition reads are consumed by callers to
//! refresh the local cache.

pub mod http;

use std::future::Future;

use thiserror::Error;

use crate::models::{Rejection, VoteSubmission};

/// Classified failure of a remote call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Network failure, timeout or server-side hiccup; safe to retry
    #[error("Transient remote failure: {0}")]
    Transient(String),
    /// The remote authority refused the request for good
    #[error("Remote rejected the vote ({rejection}): {message}")]
    Rejected { rejection: Rejection, message: String },
}

impl RemoteError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn rejected(rejection: Rejection, message: impl Into<String>) -> Self {
        Self::Rejected {
            rejection,
            message: message.into(),
        }
    }

    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub const fn rejection(&self) -> Option<Rejection> {
        match self {
            Self::Transient(_) => None,
            Self::Rejected { rejection, .. } => Some(*rejection),
        }
    }
}

/// Remote vote-submission operation.
///
/// Implementations must be idempotent on `VoteSubmission::idempotency_key`:
/// a redelivered key must not produce a second counted vote.
pub trait RemoteAuthority: Send + Sync {
    fn submit_vote(
        &self,
        submission: &VoteSubmission,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;
}
