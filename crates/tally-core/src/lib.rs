//! tally-core - Core library for Tally
//!
//! This crate contains the models, the libSQL-backed local store, the
//! durable vote queue and the sync engine shared by every Tally client.

pub mod config;
pub mod connectivity;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod models;
pub mod queue;
pub mod remote;
pub mod services;
pub mod util;
pub mod widget;

#[cfg(test)]
mod test_support;

pub use config::EngineConfig;
pub use connectivity::{
    ConnectivityEvent, ConnectivityMonitor, ConnectivityState, ManualStatusSource,
    OnlineStatusSource, Subscription,
};
pub use coordinator::{BackgroundSyncTrigger, CoordinatorHandle, SyncCoordinator};
pub use error::{Error, Result};
pub use models::{
    CachedCompetition, CachedSubmission, CompetitionView, DrainReport, IdempotencyKey, LocalVote,
    LocalVoteStatus, PendingVote, QueueSummary, Rating, Rejection, SyncState, VoteOutcome,
};
pub use queue::MutationQueue;
pub use remote::{http::HttpRemoteAuthority, RemoteAuthority, RemoteError};
pub use services::LocalStore;
pub use widget::{RatingWidget, WidgetState};
