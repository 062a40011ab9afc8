//! Database layer for Tally

mod competition_repository;
mod connection;
mod migrations;
mod vote_repository;

pub use competition_repository::{CompetitionRepository, LibSqlCompetitionRepository};
pub use connection::Database;
pub use vote_repository::{LibSqlVoteRepository, VoteRepository};
