pub mod common;
pub mod competitions;
pub mod dismiss;
pub mod pending;
pub mod retry;
pub mod status;
pub mod sync;
pub mod vote;
pub mod watch;
