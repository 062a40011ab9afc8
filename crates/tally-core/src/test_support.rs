//! Scripted remote authority for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::models::VoteSubmission;
use crate::remote::{RemoteAuthority, RemoteError};

#[derive(Default)]
struct Script {
    responses: VecDeque<Result<(), RemoteError>>,
    fallback: Option<RemoteError>,
    calls: Vec<VoteSubmission>,
    counted: HashMap<String, VoteSubmission>,
}

/// In-memory remote that collapses redelivered idempotency keys.
///
/// Answers with queued responses first, then with the fallback error if one
/// is set, otherwise accepts the vote.
#[derive(Default)]
pub struct FakeRemote {
    script: Mutex<Script>,
    delay: Option<Duration>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remote that always fails with `error`
    pub fn failing(error: RemoteError) -> Self {
        let remote = Self::default();
        remote.script.lock().unwrap().fallback = Some(error);
        remote
    }

    /// Hold every response for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_response(&self, response: Result<(), RemoteError>) {
        self.script.lock().unwrap().responses.push_back(response);
    }

    pub fn set_fallback(&self, error: Option<RemoteError>) {
        self.script.lock().unwrap().fallback = error;
    }

    pub fn calls(&self) -> Vec<VoteSubmission> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.script.lock().unwrap().calls.len()
    }

    pub fn calls_with_key(&self, key: &str) -> usize {
        self.script
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|call| call.idempotency_key == key)
            .count()
    }

    /// Votes counted by the remote, one per idempotency key
    pub fn counted_votes(&self) -> Vec<VoteSubmission> {
        self.script.lock().unwrap().counted.values().cloned().collect()
    }
}

impl RemoteAuthority for FakeRemote {
    async fn submit_vote(&self, submission: &VoteSubmission) -> Result<(), RemoteError> {
        self.script.lock().unwrap().calls.push(submission.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut script = self.script.lock().unwrap();
        let response = match script.responses.pop_front() {
            Some(response) => response,
            None => script.fallback.clone().map_or(Ok(()), Err),
        };
        if response.is_ok() {
            script
                .counted
                .entry(submission.idempotency_key.clone())
                .or_insert_with(|| submission.clone());
        }
        response
    }
}
