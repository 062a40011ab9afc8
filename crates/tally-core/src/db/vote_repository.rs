//! Pending vote log and vote receipt repository

use crate::error::{Error, Result};
use crate::models::{
    FailureReason, IdempotencyKey, PendingVote, QueueSummary, Rating, SyncState, VoteReceipt,
};
use libsql::{Connection, Row, Value};

const VOTE_COLUMNS: &str = "idempotency_key, submission_id, rating, created_at, sync_state, \
                            attempt_count, failure, last_error";

/// Trait for pending vote storage operations (async)
#[allow(async_fn_in_trait)]
pub trait VoteRepository {
    /// Append a vote to the log.
    ///
    /// Fails with `Error::LocalDuplicateVote` when the submission already has
    /// a logged vote or an acknowledged receipt.
    async fn insert(&self, vote: &PendingVote) -> Result<()>;

    /// Get a logged vote by its idempotency key
    async fn get(&self, key: &IdempotencyKey) -> Result<Option<PendingVote>>;

    /// Get the logged vote for a submission, if any
    async fn find_by_submission(&self, submission_id: &str) -> Result<Option<PendingVote>>;

    /// List logged votes, oldest first, optionally restricted to one state
    async fn list(&self, filter: Option<SyncState>) -> Result<Vec<PendingVote>>;

    /// Move a vote to `state`, optionally counting one more delivery attempt
    async fn update_state(
        &self,
        key: &IdempotencyKey,
        state: SyncState,
        attempt_increment: bool,
    ) -> Result<()>;

    /// Count one failed delivery attempt and record its error.
    ///
    /// The vote returns to `Pending`, or becomes `Failed` with
    /// `RetriesExhausted` once `max_retries` attempts are spent, in a single
    /// statement. Returns the updated vote.
    async fn record_failed_attempt(
        &self,
        key: &IdempotencyKey,
        message: &str,
        max_retries: u32,
    ) -> Result<PendingVote>;

    /// Move a vote to terminal `Failed`
    async fn mark_failed(
        &self,
        key: &IdempotencyKey,
        reason: FailureReason,
        message: Option<&str>,
    ) -> Result<()>;

    /// Move a vote to `Synced` and write its receipt in one transaction
    async fn mark_synced(&self, key: &IdempotencyKey) -> Result<()>;

    /// Delete a vote from the log; returns whether it existed
    async fn remove(&self, key: &IdempotencyKey) -> Result<bool>;

    /// Put every retries-exhausted vote back to `Pending` with a fresh attempt budget
    async fn requeue_exhausted(&self) -> Result<usize>;

    /// Count logged votes per state
    async fn summary(&self) -> Result<QueueSummary>;

    /// Record an acknowledged vote that never went through the log
    async fn insert_receipt(&self, receipt: &VoteReceipt) -> Result<()>;

    /// Get the receipt for a submission, if its vote was acknowledged
    async fn get_receipt(&self, submission_id: &str) -> Result<Option<VoteReceipt>>;
}

/// libSQL implementation of `VoteRepository`
pub struct LibSqlVoteRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlVoteRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a vote from a database row
    fn parse_vote(row: &Row) -> Result<PendingVote> {
        let key: String = row.get(0)?;
        let state: String = row.get(4)?;
        let attempts: i64 = row.get(5)?;
        let failure = optional_text(row, 6)?
            .map(|reason| reason.parse::<FailureReason>())
            .transpose()?;

        Ok(PendingVote {
            idempotency_key: parse_key(&key)?,
            submission_id: row.get(1)?,
            rating: Rating::new(row.get(2)?).map_err(|e| Error::Storage(e.to_string()))?,
            created_at: row.get(3)?,
            sync_state: state.parse()?,
            attempt_count: u32::try_from(attempts)
                .map_err(|_| Error::Storage(format!("invalid attempt count {attempts}")))?,
            failure,
            last_error: optional_text(row, 7)?,
        })
    }

    fn parse_receipt(row: &Row) -> Result<VoteReceipt> {
        let key: String = row.get(2)?;
        Ok(VoteReceipt {
            submission_id: row.get(0)?,
            rating: Rating::new(row.get(1)?).map_err(|e| Error::Storage(e.to_string()))?,
            idempotency_key: parse_key(&key)?,
            confirmed_at: row.get(3)?,
        })
    }

    async fn run_in_transaction(&self, statements: Vec<(&str, Vec<Value>)>) -> Result<()> {
        self.conn.execute("BEGIN IMMEDIATE", ()).await?;

        for (sql, params) in statements {
            if let Err(e) = self.conn.execute(sql, params).await {
                self.conn.execute("ROLLBACK", ()).await.ok();
                return Err(e.into());
            }
        }

        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
        Ok(())
    }
}

impl VoteRepository for LibSqlVoteRepository<'_> {
    async fn insert(&self, vote: &PendingVote) -> Result<()> {
        if self.find_by_submission(&vote.submission_id).await?.is_some()
            || self.get_receipt(&vote.submission_id).await?.is_some()
        {
            return Err(Error::LocalDuplicateVote(vote.submission_id.clone()));
        }

        self.conn
            .execute(
                "INSERT INTO pending_votes (
                    idempotency_key, submission_id, rating, created_at,
                    sync_state, attempt_count, failure, last_error
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                libsql::params![
                    vote.idempotency_key.as_str(),
                    vote.submission_id.as_str(),
                    i64::from(vote.rating.value()),
                    vote.created_at,
                    vote.sync_state.as_str(),
                    i64::from(vote.attempt_count),
                    text_or_null(vote.failure.map(FailureReason::as_str)),
                    text_or_null(vote.last_error.as_deref())
                ],
            )
            .await?;
        Ok(())
    }

    async fn get(&self, key: &IdempotencyKey) -> Result<Option<PendingVote>> {
        let sql = format!("SELECT {VOTE_COLUMNS} FROM pending_votes WHERE idempotency_key = ?");
        let mut rows = self.conn.query(&sql, [key.as_str()]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_vote(&row)?)),
            None => Ok(None),
        }
    }

    async fn find_by_submission(&self, submission_id: &str) -> Result<Option<PendingVote>> {
        let sql = format!("SELECT {VOTE_COLUMNS} FROM pending_votes WHERE submission_id = ?");
        let mut rows = self.conn.query(&sql, [submission_id]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_vote(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, filter: Option<SyncState>) -> Result<Vec<PendingVote>> {
        let mut rows = if let Some(state) = filter {
            let sql = format!(
                "SELECT {VOTE_COLUMNS} FROM pending_votes
                 WHERE sync_state = ?
                 ORDER BY created_at ASC, idempotency_key ASC"
            );
            self.conn.query(&sql, [state.as_str()]).await?
        } else {
            let sql = format!(
                "SELECT {VOTE_COLUMNS} FROM pending_votes
                 ORDER BY created_at ASC, idempotency_key ASC"
            );
            self.conn.query(&sql, ()).await?
        };

        let mut votes = Vec::new();
        while let Some(row) = rows.next().await? {
            votes.push(Self::parse_vote(&row)?);
        }
        Ok(votes)
    }

    async fn update_state(
        &self,
        key: &IdempotencyKey,
        state: SyncState,
        attempt_increment: bool,
    ) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE pending_votes
                 SET sync_state = ?, attempt_count = attempt_count + ?
                 WHERE idempotency_key = ?",
                libsql::params![
                    state.as_str(),
                    i64::from(attempt_increment),
                    key.as_str()
                ],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(key.to_string()));
        }
        Ok(())
    }

    async fn record_failed_attempt(
        &self,
        key: &IdempotencyKey,
        message: &str,
        max_retries: u32,
    ) -> Result<PendingVote> {
        let rows = self
            .conn
            .execute(
                "UPDATE pending_votes
                 SET attempt_count = attempt_count + 1,
                     sync_state = CASE WHEN attempt_count + 1 >= ?1 THEN ?2 ELSE ?3 END,
                     failure = CASE WHEN attempt_count + 1 >= ?1 THEN ?4 ELSE failure END,
                     last_error = ?5
                 WHERE idempotency_key = ?6",
                libsql::params![
                    i64::from(max_retries),
                    SyncState::Failed.as_str(),
                    SyncState::Pending.as_str(),
                    FailureReason::RetriesExhausted.as_str(),
                    message,
                    key.as_str()
                ],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(key.to_string()));
        }
        self.get(key)
            .await?
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    async fn mark_failed(
        &self,
        key: &IdempotencyKey,
        reason: FailureReason,
        message: Option<&str>,
    ) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE pending_votes
                 SET sync_state = ?, failure = ?, last_error = COALESCE(?, last_error)
                 WHERE idempotency_key = ?",
                libsql::params![
                    SyncState::Failed.as_str(),
                    reason.as_str(),
                    text_or_null(message),
                    key.as_str()
                ],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(key.to_string()));
        }
        Ok(())
    }

    async fn mark_synced(&self, key: &IdempotencyKey) -> Result<()> {
        if self.get(key).await?.is_none() {
            return Err(Error::NotFound(key.to_string()));
        }

        let now = crate::util::unix_millis_now();
        self.run_in_transaction(vec![
            (
                "UPDATE pending_votes SET sync_state = ?, failure = NULL WHERE idempotency_key = ?",
                vec![
                    Value::from(SyncState::Synced.as_str()),
                    Value::from(key.as_str()),
                ],
            ),
            (
                "INSERT OR REPLACE INTO vote_receipts
                    (submission_id, rating, idempotency_key, confirmed_at)
                 SELECT submission_id, rating, idempotency_key, ?
                 FROM pending_votes WHERE idempotency_key = ?",
                vec![Value::from(now), Value::from(key.as_str())],
            ),
        ])
        .await
    }

    async fn remove(&self, key: &IdempotencyKey) -> Result<bool> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM pending_votes WHERE idempotency_key = ?",
                [key.as_str()],
            )
            .await?;
        Ok(removed > 0)
    }

    async fn requeue_exhausted(&self) -> Result<usize> {
        let rows = self
            .conn
            .execute(
                "UPDATE pending_votes
                 SET sync_state = ?, attempt_count = 0, failure = NULL
                 WHERE sync_state = ? AND failure = ?",
                libsql::params![
                    SyncState::Pending.as_str(),
                    SyncState::Failed.as_str(),
                    FailureReason::RetriesExhausted.as_str()
                ],
            )
            .await?;
        Ok(usize::try_from(rows).unwrap_or(usize::MAX))
    }

    async fn summary(&self) -> Result<QueueSummary> {
        let mut rows = self
            .conn
            .query(
                "SELECT sync_state, COUNT(*) FROM pending_votes GROUP BY sync_state",
                (),
            )
            .await?;

        let mut summary = QueueSummary::default();
        while let Some(row) = rows.next().await? {
            let state: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            summary.add(state.parse()?, usize::try_from(count).unwrap_or(0));
        }
        Ok(summary)
    }

    async fn insert_receipt(&self, receipt: &VoteReceipt) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO vote_receipts
                    (submission_id, rating, idempotency_key, confirmed_at)
                 VALUES (?, ?, ?, ?)",
                libsql::params![
                    receipt.submission_id.as_str(),
                    i64::from(receipt.rating.value()),
                    receipt.idempotency_key.as_str(),
                    receipt.confirmed_at
                ],
            )
            .await?;
        Ok(())
    }

    async fn get_receipt(&self, submission_id: &str) -> Result<Option<VoteReceipt>> {
        let mut rows = self
            .conn
            .query(
                "SELECT submission_id, rating, idempotency_key, confirmed_at
                 FROM vote_receipts WHERE submission_id = ?",
                [submission_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_receipt(&row)?)),
            None => Ok(None),
        }
    }
}

fn parse_key(raw: &str) -> Result<IdempotencyKey> {
    raw.parse()
        .map_err(|_| Error::Storage(format!("invalid idempotency key '{raw}'")))
}

fn optional_text(row: &Row, index: i32) -> Result<Option<String>> {
    match row.get_value(index)? {
        Value::Text(text) => Ok(Some(text)),
        Value::Null => Ok(None),
        other => Err(Error::Storage(format!(
            "expected text in column {index}, found {other:?}"
        ))),
    }
}

fn text_or_null(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |text| Value::Text(text.to_string()))
}
