//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    // Check if schema_version table exists
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Apply a batch of statements atomically
async fn apply(conn: &Connection, statements: &[&str]) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    Ok(())
}

/// Migration to version 1: read caches and the pending vote log
async fn migrate_v1(conn: &Connection) -> Result<()> {
    apply(
        conn,
        &[
            // Schema version tracking
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            // Competitions cache, overwritten on re-fetch
            "CREATE TABLE IF NOT EXISTS cached_competitions (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                category TEXT NOT NULL,
                last_updated INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_cached_competitions_updated
                ON cached_competitions(last_updated DESC)",
            // Submissions cache; no FK so evicting a competition never blocks sync
            "CREATE TABLE IF NOT EXISTS cached_submissions (
                id TEXT PRIMARY KEY,
                competition_id TEXT NOT NULL,
                title TEXT NOT NULL,
                author TEXT NOT NULL,
                last_updated INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_cached_submissions_competition
                ON cached_submissions(competition_id)",
            // Pending vote log, one row per submission
            "CREATE TABLE IF NOT EXISTS pending_votes (
                idempotency_key TEXT PRIMARY KEY,
                submission_id TEXT NOT NULL UNIQUE,
                rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 10),
                created_at INTEGER NOT NULL,
                sync_state TEXT NOT NULL DEFAULT 'pending',
                attempt_count INTEGER NOT NULL DEFAULT 0
            )",
            "CREATE INDEX IF NOT EXISTS idx_pending_votes_drain
                ON pending_votes(sync_state, created_at)",
            "INSERT INTO schema_version (version) VALUES (1)",
        ],
    )
    .await?;

    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: failure bookkeeping and vote receipts
async fn migrate_v2(conn: &Connection) -> Result<()> {
    apply(
        conn,
        &[
            "ALTER TABLE pending_votes ADD COLUMN failure TEXT",
            "ALTER TABLE pending_votes ADD COLUMN last_error TEXT",
            // Acknowledged votes outlive their log row for the duplicate guard
            "CREATE TABLE IF NOT EXISTS vote_receipts (
                submission_id TEXT PRIMARY KEY,
                rating INTEGER NOT NULL,
                idempotency_key TEXT NOT NULL,
                confirmed_at INTEGER NOT NULL
            )",
            "INSERT INTO schema_version (version) VALUES (2)",
        ],
    )
    .await?;

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}
