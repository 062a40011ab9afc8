//! Read-cache repository for competitions and submissions

use crate::error::Result;
use crate::models::{CachedCompetition, CachedSubmission};
use libsql::{Connection, Row};

/// Trait for cached competition storage operations (async)
#[allow(async_fn_in_trait)]
pub trait CompetitionRepository {
    /// List cached competitions, most recently cached first
    async fn list_competitions(&self) -> Result<Vec<CachedCompetition>>;

    /// Get a cached competition by ID
    async fn get_competition(&self, id: &str) -> Result<Option<CachedCompetition>>;

    /// Insert or overwrite a cached competition (no history kept)
    async fn upsert_competition(&self, competition: &CachedCompetition) -> Result<()>;

    /// Drop a competition from the cache; returns whether it existed
    async fn evict_competition(&self, id: &str) -> Result<bool>;

    /// List cached submissions of a competition
    async fn list_submissions(&self, competition_id: &str) -> Result<Vec<CachedSubmission>>;

    /// Insert or overwrite a cached submission
    async fn upsert_submission(&self, submission: &CachedSubmission) -> Result<()>;
}

/// libSQL implementation of `CompetitionRepository`
pub struct LibSqlCompetitionRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlCompetitionRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_competition(row: &Row) -> Result<CachedCompetition> {
        Ok(CachedCompetition {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            category: row.get(3)?,
            last_updated: row.get(4)?,
        })
    }

    fn parse_submission(row: &Row) -> Result<CachedSubmission> {
        Ok(CachedSubmission {
            id: row.get(0)?,
            competition_id: row.get(1)?,
            title: row.get(2)?,
            author: row.get(3)?,
            last_updated: row.get(4)?,
        })
    }
}

impl CompetitionRepository for LibSqlCompetitionRepository<'_> {
    async fn list_competitions(&self) -> Result<Vec<CachedCompetition>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, title, description, category, last_updated
                 FROM cached_competitions
                 ORDER BY last_updated DESC, id ASC",
                (),
            )
            .await?;

        let mut competitions = Vec::new();
        while let Some(row) = rows.next().await? {
            competitions.push(Self::parse_competition(&row)?);
        }
        Ok(competitions)
    }

    async fn get_competition(&self, id: &str) -> Result<Option<CachedCompetition>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, title, description, category, last_updated
                 FROM cached_competitions WHERE id = ?",
                [id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_competition(&row)?)),
            None => Ok(None),
        }
    }

    async fn upsert_competition(&self, competition: &CachedCompetition) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO cached_competitions
                    (id, title, description, category, last_updated)
                 VALUES (?, ?, ?, ?, ?)",
                libsql::params![
                    competition.id.as_str(),
                    competition.title.as_str(),
                    competition.description.as_str(),
                    competition.category.as_str(),
                    competition.last_updated
                ],
            )
            .await?;
        Ok(())
    }

    async fn evict_competition(&self, id: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM cached_competitions WHERE id = ?", [id])
            .await?;
        Ok(removed > 0)
    }

    async fn list_submissions(&self, competition_id: &str) -> Result<Vec<CachedSubmission>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, competition_id, title, author, last_updated
                 FROM cached_submissions
                 WHERE competition_id = ?
                 ORDER BY title ASC, id ASC",
                [competition_id],
            )
            .await?;

        let mut submissions = Vec::new();
        while let Some(row) = rows.next().await? {
            submissions.push(Self::parse_submission(&row)?);
        }
        Ok(submissions)
    }

    async fn upsert_submission(&self, submission: &CachedSubmission) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO cached_submissions
                    (id, competition_id, title, author, last_updated)
                 VALUES (?, ?, ?, ?, ?)",
                libsql::params![
                    submission.id.as_str(),
                    submission.competition_id.as_str(),
                    submission.title.as_str(),
                    submission.author.as_str(),
                    submission.last_updated
                ],
            )
            .await?;
        Ok(())
    }
}
