//! SQLite implementations of the review repositories

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::domain::review::{
    KnowledgeEntry, KnowledgeEntryRepository, ReviewItem, ReviewResponse, ReviewSession,
    ReviewSessionRepository, ReviewStats,
};
use crate::error::{Error, Result};
use crate::infrastructure::{decode_optional_time, decode_time, encode_time};

/// SQLite implementation of the knowledge entry repository
#[derive(Clone)]
pub struct SqliteKnowledgeEntryRepository {
    pool: SqlitePool,
}

impl SqliteKnowledgeEntryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KnowledgeEntryRepository for SqliteKnowledgeEntryRepository {
    async fn get_entry(&self, id: &str) -> Result<Option<KnowledgeEntry>> {
        let row: Option<EntryRow> = sqlx::query_as("SELECT * FROM knowledge_entries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_entry()).transpose()
    }

    async fn save_entry(&self, entry: &KnowledgeEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO knowledge_entries (
                id, owner_id, content, review_count, last_reviewed_at, next_review_at,
                retention_score, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                review_count = excluded.review_count,
                last_reviewed_at = excluded.last_reviewed_at,
                next_review_at = excluded.next_review_at,
                retention_score = excluded.retention_score,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.owner_id)
        .bind(&entry.content)
        .bind(entry.review_count as i64)
        .bind(entry.last_reviewed_at.as_ref().map(encode_time))
        .bind(entry.next_review_at.as_ref().map(encode_time))
        .bind(entry.retention_score)
        .bind(encode_time(&entry.created_at))
        .bind(encode_time(&entry.updated_at))
        .execute(&self.pool)
        .await?;

        debug!(entry_id = %entry.id, "Knowledge entry saved");
        Ok(())
    }

    async fn list_due(
        &self,
        owner_id: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<KnowledgeEntry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(
            r#"
            SELECT * FROM knowledge_entries
            WHERE owner_id = ? AND next_review_at IS NOT NULL AND next_review_at <= ?
            ORDER BY next_review_at ASC, retention_score ASC, id ASC
            LIMIT ?
            "#,
        )
        .bind(owner_id)
        .bind(encode_time(&now))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_entry()).collect()
    }

    async fn list_entries(&self, owner_id: &str) -> Result<Vec<KnowledgeEntry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(
            "SELECT * FROM knowledge_entries WHERE owner_id = ? ORDER BY created_at, id",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_entry()).collect()
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

/// SQLite implementation of the review session repository
#[derive(Clone)]
pub struct SqliteReviewSessionRepository {
    pool: SqlitePool,
}

impl SqliteReviewSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_items(&self, session_id: &str) -> Result<Vec<ReviewItem>> {
        let rows: Vec<ItemRow> = sqlx::query_as(
            "SELECT * FROM review_items WHERE session_id = ? ORDER BY position",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_item()).collect()
    }

    async fn hydrate(&self, row: SessionRow) -> Result<ReviewSession> {
        let items = self.load_items(&row.id).await?;
        row.into_session(items)
    }
}

#[async_trait]
impl ReviewSessionRepository for SqliteReviewSessionRepository {
    async fn insert_session(&self, session: &ReviewSession) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO review_sessions (
                id, owner_id, started_at, completed_at,
                total_items, completed_items, correct_count, average_response_time_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.owner_id)
        .bind(encode_time(&session.started_at))
        .bind(session.completed_at.as_ref().map(encode_time))
        .bind(session.stats.total_items as i64)
        .bind(session.stats.completed_items as i64)
        .bind(session.stats.correct_count as i64)
        .bind(session.stats.average_response_time_ms)
        .execute(&mut *tx)
        .await;

        if let Err(sqlx::Error::Database(db_err)) = &inserted {
            if db_err.is_unique_violation() {
                return Err(Error::conflict(format!(
                    "owner '{}' already has an active session",
                    session.owner_id
                )));
            }
        }
        inserted?;

        for (position, item) in session.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO review_items (
                    session_id, position, entry_id, presented, response, response_time_ms
                ) VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&session.id)
            .bind(position as i64)
            .bind(&item.entry_id)
            .bind(item.presented)
            .bind(item.response.map(|r| r.as_str()))
            .bind(item.response_time_ms.map(clamp_ms))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(session_id = %session.id, items = session.items.len(), "Session inserted");
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<ReviewSession>> {
        let row: Option<SessionRow> = sqlx::query_as("SELECT * FROM review_sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn find_active_session(&self, owner_id: &str) -> Result<Option<ReviewSession>> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT * FROM review_sessions WHERE owner_id = ? AND completed_at IS NULL",
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn list_sessions(&self, owner_id: &str, limit: usize) -> Result<Vec<ReviewSession>> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            r#"
            SELECT * FROM review_sessions
            WHERE owner_id = ?
            ORDER BY started_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(owner_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in rows {
            sessions.push(self.hydrate(row).await?);
        }
        Ok(sessions)
    }

    async fn record_item_response(
        &self,
        session_id: &str,
        entry_id: &str,
        response: ReviewResponse,
        response_time_ms: Option<u64>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE review_items
            SET presented = 1, response = ?, response_time_ms = ?
            WHERE session_id = ? AND entry_id = ? AND response IS NULL
              AND EXISTS (
                  SELECT 1 FROM review_sessions WHERE id = ? AND completed_at IS NULL
              )
            "#,
        )
        .bind(response.as_str())
        .bind(response_time_ms.map(clamp_ms))
        .bind(session_id)
        .bind(entry_id)
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn clear_item_response(&self, session_id: &str, entry_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE review_items
            SET presented = 0, response = NULL, response_time_ms = NULL
            WHERE session_id = ? AND entry_id = ? AND response IS NOT NULL
              AND EXISTS (
                  SELECT 1 FROM review_sessions WHERE id = ? AND completed_at IS NULL
              )
            "#,
        )
        .bind(session_id)
        .bind(entry_id)
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn complete_session(
        &self,
        session_id: &str,
        completed_at: DateTime<Utc>,
        stats: &ReviewStats,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE review_sessions
            SET completed_at = ?, total_items = ?, completed_items = ?,
                correct_count = ?, average_response_time_ms = ?
            WHERE id = ? AND completed_at IS NULL
              AND NOT EXISTS (
                  SELECT 1 FROM review_items WHERE session_id = ? AND presented = 0
              )
            "#,
        )
        .bind(encode_time(&completed_at))
        .bind(stats.total_items as i64)
        .bind(stats.completed_items as i64)
        .bind(stats.correct_count as i64)
        .bind(stats.average_response_time_ms)
        .bind(session_id)
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

fn clamp_ms(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}

fn to_count(value: i64, what: &str) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| Error::CorruptData(format!("negative {}: {}", what, value)))
}

// ========== Row Types ==========

#[derive(FromRow)]
struct EntryRow {
    id: String,
    owner_id: String,
    content: String,
    review_count: i64,
    last_reviewed_at: Option<String>,
    next_review_at: Option<String>,
    retention_score: f64,
    created_at: String,
    updated_at: String,
}

impl EntryRow {
    fn into_entry(self) -> Result<KnowledgeEntry> {
        let review_count = u32::try_from(self.review_count).map_err(|_| {
            Error::CorruptData(format!(
                "entry '{}' has invalid review count {}",
                self.id, self.review_count
            ))
        })?;

        Ok(KnowledgeEntry {
            last_reviewed_at: decode_optional_time(self.last_reviewed_at.as_deref())?,
            next_review_at: decode_optional_time(self.next_review_at.as_deref())?,
            created_at: decode_time(&self.created_at)?,
            updated_at: decode_time(&self.updated_at)?,
            id: self.id,
            owner_id: self.owner_id,
            content: self.content,
            review_count,
            retention_score: self.retention_score,
        })
    }
}

#[derive(FromRow)]
struct SessionRow {
    id: String,
    owner_id: String,
    started_at: String,
    completed_at: Option<String>,
    total_items: i64,
    completed_items: i64,
    correct_count: i64,
    average_response_time_ms: f64,
}

impl SessionRow {
    fn into_session(self, items: Vec<ReviewItem>) -> Result<ReviewSession> {
        Ok(ReviewSession {
            started_at: decode_time(&self.started_at)?,
            completed_at: decode_optional_time(self.completed_at.as_deref())?,
            stats: ReviewStats {
                total_items: to_count(self.total_items, "total_items")?,
                completed_items: to_count(self.completed_items, "completed_items")?,
                correct_count: to_count(self.correct_count, "correct_count")?,
                average_response_time_ms: self.average_response_time_ms,
            },
            id: self.id,
            owner_id: self.owner_id,
            items,
        })
    }
}

#[derive(FromRow)]
struct ItemRow {
    entry_id: String,
    presented: bool,
    response: Option<String>,
    response_time_ms: Option<i64>,
}

impl ItemRow {
    fn into_item(self) -> Result<ReviewItem> {
        let response = self
            .response
            .as_deref()
            .map(|r| {
                ReviewResponse::parse(r)
                    .ok_or_else(|| Error::CorruptData(format!("invalid review response: {}", r)))
            })
            .transpose()?;

        Ok(ReviewItem {
            entry_id: self.entry_id,
            presented: self.presented,
            response,
            response_time_ms: self.response_time_ms.map(|ms| ms.max(0) as u64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::run_migrations;
    use chrono::{Duration, TimeZone};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        pool
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_entry_round_trip_and_due() {
        let repo = SqliteKnowledgeEntryRepository::new(create_test_pool().await);
        let mut due = KnowledgeEntry::new("e-1", "u-1", "lifetimes", now()).unwrap();
        due.next_review_at = Some(now() - Duration::hours(1));
        due.last_reviewed_at = Some(now() - Duration::days(3));
        due.retention_score = 0.4;
        due.review_count = 2;
        let mut later = KnowledgeEntry::new("e-2", "u-1", "traits", now()).unwrap();
        later.next_review_at = Some(now() + Duration::hours(1));
        let never = KnowledgeEntry::new("e-3", "u-1", "macros", now()).unwrap();

        for e in [&due, &later, &never] {
            repo.save_entry(e).await.unwrap();
        }

        assert_eq!(repo.get_entry("e-1").await.unwrap().unwrap(), due);
        let found = repo.list_due("u-1", now(), 10).await.unwrap();
        assert_eq!(found, vec![due]);
        assert_eq!(repo.list_entries("u-1").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let repo = SqliteReviewSessionRepository::new(create_test_pool().await);
        let session =
            ReviewSession::new("s-1", "u-1", vec!["e2".into(), "e1".into()], now()).unwrap();
        repo.insert_session(&session).await.unwrap();

        let again = ReviewSession::new("s-2", "u-1", vec!["e1".into()], now()).unwrap();
        assert!(repo.insert_session(&again).await.unwrap_err().is_conflict());

        let active = repo.find_active_session("u-1").await.unwrap().unwrap();
        assert_eq!(active, session);
        assert_eq!(active.items[0].entry_id, "e2");

        assert!(!repo.complete_session("s-1", now(), &ReviewStats::default()).await.unwrap());

        for entry in ["e1", "e2"] {
            assert!(repo
                .record_item_response("s-1", entry, ReviewResponse::Hard, Some(700))
                .await
                .unwrap());
        }
        assert!(!repo
            .record_item_response("s-1", "e1", ReviewResponse::Easy, None)
            .await
            .unwrap());

        assert!(repo.clear_item_response("s-1", "e1").await.unwrap());
        assert!(!repo.clear_item_response("s-1", "e1").await.unwrap());
        let reset = repo.get_session("s-1").await.unwrap().unwrap();
        let e1 = reset.item("e1").unwrap();
        assert!(!e1.presented && e1.response.is_none() && e1.response_time_ms.is_none());
        assert!(repo
            .record_item_response("s-1", "e1", ReviewResponse::Hard, Some(700))
            .await
            .unwrap());

        let stats = ReviewStats {
            total_items: 2,
            completed_items: 2,
            correct_count: 2,
            average_response_time_ms: 700.0,
        };
        assert!(repo.complete_session("s-1", now(), &stats).await.unwrap());
        assert!(!repo.complete_session("s-1", now(), &stats).await.unwrap());

        let done = repo.get_session("s-1").await.unwrap().unwrap();
        assert_eq!(done.completed_at, Some(now()));
        assert_eq!(done.stats, stats);
        assert!(repo.find_active_session("u-1").await.unwrap().is_none());

        repo.insert_session(&again).await.unwrap();
        let listed = repo.list_sessions("u-1", 10).await.unwrap();
        assert_eq!(listed.len(), 2);
    }
}
