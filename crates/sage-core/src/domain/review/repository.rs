//! Repository traits for review persistence

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

use super::entry::{KnowledgeEntry, ReviewResponse};
use super::session::{ReviewSession, ReviewStats};

/// Storage for knowledge entries and their scheduling state
#[async_trait]
pub trait KnowledgeEntryRepository: Send + Sync {
    async fn get_entry(&self, id: &str) -> Result<Option<KnowledgeEntry>>;

    /// Insert or replace an entry
    async fn save_entry(&self, entry: &KnowledgeEntry) -> Result<()>;

    /// Entries with `next_review_at <= now`, ordered by `next_review_at`,
    /// then `retention_score`, then id
    async fn list_due(
        &self,
        owner_id: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<KnowledgeEntry>>;

    /// All entries of an owner, oldest first
    async fn list_entries(&self, owner_id: &str) -> Result<Vec<KnowledgeEntry>>;

    async fn health_check(&self) -> Result<()>;
}

/// Storage for review sessions and their items
///
/// The conditional writes (`record_item_response`, `complete_session`)
/// return `false` instead of writing when their precondition no longer
/// holds, so a lost race is detected by the store itself.
#[async_trait]
pub trait ReviewSessionRepository: Send + Sync {
    /// Insert a new session; `Conflict` if the owner already has an active one
    async fn insert_session(&self, session: &ReviewSession) -> Result<()>;

    async fn get_session(&self, id: &str) -> Result<Option<ReviewSession>>;

    async fn find_active_session(&self, owner_id: &str) -> Result<Option<ReviewSession>>;

    /// Sessions of an owner, newest first
    async fn list_sessions(&self, owner_id: &str, limit: usize) -> Result<Vec<ReviewSession>>;

    /// Store a response if the item has none and the session is active
    async fn record_item_response(
        &self,
        session_id: &str,
        entry_id: &str,
        response: ReviewResponse,
        response_time_ms: Option<u64>,
    ) -> Result<bool>;

    /// Undo a stored response if the session is still active.
    ///
    /// Returns whether an answered item was reset to unpresented.
    async fn clear_item_response(&self, session_id: &str, entry_id: &str) -> Result<bool>;

    /// Mark the session completed if it is active and every item was presented
    async fn complete_session(
        &self,
        session_id: &str,
        completed_at: DateTime<Utc>,
        stats: &ReviewStats,
    ) -> Result<bool>;
}
