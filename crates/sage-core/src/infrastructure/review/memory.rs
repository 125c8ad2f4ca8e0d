//! In-memory review repositories

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::review::{
    KnowledgeEntry, KnowledgeEntryRepository, ReviewResponse, ReviewSession,
    ReviewSessionRepository, ReviewStats,
};
use crate::error::{Error, Result};

/// Knowledge entries held in memory
#[derive(Debug, Default)]
pub struct InMemoryKnowledgeEntryRepository {
    entries: RwLock<HashMap<String, KnowledgeEntry>>,
}

impl InMemoryKnowledgeEntryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KnowledgeEntryRepository for InMemoryKnowledgeEntryRepository {
    async fn get_entry(&self, id: &str) -> Result<Option<KnowledgeEntry>> {
        Ok(self.entries.read().await.get(id).cloned())
    }

    async fn save_entry(&self, entry: &KnowledgeEntry) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn list_due(
        &self,
        owner_id: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<KnowledgeEntry>> {
        let entries = self.entries.read().await;
        let mut due: Vec<KnowledgeEntry> = entries
            .values()
            .filter(|e| e.owner_id == owner_id && e.is_due(now))
            .cloned()
            .collect();
        due.sort_by(|a, b| {
            a.next_review_at
                .cmp(&b.next_review_at)
                .then(a.retention_score.total_cmp(&b.retention_score))
                .then_with(|| a.id.cmp(&b.id))
        });
        due.truncate(limit);
        Ok(due)
    }

    async fn list_entries(&self, owner_id: &str) -> Result<Vec<KnowledgeEntry>> {
        let entries = self.entries.read().await;
        let mut owned: Vec<KnowledgeEntry> = entries
            .values()
            .filter(|e| e.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(owned)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Review sessions held in memory
#[derive(Debug, Default)]
pub struct InMemoryReviewSessionRepository {
    sessions: RwLock<HashMap<String, ReviewSession>>,
}

impl InMemoryReviewSessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReviewSessionRepository for InMemoryReviewSessionRepository {
    async fn insert_session(&self, session: &ReviewSession) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(Error::conflict(format!("session '{}' already exists", session.id)));
        }
        if session.is_active()
            && sessions
                .values()
                .any(|s| s.owner_id == session.owner_id && s.is_active())
        {
            return Err(Error::conflict(format!(
                "owner '{}' already has an active session",
                session.owner_id
            )));
        }
        sessions.insert(session.id.clone(), session.clone());
        debug!(session_id = %session.id, "Session inserted");
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<ReviewSession>> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn find_active_session(&self, owner_id: &str) -> Result<Option<ReviewSession>> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .find(|s| s.owner_id == owner_id && s.is_active())
            .cloned())
    }

    async fn list_sessions(&self, owner_id: &str, limit: usize) -> Result<Vec<ReviewSession>> {
        let sessions = self.sessions.read().await;
        let mut owned: Vec<ReviewSession> = sessions
            .values()
            .filter(|s| s.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| b.id.cmp(&a.id)));
        owned.truncate(limit);
        Ok(owned)
    }

    async fn record_item_response(
        &self,
        session_id: &str,
        entry_id: &str,
        response: ReviewResponse,
        response_time_ms: Option<u64>,
    ) -> Result<bool> {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(session_id) else {
            return Ok(false);
        };
        Ok(session
            .record_response(entry_id, response, response_time_ms)
            .is_ok())
    }

    async fn clear_item_response(&self, session_id: &str, entry_id: &str) -> Result<bool> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions
            .get_mut(session_id)
            .is_some_and(|session| session.clear_response(entry_id)))
    }

    async fn complete_session(
        &self,
        session_id: &str,
        completed_at: DateTime<Utc>,
        stats: &ReviewStats,
    ) -> Result<bool> {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(session_id) else {
            return Ok(false);
        };
        if session.ensure_completable().is_err() {
            return Ok(false);
        }
        session.completed_at = Some(completed_at);
        session.stats = stats.clone();
        Ok(true)
    }
}
