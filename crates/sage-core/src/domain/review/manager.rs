//! Review session lifecycle
//!
//! A session is Active from creation until `complete_session` succeeds, after
//! which it is Completed and read-only. Each owner has at most one Active
//! session at a time.

use std::sync::Arc;

use tracing::{info, warn};

use crate::clock::{Clock, IdGenerator};
use crate::config::{HARD_RESULT_CAP, ReviewConfig};
use crate::domain::locking::{LockManager, LockScope};
use crate::error::{Error, Result};

use super::entry::{KnowledgeEntry, ReviewResponse};
use super::repository::{KnowledgeEntryRepository, ReviewSessionRepository};
use super::scheduler::ReviewScheduler;
use super::session::ReviewSession;

/// Drives review sessions and feeds each response to the scheduler
pub struct ReviewSessionManager<S: ReviewSessionRepository, E: KnowledgeEntryRepository> {
    sessions: Arc<S>,
    scheduler: Arc<ReviewScheduler<E>>,
    locks: Arc<LockManager>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    config: ReviewConfig,
}

impl<S: ReviewSessionRepository, E: KnowledgeEntryRepository> ReviewSessionManager<S, E> {
    pub fn new(
        sessions: Arc<S>,
        scheduler: Arc<ReviewScheduler<E>>,
        locks: Arc<LockManager>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        config: ReviewConfig,
    ) -> Self {
        Self {
            sessions,
            scheduler,
            locks,
            clock,
            ids,
            config,
        }
    }

    pub fn scheduler(&self) -> &Arc<ReviewScheduler<E>> {
        &self.scheduler
    }

    /// Entry `entry_id`, or `NotFound` when it is missing or owned by someone else
    async fn require_owned_entry(&self, entry_id: &str, owner_id: &str) -> Result<KnowledgeEntry> {
        let entry = self.scheduler.get_entry(entry_id).await?;
        if entry.owner_id != owner_id {
            return Err(Error::not_found("KnowledgeEntry", entry_id));
        }
        Ok(entry)
    }

    /// Start a session over `entry_ids`, all of which must belong to `owner_id`
    pub async fn create_session(
        &self,
        owner_id: &str,
        entry_ids: Vec<String>,
    ) -> Result<ReviewSession> {
        let session = ReviewSession::new(self.ids.next_id(), owner_id, entry_ids, self.clock.now())?;
        for item in &session.items {
            self.require_owned_entry(&item.entry_id, owner_id).await?;
        }

        let _guard = self.locks.acquire(LockScope::sessions(owner_id)).await;
        if let Some(active) = self.sessions.find_active_session(owner_id).await? {
            return Err(Error::conflict(format!(
                "owner '{}' already has an active session '{}'",
                owner_id, active.id
            )));
        }
        self.sessions.insert_session(&session).await?;

        info!(
            session_id = %session.id,
            owner_id = %owner_id,
            items = session.items.len(),
            "Review session created"
        );
        Ok(session)
    }

    pub async fn find_active_session(&self, owner_id: &str) -> Result<Option<ReviewSession>> {
        self.sessions.find_active_session(owner_id).await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<ReviewSession> {
        self.sessions
            .get_session(session_id)
            .await?
            .ok_or_else(|| Error::not_found("ReviewSession", session_id))
    }

    /// Sessions of an owner, newest first
    pub async fn list_sessions(
        &self,
        owner_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ReviewSession>> {
        let limit = limit
            .unwrap_or(self.config.session_list_limit)
            .min(HARD_RESULT_CAP);
        self.sessions.list_sessions(owner_id, limit).await
    }

    /// Record the response to one item and reschedule its entry
    pub async fn record_item_response(
        &self,
        session_id: &str,
        entry_id: &str,
        response: ReviewResponse,
        response_time_ms: Option<u64>,
    ) -> Result<ReviewSession> {
        let _guard = self
            .locks
            .acquire(LockScope::review_item(session_id, entry_id))
            .await;

        let session = self.get_session(session_id).await?;
        session.ensure_answerable(entry_id)?;
        // The referenced entry must be the session owner's before anything is written
        self.require_owned_entry(entry_id, &session.owner_id).await?;

        let applied = self
            .sessions
            .record_item_response(session_id, entry_id, response, response_time_ms)
            .await?;
        if !applied {
            warn!(session_id = %session_id, entry_id = %entry_id, "Review response lost a race");
            return Err(Error::conflict(format!(
                "entry '{}' can no longer be answered in session '{}'",
                entry_id, session_id
            )));
        }

        if let Err(e) = self
            .scheduler
            .record_review(entry_id, response, response_time_ms)
            .await
        {
            // Give the item back so the response can be recorded again
            let reverted = self.sessions.clear_item_response(session_id, entry_id).await?;
            warn!(
                session_id = %session_id,
                entry_id = %entry_id,
                reverted,
                error = %e,
                "Rescheduling failed after the response was stored"
            );
            return Err(e);
        }

        self.get_session(session_id).await
    }

    /// Complete a session once every item has been presented
    pub async fn complete_session(&self, session_id: &str) -> Result<ReviewSession> {
        let _guard = self.locks.acquire(LockScope::session(session_id)).await;

        let mut session = self.get_session(session_id).await?;
        session.complete(self.clock.now())?;

        let completed_at = session.completed_at.unwrap_or_else(|| self.clock.now());
        let applied = self
            .sessions
            .complete_session(session_id, completed_at, &session.stats)
            .await?;
        if !applied {
            warn!(session_id = %session_id, "Session completion lost a race");
            return Err(Error::conflict(format!(
                "session '{}' can no longer be completed",
                session_id
            )));
        }

        info!(
            session_id = %session_id,
            completed_items = session.stats.completed_items,
            correct = session.stats.correct_count,
            "Review session completed"
        );
        Ok(session)
    }
}
