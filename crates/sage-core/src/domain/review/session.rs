//! Review session entity and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::{Error, Result};

use super::entry::ReviewResponse;

/// Lifecycle state of a review session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Accepting responses
    Active,
    /// Terminal; no further changes
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry presented within a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub entry_id: String,
    pub presented: bool,
    /// Set once, never changed afterwards
    pub response: Option<ReviewResponse>,
    pub response_time_ms: Option<u64>,
}

impl ReviewItem {
    pub fn new(entry_id: impl Into<String>) -> Self {
        Self {
            entry_id: entry_id.into(),
            presented: false,
            response: None,
            response_time_ms: None,
        }
    }

    pub fn is_answered(&self) -> bool {
        self.response.is_some()
    }
}

/// Aggregates over a session's items; zeroed until the session completes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewStats {
    pub total_items: usize,
    pub completed_items: usize,
    pub correct_count: usize,
    /// Mean over items with a response time, 0 when none has one
    pub average_response_time_ms: f64,
}

impl ReviewStats {
    pub fn compute(items: &[ReviewItem]) -> Self {
        let times: Vec<u64> = items.iter().filter_map(|i| i.response_time_ms).collect();
        let average_response_time_ms = if times.is_empty() {
            0.0
        } else {
            times.iter().sum::<u64>() as f64 / times.len() as f64
        };

        Self {
            total_items: items.len(),
            completed_items: items.iter().filter(|i| i.is_answered()).count(),
            correct_count: items
                .iter()
                .filter(|i| i.response.is_some_and(|r| r.is_correct()))
                .count(),
            average_response_time_ms,
        }
    }
}

/// A batch of reviews for one owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewSession {
    pub id: String,
    pub owner_id: String,
    pub started_at: DateTime<Utc>,
    /// Presence means the session is completed
    pub completed_at: Option<DateTime<Utc>>,
    /// Fixed at creation
    pub items: Vec<ReviewItem>,
    pub stats: ReviewStats,
}

impl ReviewSession {
    /// Start a session over distinct entry ids
    pub fn new(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        entry_ids: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let owner_id = owner_id.into();
        if owner_id.trim().is_empty() {
            return Err(Error::validation("session owner id must not be empty"));
        }
        if entry_ids.is_empty() {
            return Err(Error::validation("a review session needs at least one entry"));
        }
        let mut seen = HashSet::with_capacity(entry_ids.len());
        for id in &entry_ids {
            if !seen.insert(id.as_str()) {
                return Err(Error::validation(format!(
                    "entry '{}' appears more than once in the session",
                    id
                )));
            }
        }

        Ok(Self {
            id: id.into(),
            owner_id,
            started_at: now,
            completed_at: None,
            items: entry_ids.into_iter().map(ReviewItem::new).collect(),
            stats: ReviewStats::default(),
        })
    }

    pub fn status(&self) -> SessionStatus {
        if self.completed_at.is_some() {
            SessionStatus::Completed
        } else {
            SessionStatus::Active
        }
    }

    pub fn is_active(&self) -> bool {
        self.completed_at.is_none()
    }

    pub fn item(&self, entry_id: &str) -> Option<&ReviewItem> {
        self.items.iter().find(|i| i.entry_id == entry_id)
    }

    /// Check that `entry_id` can take a response right now
    pub fn ensure_answerable(&self, entry_id: &str) -> Result<&ReviewItem> {
        let item = self
            .item(entry_id)
            .ok_or_else(|| Error::not_found("ReviewItem", format!("{}/{}", self.id, entry_id)))?;
        if !self.is_active() {
            return Err(Error::conflict(format!("session '{}' is already completed", self.id)));
        }
        if item.is_answered() {
            return Err(Error::conflict(format!(
                "entry '{}' already has a response in session '{}'",
                entry_id, self.id
            )));
        }
        Ok(item)
    }

    /// Record a response on an item, marking it presented
    pub fn record_response(
        &mut self,
        entry_id: &str,
        response: ReviewResponse,
        response_time_ms: Option<u64>,
    ) -> Result<()> {
        self.ensure_answerable(entry_id)?;
        if let Some(item) = self.items.iter_mut().find(|i| i.entry_id == entry_id) {
            item.presented = true;
            item.response = Some(response);
            item.response_time_ms = response_time_ms;
        }
        Ok(())
    }

    /// Reset an answered item to unpresented while the session is active.
    ///
    /// Returns whether anything changed.
    pub fn clear_response(&mut self, entry_id: &str) -> bool {
        if !self.is_active() {
            return false;
        }
        match self.items.iter_mut().find(|i| i.entry_id == entry_id) {
            Some(item) if item.is_answered() => {
                item.presented = false;
                item.response = None;
                item.response_time_ms = None;
                true
            }
            _ => false,
        }
    }

    /// Check that the session can move to Completed
    pub fn ensure_completable(&self) -> Result<()> {
        if !self.is_active() {
            return Err(Error::conflict(format!("session '{}' is already completed", self.id)));
        }
        let pending = self.items.iter().filter(|i| !i.presented).count();
        if pending > 0 {
            return Err(Error::conflict(format!(
                "session '{}' still has {} unpresented item(s)",
                self.id, pending
            )));
        }
        Ok(())
    }

    /// Move to Completed and compute stats
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_completable()?;
        self.completed_at = Some(now);
        self.stats = ReviewStats::compute(&self.items);
        Ok(())
    }
}
