//! Spaced-repetition scheduling
//!
//! Each review response rescales the entry's retention score and its review
//! interval. Failures reset the interval; successes stretch it. Retention is
//! clamped to `[0, 1]` and intervals to `[1, 365]` days.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::clock::{Clock, IdGenerator};
use crate::config::{HARD_RESULT_CAP, ReviewConfig};
use crate::domain::locking::{LockManager, LockScope};
use crate::error::{Error, Result};

use super::entry::{KnowledgeEntry, ReviewResponse};
use super::repository::KnowledgeEntryRepository;

/// Shortest interval between reviews, in days
pub const MIN_INTERVAL_DAYS: f64 = 1.0;
/// Longest interval between reviews, in days
pub const MAX_INTERVAL_DAYS: f64 = 365.0;

const MS_PER_DAY: f64 = 86_400_000.0;

/// Result of applying one response to an entry's scheduling state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleUpdate {
    pub retention_score: f64,
    pub interval_days: f64,
    pub next_review_at: DateTime<Utc>,
}

/// Interval implied by the previous schedule, 1 day when there is none
pub fn previous_interval_days(entry: &KnowledgeEntry) -> f64 {
    match (entry.last_reviewed_at, entry.next_review_at) {
        (Some(last), Some(next)) => {
            let days = (next - last).num_milliseconds() as f64 / MS_PER_DAY;
            if days > 0.0 { days } else { MIN_INTERVAL_DAYS }
        }
        _ => MIN_INTERVAL_DAYS,
    }
}

/// Compute the next schedule for `entry` after `response` at `now`
pub fn schedule(entry: &KnowledgeEntry, response: ReviewResponse, now: DateTime<Utc>) -> ScheduleUpdate {
    let retention = entry.retention_score.clamp(0.0, 1.0);
    let previous = previous_interval_days(entry);

    let (retention, interval) = match response {
        ReviewResponse::Forgot => (retention * 0.5, MIN_INTERVAL_DAYS),
        ReviewResponse::Hard => (retention * 0.85, (previous * 1.2).max(MIN_INTERVAL_DAYS)),
        ReviewResponse::Good => (retention + (1.0 - retention) * 0.5, previous * 2.0),
        ReviewResponse::Easy => (retention + (1.0 - retention) * 0.8, previous * 3.0),
    };
    let retention_score = retention.clamp(0.0, 1.0);
    let interval_days = interval.clamp(MIN_INTERVAL_DAYS, MAX_INTERVAL_DAYS);

    ScheduleUpdate {
        retention_score,
        interval_days,
        next_review_at: now + Duration::milliseconds((interval_days * MS_PER_DAY).round() as i64),
    }
}

/// Due-ness queries and scheduling updates for knowledge entries
pub struct ReviewScheduler<E: KnowledgeEntryRepository> {
    repository: Arc<E>,
    locks: Arc<LockManager>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    config: ReviewConfig,
}

impl<E: KnowledgeEntryRepository> ReviewScheduler<E> {
    pub fn new(
        repository: Arc<E>,
        locks: Arc<LockManager>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        config: ReviewConfig,
    ) -> Self {
        Self {
            repository,
            locks,
            clock,
            ids,
            config,
        }
    }

    pub fn repository(&self) -> &Arc<E> {
        &self.repository
    }

    /// Add a new, unscheduled entry
    pub async fn add_entry(&self, owner_id: &str, content: &str) -> Result<KnowledgeEntry> {
        let entry = KnowledgeEntry::new(self.ids.next_id(), owner_id, content, self.clock.now())?;
        self.repository.save_entry(&entry).await?;
        info!(entry_id = %entry.id, owner_id = %owner_id, "Knowledge entry added");
        Ok(entry)
    }

    pub async fn get_entry(&self, entry_id: &str) -> Result<KnowledgeEntry> {
        self.repository
            .get_entry(entry_id)
            .await?
            .ok_or_else(|| Error::not_found("KnowledgeEntry", entry_id))
    }

    pub async fn list_entries(&self, owner_id: &str) -> Result<Vec<KnowledgeEntry>> {
        self.repository.list_entries(owner_id).await
    }

    /// Schedule a never-scheduled entry for review now; scheduled entries are left alone
    pub async fn enroll_entry(&self, entry_id: &str) -> Result<KnowledgeEntry> {
        let _guard = self.locks.acquire(LockScope::entry(entry_id)).await;
        let mut entry = self.get_entry(entry_id).await?;
        if entry.is_scheduled() {
            return Ok(entry);
        }

        let now = self.clock.now();
        entry.next_review_at = Some(now);
        entry.updated_at = now;
        self.repository.save_entry(&entry).await?;

        debug!(entry_id = %entry_id, "Entry enrolled for review");
        Ok(entry)
    }

    /// Entries whose scheduled time has passed, most overdue first
    pub async fn find_due_for_review(
        &self,
        owner_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<KnowledgeEntry>> {
        let limit = limit.unwrap_or(self.config.due_limit).min(HARD_RESULT_CAP);
        self.repository
            .list_due(owner_id, self.clock.now(), limit)
            .await
    }

    /// Apply a review response to an entry's scheduling state
    pub async fn record_review(
        &self,
        entry_id: &str,
        response: ReviewResponse,
        response_time_ms: Option<u64>,
    ) -> Result<KnowledgeEntry> {
        let _guard = self.locks.acquire(LockScope::entry(entry_id)).await;
        let mut entry = self.get_entry(entry_id).await?;

        let now = self.clock.now();
        let update = schedule(&entry, response, now);
        entry.retention_score = update.retention_score;
        entry.last_reviewed_at = Some(now);
        entry.next_review_at = Some(update.next_review_at);
        entry.review_count += 1;
        entry.updated_at = now;
        self.repository.save_entry(&entry).await?;

        debug!(
            entry_id = %entry_id,
            response = %response,
            response_time_ms = ?response_time_ms,
            retention = entry.retention_score,
            interval_days = update.interval_days,
            "Review recorded"
        );
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn entry(retention: f64, interval_days: Option<i64>) -> KnowledgeEntry {
        let mut entry = KnowledgeEntry::new("e-1", "u-1", "content", base()).unwrap();
        entry.retention_score = retention;
        if let Some(days) = interval_days {
            entry.last_reviewed_at = Some(base() - Duration::days(days));
            entry.next_review_at = Some(base());
        }
        entry
    }

    #[test]
    fn test_previous_interval_defaults_to_one_day() {
        assert_eq!(previous_interval_days(&entry(0.0, None)), 1.0);
        assert_eq!(previous_interval_days(&entry(0.0, Some(4))), 4.0);

        let mut odd = entry(0.0, Some(4));
        odd.next_review_at = odd.last_reviewed_at.map(|t| t - Duration::days(1));
        assert_eq!(previous_interval_days(&odd), 1.0);
    }

    #[test]
    fn test_good_doubles_interval() {
        let update = schedule(&entry(0.5, Some(4)), ReviewResponse::Good, base());
        assert!((update.retention_score - 0.75).abs() < 1e-9);
        assert_eq!(update.interval_days, 8.0);
        assert_eq!(update.next_review_at, base() + Duration::days(8));
    }

    #[test]
    fn test_forgot_resets_interval() {
        let update = schedule(&entry(0.75, Some(8)), ReviewResponse::Forgot, base());
        assert!((update.retention_score - 0.375).abs() < 1e-9);
        assert_eq!(update.interval_days, 1.0);
    }

    #[test]
    fn test_hard_and_easy() {
        let hard = schedule(&entry(1.0, Some(10)), ReviewResponse::Hard, base());
        assert!((hard.retention_score - 0.85).abs() < 1e-9);
        assert!((hard.interval_days - 12.0).abs() < 1e-9);

        let easy = schedule(&entry(0.0, None), ReviewResponse::Easy, base());
        assert!((easy.retention_score - 0.8).abs() < 1e-9);
        assert_eq!(easy.interval_days, 3.0);
    }

    #[test]
    fn test_interval_clamped_to_a_year() {
        let update = schedule(&entry(0.9, Some(200)), ReviewResponse::Easy, base());
        assert_eq!(update.interval_days, MAX_INTERVAL_DAYS);
    }

    #[test]
    fn test_out_of_range_retention_is_clamped() {
        let update = schedule(&entry(7.0, None), ReviewResponse::Good, base());
        assert!(update.retention_score <= 1.0);
        let update = schedule(&entry(-3.0, None), ReviewResponse::Forgot, base());
        assert!(update.retention_score >= 0.0);
    }
}
