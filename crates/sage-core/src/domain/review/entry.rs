//! Knowledge entries and review responses

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A piece of knowledge scheduled for spaced repetition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: String,
    pub owner_id: String,
    pub content: String,
    /// Number of recorded reviews
    pub review_count: u32,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    /// Entries without a scheduled time are never due
    pub next_review_at: Option<DateTime<Utc>>,
    /// Estimate of how well the owner remembers this entry, in [0, 1]
    pub retention_score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeEntry {
    /// Create an unscheduled entry
    pub fn new(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        content: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let owner_id = owner_id.into();
        let content = content.into();
        if owner_id.trim().is_empty() {
            return Err(Error::validation("entry owner id must not be empty"));
        }
        if content.trim().is_empty() {
            return Err(Error::validation("entry content must not be empty"));
        }

        Ok(Self {
            id: id.into(),
            owner_id,
            content: content.trim().to_string(),
            review_count: 0,
            last_reviewed_at: None,
            next_review_at: None,
            retention_score: 0.0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Whether the entry is scheduled at or before `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review_at.is_some_and(|next| next <= now)
    }

    pub fn is_scheduled(&self) -> bool {
        self.next_review_at.is_some()
    }
}

/// How well the owner recalled an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewResponse {
    Forgot,
    Hard,
    Good,
    Easy,
}

impl ReviewResponse {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forgot => "forgot",
            Self::Hard => "hard",
            Self::Good => "good",
            Self::Easy => "easy",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "forgot" => Some(Self::Forgot),
            "hard" => Some(Self::Hard),
            "good" => Some(Self::Good),
            "easy" => Some(Self::Easy),
            _ => None,
        }
    }

    pub fn all() -> &'static [ReviewResponse] {
        &[Self::Forgot, Self::Hard, Self::Good, Self::Easy]
    }

    /// Anything but `forgot` counts as recalled
    pub fn is_correct(&self) -> bool {
        !matches!(self, Self::Forgot)
    }
}

impl fmt::Display for ReviewResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReviewResponse {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| {
            Error::validation(format!(
                "unknown review response '{}', expected forgot, hard, good or easy",
                s
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_entry_is_unscheduled() {
        let now = Utc::now();
        let entry = KnowledgeEntry::new("e-1", "u-1", " Ownership moves values ", now).unwrap();
        assert_eq!(entry.content, "Ownership moves values");
        assert_eq!(entry.retention_score, 0.0);
        assert!(!entry.is_scheduled());
        assert!(!entry.is_due(now + Duration::days(365)));
    }

    #[test]
    fn test_entry_validation() {
        let now = Utc::now();
        assert!(KnowledgeEntry::new("e-1", "u-1", "  ", now).unwrap_err().is_validation());
        assert!(KnowledgeEntry::new("e-1", "", "x", now).unwrap_err().is_validation());
    }

    #[test]
    fn test_due_boundary_is_inclusive() {
        let now = Utc::now();
        let mut entry = KnowledgeEntry::new("e-1", "u-1", "x", now).unwrap();
        entry.next_review_at = Some(now);
        assert!(entry.is_due(now));
        assert!(!entry.is_due(now - Duration::seconds(1)));
    }

    #[test]
    fn test_response_parsing() {
        assert_eq!(ReviewResponse::parse("GOOD"), Some(ReviewResponse::Good));
        assert!("meh".parse::<ReviewResponse>().unwrap_err().is_validation());
        assert!(!ReviewResponse::Forgot.is_correct());
        assert!(ReviewResponse::Hard.is_correct());
        assert_eq!(
            serde_json::to_string(&ReviewResponse::Easy).unwrap(),
            "\"easy\""
        );
    }
}
