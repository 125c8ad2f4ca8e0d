//! Lock scopes

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a lock serializes access to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "scope")]
pub enum LockScope {
    /// All graph mutations of one owner (store edits and merges)
    Graph { owner_id: String },
    /// Session creation for one owner
    Sessions { owner_id: String },
    /// One item of one review session
    ReviewItem { session_id: String, entry_id: String },
    /// Completion of one review session
    Session { session_id: String },
    /// Scheduling state of one knowledge entry
    Entry { entry_id: String },
}

impl LockScope {
    pub fn graph(owner_id: impl Into<String>) -> Self {
        Self::Graph {
            owner_id: owner_id.into(),
        }
    }

    pub fn sessions(owner_id: impl Into<String>) -> Self {
        Self::Sessions {
            owner_id: owner_id.into(),
        }
    }

    pub fn review_item(session_id: impl Into<String>, entry_id: impl Into<String>) -> Self {
        Self::ReviewItem {
            session_id: session_id.into(),
            entry_id: entry_id.into(),
        }
    }

    pub fn session(session_id: impl Into<String>) -> Self {
        Self::Session {
            session_id: session_id.into(),
        }
    }

    pub fn entry(entry_id: impl Into<String>) -> Self {
        Self::Entry {
            entry_id: entry_id.into(),
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Graph { .. } => "graph",
            Self::Sessions { .. } => "sessions",
            Self::ReviewItem { .. } => "review_item",
            Self::Session { .. } => "session",
            Self::Entry { .. } => "entry",
        }
    }

    /// Get the key locks are tracked under
    pub fn lock_key(&self) -> String {
        match self {
            Self::Graph { owner_id } | Self::Sessions { owner_id } => {
                format!("{}:{}", self.as_str(), owner_id)
            }
            Self::ReviewItem {
                session_id,
                entry_id,
            } => format!("{}:{}:{}", self.as_str(), session_id, entry_id),
            Self::Session { session_id } => format!("{}:{}", self.as_str(), session_id),
            Self::Entry { entry_id } => format!("{}:{}", self.as_str(), entry_id),
        }
    }
}

impl fmt::Display for LockScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.lock_key())
    }
}
