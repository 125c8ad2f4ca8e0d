//! Concept nodes of a user's knowledge graph

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A named node in one user's knowledge graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    /// Opaque stable identifier
    pub id: String,
    /// User that owns this concept and every edge touching it
    pub owner_id: String,
    /// Human-readable name (never empty)
    pub name: String,
    /// Optional description of the concept
    pub description: Option<String>,
    /// Alternative names, deduplicated case-insensitively
    pub aliases: Vec<String>,
    /// Number of knowledge entries linked to this concept
    pub entry_count: u64,
    /// When the concept was created
    pub created_at: DateTime<Utc>,
    /// When the concept or its incident edge set last changed
    pub updated_at: DateTime<Utc>,
}

impl Concept {
    /// Build a concept from validated input
    pub fn new(id: impl Into<String>, draft: NewConcept, now: DateTime<Utc>) -> Result<Self> {
        let name = normalize_name(&draft.name)?;
        if draft.owner_id.trim().is_empty() {
            return Err(Error::validation("concept owner id must not be empty"));
        }

        let mut concept = Self {
            id: id.into(),
            owner_id: draft.owner_id,
            name,
            description: normalize_description(draft.description),
            aliases: Vec::new(),
            entry_count: 0,
            created_at: now,
            updated_at: now,
        };
        for alias in draft.aliases {
            concept.add_alias(&alias);
        }
        Ok(concept)
    }

    /// Add an alias unless an equal one (ignoring case) is already present.
    ///
    /// Returns whether the alias was added.
    pub fn add_alias(&mut self, alias: &str) -> bool {
        let alias = alias.trim();
        if alias.is_empty() || self.has_alias(alias) {
            return false;
        }
        self.aliases.push(alias.to_string());
        true
    }

    /// Case-insensitive alias membership
    pub fn has_alias(&self, alias: &str) -> bool {
        let needle = alias.trim().to_lowercase();
        self.aliases.iter().any(|a| a.to_lowercase() == needle)
    }

    /// Case-insensitive match against the name or any alias
    pub fn is_known_as(&self, label: &str) -> bool {
        self.name.to_lowercase() == label.trim().to_lowercase() || self.has_alias(label)
    }

    /// Apply a partial update in place
    pub fn apply(&mut self, update: ConceptUpdate, now: DateTime<Utc>) -> Result<()> {
        if let Some(name) = update.name {
            self.name = normalize_name(&name)?;
        }
        if let Some(description) = update.description {
            self.description = normalize_description(description);
        }
        if let Some(aliases) = update.aliases {
            self.aliases.clear();
            for alias in aliases {
                self.add_alias(&alias);
            }
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

/// Input for creating a concept
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewConcept {
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    pub aliases: Vec<String>,
}

impl NewConcept {
    pub fn new(owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            name: name.into(),
            description: None,
            aliases: Vec::new(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set aliases
    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }
}

/// Partial update of a concept; `None` leaves a field untouched.
///
/// `description: Some(None)` clears the description.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConceptUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub aliases: Option<Vec<String>>,
}

impl ConceptUpdate {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = Some(description);
        self
    }

    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = Some(aliases);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.aliases.is_none()
    }
}

fn normalize_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::validation("concept name must not be empty"));
    }
    Ok(trimmed.to_string())
}

fn normalize_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}
