//! Directed, typed, weighted edges between concepts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Default strength of a newly created relationship
pub const DEFAULT_STRENGTH: f64 = 1.0;

/// A directed edge between two concepts owned by the same user
///
/// At most one edge exists per `(source, target, type)` triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// ID of the source concept
    pub source_id: String,
    /// ID of the target concept
    pub target_id: String,
    /// Type of relationship
    pub relationship_type: RelationshipType,
    /// Strength of the relationship (0.0 to 1.0)
    pub strength: f64,
    /// When the relationship was first created
    pub created_at: DateTime<Utc>,
    /// When the strength last changed
    pub updated_at: DateTime<Utc>,
}

impl Relationship {
    /// Create a validated relationship
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relationship_type: RelationshipType,
        strength: f64,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let source_id = source_id.into();
        let target_id = target_id.into();
        if source_id == target_id {
            return Err(Error::validation(format!(
                "a concept cannot be related to itself ({})",
                source_id
            )));
        }
        validate_strength(strength)?;

        Ok(Self {
            source_id,
            target_id,
            relationship_type,
            strength,
            created_at: now,
            updated_at: now,
        })
    }

    /// The identity of this edge
    pub fn key(&self) -> RelationshipKey {
        RelationshipKey {
            source_id: self.source_id.clone(),
            target_id: self.target_id.clone(),
            relationship_type: self.relationship_type,
        }
    }

    /// Whether the edge touches the given concept in either direction
    pub fn touches(&self, concept_id: &str) -> bool {
        self.source_id == concept_id || self.target_id == concept_id
    }

    /// The endpoint that is not `concept_id`
    pub fn other_end(&self, concept_id: &str) -> &str {
        if self.source_id == concept_id {
            &self.target_id
        } else {
            &self.source_id
        }
    }
}

/// Identity of a relationship: one edge per triple
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationshipKey {
    pub source_id: String,
    pub target_id: String,
    pub relationship_type: RelationshipType,
}

impl fmt::Display for RelationshipKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -[{}]-> {}",
            self.source_id, self.relationship_type, self.target_id
        )
    }
}

/// Types of relationships between concepts
///
/// Declaration order is the tie-break order used by traversals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    /// Generic association
    RelatedTo,
    /// Source must be understood before target
    PrerequisiteOf,
    /// Source extends target
    BuildsOn,
    /// Source is contrasted with target
    ContrastsWith,
    /// Source is an example of target
    ExampleOf,
    /// Source is a component of target
    PartOf,
}

impl RelationshipType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RelatedTo => "related_to",
            Self::PrerequisiteOf => "prerequisite_of",
            Self::BuildsOn => "builds_on",
            Self::ContrastsWith => "contrasts_with",
            Self::ExampleOf => "example_of",
            Self::PartOf => "part_of",
        }
    }

    /// Parse from string, `None` for unknown values
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "related_to" | "relatedto" => Some(Self::RelatedTo),
            "prerequisite_of" | "prerequisiteof" => Some(Self::PrerequisiteOf),
            "builds_on" | "buildson" => Some(Self::BuildsOn),
            "contrasts_with" | "contrastswith" => Some(Self::ContrastsWith),
            "example_of" | "exampleof" => Some(Self::ExampleOf),
            "part_of" | "partof" => Some(Self::PartOf),
            _ => None,
        }
    }

    /// Get all relationship types
    pub fn all() -> &'static [RelationshipType] {
        &[
            Self::RelatedTo,
            Self::PrerequisiteOf,
            Self::BuildsOn,
            Self::ContrastsWith,
            Self::ExampleOf,
            Self::PartOf,
        ]
    }

    /// Types that define the ancestor/descendant hierarchy
    pub fn is_hierarchical(&self) -> bool {
        matches!(self, Self::PartOf | Self::PrerequisiteOf)
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RelationshipType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| {
            Error::validation(format!(
                "unknown relationship type '{}', expected one of: {}",
                s,
                Self::all()
                    .iter()
                    .map(|t| t.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })
    }
}

/// Strength must be a finite number in [0, 1]
pub fn validate_strength(strength: f64) -> Result<()> {
    if !strength.is_finite() || !(0.0..=1.0).contains(&strength) {
        return Err(Error::validation(format!(
            "relationship strength must be within [0, 1], got {}",
            strength
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_relationship_creation() {
        let rel = Relationship::new("a", "b", RelationshipType::BuildsOn, 0.8, now()).unwrap();
        assert_eq!(rel.source_id, "a");
        assert_eq!(rel.target_id, "b");
        assert_eq!(rel.strength, 0.8);
        assert_eq!(rel.other_end("a"), "b");
        assert!(rel.touches("b"));
    }

    #[test]
    fn test_self_loop_rejected() {
        let err = Relationship::new("a", "a", RelationshipType::RelatedTo, 1.0, now()).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_strength_bounds() {
        assert!(validate_strength(0.0).is_ok());
        assert!(validate_strength(1.0).is_ok());
        assert!(validate_strength(1.01).is_err());
        assert!(validate_strength(-0.1).is_err());
        assert!(validate_strength(f64::NAN).is_err());
    }

    #[test]
    fn test_relationship_type_parsing() {
        assert_eq!(
            RelationshipType::parse("builds_on"),
            Some(RelationshipType::BuildsOn)
        );
        assert_eq!(
            RelationshipType::parse("PART_OF"),
            Some(RelationshipType::PartOf)
        );
        assert_eq!(RelationshipType::parse("uses"), None);

        let err = "uses".parse::<RelationshipType>().unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_hierarchical_types() {
        let hierarchical: Vec<_> = RelationshipType::all()
            .iter()
            .filter(|t| t.is_hierarchical())
            .collect();
        assert_eq!(
            hierarchical,
            vec![&RelationshipType::PrerequisiteOf, &RelationshipType::PartOf]
        );
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&RelationshipType::ContrastsWith).unwrap();
        assert_eq!(json, "\"contrasts_with\"");
    }
}
