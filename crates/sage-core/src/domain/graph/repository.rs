//! Repository trait for concept graph persistence
//!
//! Reads go through individual lookups or a per-owner snapshot; every write
//! goes through [`GraphRepository::commit`] as one [`GraphChanges`] unit of
//! work that the backend applies atomically or not at all.

use async_trait::async_trait;

use crate::error::Result;

use super::concept::Concept;
use super::relationship::{Relationship, RelationshipKey};

/// Repository trait for concept graph persistence
#[async_trait]
pub trait GraphRepository: Send + Sync {
    // ========== Reads ==========

    /// Get a concept by ID
    async fn get_concept(&self, id: &str) -> Result<Option<Concept>>;

    /// List all concepts of an owner, ordered by name
    async fn list_concepts(&self, owner_id: &str) -> Result<Vec<Concept>>;

    /// List relationships touching a concept (as source or target)
    async fn list_relationships_for(&self, concept_id: &str) -> Result<Vec<Relationship>>;

    /// Read an owner's whole graph in one consistent view
    async fn load_snapshot(&self, owner_id: &str) -> Result<GraphSnapshot>;

    // ========== Writes ==========

    /// Apply a unit of work atomically.
    ///
    /// Backends apply, in order: relationship deletions, concept upserts,
    /// relationship upserts, concept deletions (which also drop any edge
    /// still touching the deleted concept). On error nothing is applied.
    async fn commit(&self, changes: GraphChanges) -> Result<()>;

    /// Check that the backing store is reachable
    async fn health_check(&self) -> Result<()>;
}

/// All concepts and relationships of one owner, read consistently
#[derive(Debug, Clone, Default)]
pub struct GraphSnapshot {
    pub owner_id: String,
    pub concepts: Vec<Concept>,
    pub relationships: Vec<Relationship>,
}

/// A unit of work against one owner's graph.
///
/// Built up in memory and handed to [`GraphRepository::commit`]; dropping it
/// without committing discards every change.
#[derive(Debug, Clone, Default)]
pub struct GraphChanges {
    owner_id: String,
    concept_upserts: Vec<Concept>,
    concept_deletes: Vec<String>,
    relationship_upserts: Vec<Relationship>,
    relationship_deletes: Vec<RelationshipKey>,
}

impl GraphChanges {
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            ..Default::default()
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Insert or replace a concept; a later upsert of the same id wins
    pub fn upsert_concept(&mut self, concept: Concept) -> &mut Self {
        self.concept_upserts.retain(|c| c.id != concept.id);
        self.concept_upserts.push(concept);
        self
    }

    pub fn delete_concept(&mut self, id: impl Into<String>) -> &mut Self {
        let id = id.into();
        self.concept_upserts.retain(|c| c.id != id);
        if !self.concept_deletes.contains(&id) {
            self.concept_deletes.push(id);
        }
        self
    }

    /// Insert or replace a relationship; a later upsert of the same key wins
    pub fn upsert_relationship(&mut self, relationship: Relationship) -> &mut Self {
        let key = relationship.key();
        self.relationship_upserts.retain(|r| r.key() != key);
        self.relationship_upserts.push(relationship);
        self
    }

    pub fn delete_relationship(&mut self, key: RelationshipKey) -> &mut Self {
        if !self.relationship_deletes.contains(&key) {
            self.relationship_deletes.push(key);
        }
        self
    }

    pub fn concept_upserts(&self) -> &[Concept] {
        &self.concept_upserts
    }

    pub fn concept_deletes(&self) -> &[String] {
        &self.concept_deletes
    }

    pub fn relationship_upserts(&self) -> &[Relationship] {
        &self.relationship_upserts
    }

    pub fn relationship_deletes(&self) -> &[RelationshipKey] {
        &self.relationship_deletes
    }

    pub fn is_empty(&self) -> bool {
        self.concept_upserts.is_empty()
            && self.concept_deletes.is_empty()
            && self.relationship_upserts.is_empty()
            && self.relationship_deletes.is_empty()
    }
}
