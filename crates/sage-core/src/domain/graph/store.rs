//! Concept graph mutations
//!
//! All writes for one owner are serialized through the `graph:<owner>` lock.
//! A mutation re-reads what it depends on after taking the lock, builds a
//! [`GraphChanges`] and commits it in one step.

use std::sync::Arc;

use tracing::{debug, info};

use crate::clock::{Clock, IdGenerator};
use crate::domain::locking::{LockGuard, LockManager, LockScope};
use crate::error::{Error, Result};

use super::concept::{Concept, ConceptUpdate, NewConcept};
use super::relationship::{DEFAULT_STRENGTH, Relationship, RelationshipType};
use super::repository::{GraphChanges, GraphRepository};

/// Owner-scoped store of concepts and relationships
pub struct ConceptGraphStore<R: GraphRepository> {
    repository: Arc<R>,
    locks: Arc<LockManager>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl<R: GraphRepository> ConceptGraphStore<R> {
    pub fn new(
        repository: Arc<R>,
        locks: Arc<LockManager>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            repository,
            locks,
            clock,
            ids,
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    async fn require_concept(&self, id: &str) -> Result<Concept> {
        self.repository
            .get_concept(id)
            .await?
            .ok_or_else(|| Error::not_found("Concept", id))
    }

    /// Lock the owner of `id` and return the concept as seen under the lock
    async fn lock_concept(&self, id: &str) -> Result<(Concept, LockGuard)> {
        let concept = self.require_concept(id).await?;
        let guard = self
            .locks
            .acquire(LockScope::graph(&concept.owner_id))
            .await;
        let concept = self.require_concept(id).await?;
        Ok((concept, guard))
    }

    // ========== Concepts ==========

    pub async fn create_concept(&self, draft: NewConcept) -> Result<Concept> {
        let concept = Concept::new(self.ids.next_id(), draft, self.clock.now())?;
        let _guard = self
            .locks
            .acquire(LockScope::graph(&concept.owner_id))
            .await;

        let mut changes = GraphChanges::new(&concept.owner_id);
        changes.upsert_concept(concept.clone());
        self.repository.commit(changes).await?;

        info!(concept_id = %concept.id, owner_id = %concept.owner_id, name = %concept.name, "Concept created");
        Ok(concept)
    }

    pub async fn get_concept(&self, id: &str) -> Result<Concept> {
        self.require_concept(id).await
    }

    /// All concepts of an owner, ordered by name
    pub async fn list_concepts(&self, owner_id: &str) -> Result<Vec<Concept>> {
        self.repository.list_concepts(owner_id).await
    }

    pub async fn update_concept(&self, id: &str, update: ConceptUpdate) -> Result<Concept> {
        let (mut concept, _guard) = self.lock_concept(id).await?;
        if update.is_empty() {
            return Ok(concept);
        }
        concept.apply(update, self.clock.now())?;

        let mut changes = GraphChanges::new(&concept.owner_id);
        changes.upsert_concept(concept.clone());
        self.repository.commit(changes).await?;

        debug!(concept_id = %concept.id, "Concept updated");
        Ok(concept)
    }

    /// Delete a concept and every relationship touching it
    pub async fn delete_concept(&self, id: &str) -> Result<()> {
        let (concept, _guard) = self.lock_concept(id).await?;
        let now = self.clock.now();

        let incident = self.repository.list_relationships_for(id).await?;
        let mut changes = GraphChanges::new(&concept.owner_id);
        for rel in &incident {
            changes.delete_relationship(rel.key());
        }
        self.touch_neighbors(&mut changes, id, &incident, now).await?;
        changes.delete_concept(id);
        self.repository.commit(changes).await?;

        info!(
            concept_id = %id,
            owner_id = %concept.owner_id,
            relationships_removed = incident.len(),
            "Concept deleted"
        );
        Ok(())
    }

    // ========== Relationships ==========

    /// Create or update the edge `(source, target, type)`.
    ///
    /// Re-creating an existing triple overwrites its strength and keeps its
    /// original creation time.
    pub async fn create_relationship(
        &self,
        source_id: &str,
        target_id: &str,
        relationship_type: RelationshipType,
        strength: Option<f64>,
    ) -> Result<Relationship> {
        let now = self.clock.now();
        let mut relationship = Relationship::new(
            source_id,
            target_id,
            relationship_type,
            strength.unwrap_or(DEFAULT_STRENGTH),
            now,
        )?;

        let (mut source, _guard) = self.lock_concept(source_id).await?;
        let mut target = self.require_concept(target_id).await?;
        if source.owner_id != target.owner_id {
            return Err(Error::validation(format!(
                "concepts '{}' and '{}' belong to different owners",
                source_id, target_id
            )));
        }

        let key = relationship.key();
        let existing = self
            .repository
            .list_relationships_for(source_id)
            .await?
            .into_iter()
            .find(|r| r.key() == key);
        if let Some(existing) = &existing {
            relationship.created_at = existing.created_at;
        }

        source.touch(now);
        target.touch(now);
        let mut changes = GraphChanges::new(&source.owner_id);
        changes
            .upsert_relationship(relationship.clone())
            .upsert_concept(source)
            .upsert_concept(target);
        self.repository.commit(changes).await?;

        debug!(
            relationship = %key,
            strength = relationship.strength,
            updated = existing.is_some(),
            "Relationship saved"
        );
        Ok(relationship)
    }

    /// Remove edges from `source` to `target`, of one type or of every type.
    ///
    /// Returns how many edges were removed; removing nothing is not an error.
    pub async fn remove_relationship(
        &self,
        source_id: &str,
        target_id: &str,
        relationship_type: Option<RelationshipType>,
    ) -> Result<usize> {
        let (mut source, _guard) = self.lock_concept(source_id).await?;

        let doomed: Vec<Relationship> = self
            .repository
            .list_relationships_for(source_id)
            .await?
            .into_iter()
            .filter(|r| r.source_id == source_id && r.target_id == target_id)
            .filter(|r| relationship_type.is_none_or(|t| r.relationship_type == t))
            .collect();
        if doomed.is_empty() {
            return Ok(0);
        }

        let now = self.clock.now();
        let mut changes = GraphChanges::new(&source.owner_id);
        for rel in &doomed {
            changes.delete_relationship(rel.key());
        }
        source.touch(now);
        changes.upsert_concept(source);
        if let Some(mut target) = self.repository.get_concept(target_id).await? {
            target.touch(now);
            changes.upsert_concept(target);
        }
        self.repository.commit(changes).await?;

        debug!(source_id = %source_id, target_id = %target_id, removed = doomed.len(), "Relationships removed");
        Ok(doomed.len())
    }

    /// Edges touching a concept in either direction
    pub async fn list_relationships(&self, concept_id: &str) -> Result<Vec<Relationship>> {
        self.require_concept(concept_id).await?;
        self.repository.list_relationships_for(concept_id).await
    }

    pub async fn health_check(&self) -> Result<()> {
        self.repository.health_check().await
    }

    /// Bump `updated_at` on every concept on the far end of `edges`
    async fn touch_neighbors(
        &self,
        changes: &mut GraphChanges,
        concept_id: &str,
        edges: &[Relationship],
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        let mut seen: Vec<&str> = Vec::new();
        for rel in edges {
            let other = rel.other_end(concept_id);
            if seen.contains(&other) {
                continue;
            }
            seen.push(other);
            if let Some(mut neighbor) = self.repository.get_concept(other).await? {
                neighbor.touch(now);
                changes.upsert_concept(neighbor);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SequentialIdGenerator};
    use crate::infrastructure::graph::InMemoryGraphRepository;
    use chrono::{Duration, TimeZone, Utc};

    struct Fixture {
        store: ConceptGraphStore<InMemoryGraphRepository>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        ));
        let store = ConceptGraphStore::new(
            Arc::new(InMemoryGraphRepository::new()),
            Arc::new(LockManager::new()),
            clock.clone(),
            Arc::new(SequentialIdGenerator::new("c")),
        );
        Fixture { store, clock }
    }

    #[tokio::test]
    async fn test_create_and_get_concept() {
        let f = fixture();
        let concept = f
            .store
            .create_concept(NewConcept::new("u-1", "Borrowing"))
            .await
            .unwrap();
        assert_eq!(concept.id, "c-0001");

        let loaded = f.store.get_concept(&concept.id).await.unwrap();
        assert_eq!(loaded, concept);

        let err = f.store.get_concept("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_create_concept_validates_input() {
        let f = fixture();
        let err = f
            .store
            .create_concept(NewConcept::new("u-1", "  "))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let err = f
            .store
            .create_concept(NewConcept::new("", "Name"))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_relationship_upsert_keeps_created_at() {
        let f = fixture();
        let a = f.store.create_concept(NewConcept::new("u-1", "A")).await.unwrap();
        let b = f.store.create_concept(NewConcept::new("u-1", "B")).await.unwrap();

        let first = f
            .store
            .create_relationship(&a.id, &b.id, RelationshipType::BuildsOn, Some(0.3))
            .await
            .unwrap();
        f.clock.advance(Duration::minutes(5));
        let second = f
            .store
            .create_relationship(&a.id, &b.id, RelationshipType::BuildsOn, Some(0.9))
            .await
            .unwrap();

        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.strength, 0.9);
        let edges = f.store.list_relationships(&a.id).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].strength, 0.9);

        // Overwriting the strength still counts as a change to both endpoints
        let now = f.clock.now();
        assert_eq!(f.store.get_concept(&a.id).await.unwrap().updated_at, now);
        assert_eq!(f.store.get_concept(&b.id).await.unwrap().updated_at, now);
        assert!(now > a.updated_at);
    }

    #[tokio::test]
    async fn test_relationship_validation() {
        let f = fixture();
        let a = f.store.create_concept(NewConcept::new("u-1", "A")).await.unwrap();
        let other = f.store.create_concept(NewConcept::new("u-2", "X")).await.unwrap();

        let self_loop = f
            .store
            .create_relationship(&a.id, &a.id, RelationshipType::RelatedTo, None)
            .await
            .unwrap_err();
        assert!(self_loop.is_validation());

        let strength = f
            .store
            .create_relationship(&a.id, &other.id, RelationshipType::RelatedTo, Some(1.5))
            .await
            .unwrap_err();
        assert!(strength.is_validation());

        let owners = f
            .store
            .create_relationship(&a.id, &other.id, RelationshipType::RelatedTo, None)
            .await
            .unwrap_err();
        assert!(owners.is_validation());

        let missing = f
            .store
            .create_relationship(&a.id, "nope", RelationshipType::RelatedTo, None)
            .await
            .unwrap_err();
        assert!(missing.is_not_found());
    }

    #[tokio::test]
    async fn test_related_to_is_not_mirrored() {
        let f = fixture();
        let a = f.store.create_concept(NewConcept::new("u-1", "A")).await.unwrap();
        let b = f.store.create_concept(NewConcept::new("u-1", "B")).await.unwrap();
        f.store
            .create_relationship(&a.id, &b.id, RelationshipType::RelatedTo, None)
            .await
            .unwrap();

        let edges = f.store.list_relationships(&b.id).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source_id, a.id);
        assert_eq!(edges[0].strength, DEFAULT_STRENGTH);
    }

    #[tokio::test]
    async fn test_remove_relationship_counts() {
        let f = fixture();
        let a = f.store.create_concept(NewConcept::new("u-1", "A")).await.unwrap();
        let b = f.store.create_concept(NewConcept::new("u-1", "B")).await.unwrap();
        for t in [RelationshipType::RelatedTo, RelationshipType::PartOf] {
            f.store.create_relationship(&a.id, &b.id, t, None).await.unwrap();
        }
        f.store
            .create_relationship(&b.id, &a.id, RelationshipType::RelatedTo, None)
            .await
            .unwrap();

        assert_eq!(
            f.store
                .remove_relationship(&a.id, &b.id, Some(RelationshipType::ExampleOf))
                .await
                .unwrap(),
            0
        );
        assert_eq!(f.store.remove_relationship(&a.id, &b.id, None).await.unwrap(), 2);
        // The reverse edge is untouched
        assert_eq!(f.store.list_relationships(&a.id).await.unwrap().len(), 1);

        let err = f
            .store
            .remove_relationship("missing", &b.id, None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(f.store.remove_relationship(&a.id, "missing", None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_concept_cascades_and_touches_neighbors() {
        let f = fixture();
        let a = f.store.create_concept(NewConcept::new("u-1", "A")).await.unwrap();
        let b = f.store.create_concept(NewConcept::new("u-1", "B")).await.unwrap();
        f.store
            .create_relationship(&b.id, &a.id, RelationshipType::PartOf, None)
            .await
            .unwrap();

        f.clock.advance(Duration::hours(1));
        f.store.delete_concept(&a.id).await.unwrap();

        assert!(f.store.get_concept(&a.id).await.unwrap_err().is_not_found());
        assert!(f.store.list_relationships(&b.id).await.unwrap().is_empty());
        let b = f.store.get_concept(&b.id).await.unwrap();
        assert_eq!(b.updated_at, f.clock.now());

        let err = f.store.delete_concept(&a.id).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_concept() {
        let f = fixture();
        let a = f.store.create_concept(NewConcept::new("u-1", "A")).await.unwrap();
        f.clock.advance(Duration::minutes(1));

        let updated = f
            .store
            .update_concept(
                &a.id,
                ConceptUpdate::rename("Alpha").with_aliases(vec!["a".into(), "A".into()]),
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Alpha");
        assert_eq!(updated.aliases, vec!["a"]);
        assert!(updated.updated_at > a.updated_at);

        let err = f
            .store
            .update_concept(&a.id, ConceptUpdate::rename(" "))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(f
            .store
            .update_concept("missing", ConceptUpdate::rename("x"))
            .await
            .unwrap_err()
            .is_not_found());
    }
}
