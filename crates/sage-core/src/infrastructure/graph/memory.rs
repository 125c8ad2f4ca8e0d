//! In-memory implementation of the GraphRepository
//!
//! Commits are copy-on-write: the change set is applied to a clone of the
//! state, checked, and swapped in only if every change succeeded.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::graph::{
    Concept, GraphChanges, GraphRepository, GraphSnapshot, Relationship, RelationshipKey,
};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
struct GraphState {
    concepts: HashMap<String, Concept>,
    relationships: BTreeMap<RelationshipKey, Relationship>,
}

impl GraphState {
    fn apply(&mut self, changes: &GraphChanges) -> Result<()> {
        for key in changes.relationship_deletes() {
            self.relationships.remove(key);
        }

        for concept in changes.concept_upserts() {
            if concept.owner_id != changes.owner_id() {
                return Err(Error::validation(format!(
                    "concept '{}' does not belong to owner '{}'",
                    concept.id,
                    changes.owner_id()
                )));
            }
            self.concepts.insert(concept.id.clone(), concept.clone());
        }

        for rel in changes.relationship_upserts() {
            for endpoint in [&rel.source_id, &rel.target_id] {
                match self.concepts.get(endpoint) {
                    Some(c) if c.owner_id == changes.owner_id() => {}
                    Some(_) => {
                        return Err(Error::validation(format!(
                            "relationship {} crosses owners",
                            rel.key()
                        )));
                    }
                    None => return Err(Error::not_found("Concept", endpoint.clone())),
                }
            }
            self.relationships.insert(rel.key(), rel.clone());
        }

        for id in changes.concept_deletes() {
            self.concepts.remove(id);
            self.relationships.retain(|_, r| !r.touches(id));
        }

        Ok(())
    }
}

/// Graph repository held entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryGraphRepository {
    state: RwLock<GraphState>,
}

impl InMemoryGraphRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphRepository for InMemoryGraphRepository {
    async fn get_concept(&self, id: &str) -> Result<Option<Concept>> {
        Ok(self.state.read().await.concepts.get(id).cloned())
    }

    async fn list_concepts(&self, owner_id: &str) -> Result<Vec<Concept>> {
        let state = self.state.read().await;
        let mut concepts: Vec<Concept> = state
            .concepts
            .values()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect();
        concepts.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(concepts)
    }

    async fn list_relationships_for(&self, concept_id: &str) -> Result<Vec<Relationship>> {
        let state = self.state.read().await;
        Ok(state
            .relationships
            .values()
            .filter(|r| r.touches(concept_id))
            .cloned()
            .collect())
    }

    async fn load_snapshot(&self, owner_id: &str) -> Result<GraphSnapshot> {
        let state = self.state.read().await;
        let concepts: Vec<Concept> = state
            .concepts
            .values()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect();
        let relationships = state
            .relationships
            .values()
            .filter(|r| {
                state
                    .concepts
                    .get(&r.source_id)
                    .is_some_and(|c| c.owner_id == owner_id)
            })
            .cloned()
            .collect();

        Ok(GraphSnapshot {
            owner_id: owner_id.to_string(),
            concepts,
            relationships,
        })
    }

    async fn commit(&self, changes: GraphChanges) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut state = self.state.write().await;
        let mut next = state.clone();
        next.apply(&changes)?;
        *state = next;

        debug!(
            owner_id = %changes.owner_id(),
            concept_upserts = changes.concept_upserts().len(),
            concept_deletes = changes.concept_deletes().len(),
            relationship_upserts = changes.relationship_upserts().len(),
            relationship_deletes = changes.relationship_deletes().len(),
            "Graph changes committed"
        );
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::{NewConcept, RelationshipType};
    use chrono::Utc;

    fn concept(id: &str, owner: &str) -> Concept {
        Concept::new(id, NewConcept::new(owner, id.to_uppercase()), Utc::now()).unwrap()
    }

    fn edge(s: &str, t: &str) -> Relationship {
        Relationship::new(s, t, RelationshipType::RelatedTo, 0.5, Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_state_untouched() {
        let repo = InMemoryGraphRepository::new();
        let mut seed = GraphChanges::new("u-1");
        seed.upsert_concept(concept("a", "u-1"))
            .upsert_concept(concept("b", "u-1"))
            .upsert_relationship(edge("a", "b"));
        repo.commit(seed).await.unwrap();

        let mut bad = GraphChanges::new("u-1");
        bad.delete_relationship(edge("a", "b").key())
            .upsert_concept(concept("c", "u-1"))
            .upsert_relationship(edge("c", "missing"));
        let err = repo.commit(bad).await.unwrap_err();
        assert!(err.is_not_found());

        assert!(repo.get_concept("c").await.unwrap().is_none());
        assert_eq!(repo.list_relationships_for("a").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concept_delete_cascades() {
        let repo = InMemoryGraphRepository::new();
        let mut seed = GraphChanges::new("u-1");
        seed.upsert_concept(concept("a", "u-1"))
            .upsert_concept(concept("b", "u-1"))
            .upsert_relationship(edge("a", "b"))
            .upsert_relationship(edge("b", "a"));
        repo.commit(seed).await.unwrap();

        let mut delete = GraphChanges::new("u-1");
        delete.delete_concept("a");
        repo.commit(delete).await.unwrap();

        assert!(repo.list_relationships_for("b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_is_owner_scoped() {
        let repo = InMemoryGraphRepository::new();
        let mut one = GraphChanges::new("u-1");
        one.upsert_concept(concept("a", "u-1"))
            .upsert_concept(concept("b", "u-1"))
            .upsert_relationship(edge("a", "b"));
        repo.commit(one).await.unwrap();
        let mut two = GraphChanges::new("u-2");
        two.upsert_concept(concept("z", "u-2"));
        repo.commit(two).await.unwrap();

        let snapshot = repo.load_snapshot("u-1").await.unwrap();
        assert_eq!(snapshot.concepts.len(), 2);
        assert_eq!(snapshot.relationships.len(), 1);
        assert_eq!(repo.list_concepts("u-2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cross_owner_edge_rejected() {
        let repo = InMemoryGraphRepository::new();
        let mut one = GraphChanges::new("u-1");
        one.upsert_concept(concept("a", "u-1"));
        repo.commit(one).await.unwrap();
        let mut two = GraphChanges::new("u-2");
        two.upsert_concept(concept("z", "u-2"));
        repo.commit(two).await.unwrap();

        let mut bad = GraphChanges::new("u-1");
        bad.upsert_relationship(edge("a", "z"));
        assert!(repo.commit(bad).await.unwrap_err().is_validation());
    }
}
