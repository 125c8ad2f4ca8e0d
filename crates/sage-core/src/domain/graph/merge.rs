//! Folding one concept into another

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::info;

use crate::clock::Clock;
use crate::domain::locking::{LockManager, LockScope};
use crate::error::{Error, Result};

use super::concept::Concept;
use super::relationship::{Relationship, RelationshipKey};
use super::repository::{GraphChanges, GraphRepository};

/// Merges a source concept into a target concept as one unit of work
pub struct ConceptMerger<R: GraphRepository> {
    repository: Arc<R>,
    locks: Arc<LockManager>,
    clock: Arc<dyn Clock>,
}

impl<R: GraphRepository> ConceptMerger<R> {
    pub fn new(repository: Arc<R>, locks: Arc<LockManager>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            locks,
            clock,
        }
    }

    async fn require_concept(&self, id: &str) -> Result<Concept> {
        self.repository
            .get_concept(id)
            .await?
            .ok_or_else(|| Error::not_found("Concept", id))
    }

    /// Merge `source_id` into `target_id` and return the surviving target.
    ///
    /// Every edge touching the source is re-pointed at the target; edges that
    /// would become self-loops are dropped and duplicates keep the highest
    /// strength. Aliases and entry counts are folded into the target and the
    /// source is deleted. Nothing is written unless the whole merge commits.
    pub async fn merge_concepts(&self, source_id: &str, target_id: &str) -> Result<Concept> {
        if source_id == target_id {
            return Err(Error::validation(format!(
                "cannot merge concept '{}' into itself",
                source_id
            )));
        }

        let located = self.require_concept(source_id).await?;
        let _guard = self.locks.acquire(LockScope::graph(&located.owner_id)).await;

        let source = self.require_concept(source_id).await?;
        let mut target = self.require_concept(target_id).await?;
        if source.owner_id != target.owner_id {
            return Err(Error::validation(format!(
                "concepts '{}' and '{}' belong to different owners",
                source_id, target_id
            )));
        }

        let now = self.clock.now();
        let source_edges = self.repository.list_relationships_for(source_id).await?;
        let mut edges: BTreeMap<RelationshipKey, Relationship> = self
            .repository
            .list_relationships_for(target_id)
            .await?
            .into_iter()
            .map(|r| (r.key(), r))
            .collect();

        let mut changes = GraphChanges::new(&source.owner_id);
        let mut changed: BTreeSet<RelationshipKey> = BTreeSet::new();
        let mut neighbors: BTreeSet<String> = BTreeSet::new();
        let mut dropped_self_loops = 0usize;

        for edge in &source_edges {
            changes.delete_relationship(edge.key());

            let other = edge.other_end(source_id);
            if other == target_id {
                dropped_self_loops += 1;
                continue;
            }
            neighbors.insert(other.to_string());

            let mut moved = edge.clone();
            if moved.source_id == source_id {
                moved.source_id = target_id.to_string();
            } else {
                moved.target_id = target_id.to_string();
            }
            moved.updated_at = now;

            let key = moved.key();
            match edges.get_mut(&key) {
                Some(existing) => {
                    if moved.strength > existing.strength {
                        existing.strength = moved.strength;
                        existing.updated_at = now;
                        changed.insert(key);
                    }
                }
                None => {
                    edges.insert(key.clone(), moved);
                    changed.insert(key);
                }
            }
        }

        for key in &changed {
            if let Some(edge) = edges.get(key) {
                changes.upsert_relationship(edge.clone());
            }
        }

        for neighbor_id in &neighbors {
            if let Some(mut neighbor) = self.repository.get_concept(neighbor_id).await? {
                neighbor.touch(now);
                changes.upsert_concept(neighbor);
            }
        }

        let aliases_before = target.aliases.len();
        for alias in &source.aliases {
            if !target.is_known_as(alias) {
                target.add_alias(alias);
            }
        }
        if !target.is_known_as(&source.name) {
            target.add_alias(&source.name);
        }
        target.entry_count += source.entry_count;
        target.touch(now);

        changes.upsert_concept(target.clone());
        changes.delete_concept(source_id);
        self.repository.commit(changes).await?;

        info!(
            source_id = %source_id,
            target_id = %target_id,
            edges_moved = changed.len(),
            edges_removed = source_edges.len(),
            self_loops_dropped = dropped_self_loops,
            aliases_added = target.aliases.len() - aliases_before,
            "Concepts merged"
        );
        Ok(target)
    }
}
