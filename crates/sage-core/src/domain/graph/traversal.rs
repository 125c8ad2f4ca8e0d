//! Read-only graph queries
//!
//! Every query loads one consistent snapshot of the owner's graph, builds a
//! [`GraphIndex`] over it and answers from that index. No query takes a lock.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GraphConfig;
use crate::error::{Error, Result};

use super::concept::Concept;
use super::index::{Direction, EdgeFilter, GraphIndex};
use super::relationship::{RelationshipType, validate_strength};
use super::repository::GraphRepository;

/// Options for [`GraphTraversal::get_related`]
#[derive(Debug, Clone, Default)]
pub struct RelatedOptions {
    pub types: Option<Vec<RelationshipType>>,
    pub depth: Option<usize>,
    pub limit: Option<usize>,
    pub min_strength: Option<f64>,
}

impl RelatedOptions {
    pub fn with_types(mut self, types: Vec<RelationshipType>) -> Self {
        self.types = Some(types);
        self
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_min_strength(mut self, min_strength: f64) -> Self {
        self.min_strength = Some(min_strength);
        self
    }
}

/// Options for [`GraphTraversal::find_path`]
#[derive(Debug, Clone, Default)]
pub struct PathOptions {
    pub max_depth: Option<usize>,
    pub relationship_types: Option<Vec<RelationshipType>>,
}

impl PathOptions {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn with_types(mut self, types: Vec<RelationshipType>) -> Self {
        self.relationship_types = Some(types);
        self
    }
}

/// Options for [`GraphTraversal::get_hierarchy`]
#[derive(Debug, Clone, Default)]
pub struct HierarchyOptions {
    pub ancestor_depth: Option<usize>,
    pub descendant_depth: Option<usize>,
}

/// A concept reached from a start concept, with the edge that reached it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedConcept {
    pub concept: Concept,
    pub relationship_type: RelationshipType,
    pub strength: f64,
}

/// One edge along a [`ConceptPath`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathRelationship {
    pub source_id: String,
    pub target_id: String,
    pub relationship_type: RelationshipType,
    pub strength: f64,
}

/// A directed path between two concepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptPath {
    pub nodes: Vec<Concept>,
    pub relationships: Vec<PathRelationship>,
    /// Number of edges
    pub length: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptHierarchy {
    pub concept: Concept,
    /// Reached against `part_of`/`prerequisite_of` edges, nearest first
    pub ancestors: Vec<Concept>,
    /// Reached along `part_of`/`prerequisite_of` edges, nearest first
    pub descendants: Vec<Concept>,
}

/// A concept with its connectivity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptWithStats {
    pub concept: Concept,
    pub connection_count: usize,
    pub avg_relationship_strength: f64,
}

/// Read-only algorithms over a per-owner graph snapshot
pub struct GraphTraversal<R: GraphRepository> {
    repository: Arc<R>,
    config: GraphConfig,
}

impl<R: GraphRepository> GraphTraversal<R> {
    pub fn new(repository: Arc<R>, config: GraphConfig) -> Self {
        Self { repository, config }
    }

    /// Load the index for the owner of `concept_id`, returning the concept's position
    async fn index_for(&self, concept_id: &str) -> Result<(GraphIndex, usize)> {
        let concept = self
            .repository
            .get_concept(concept_id)
            .await?
            .ok_or_else(|| Error::not_found("Concept", concept_id))?;
        let index = self.index_for_owner(&concept.owner_id).await?;
        // The concept may have been deleted between the lookup and the snapshot
        let pos = index
            .position(concept_id)
            .ok_or_else(|| Error::not_found("Concept", concept_id))?;
        Ok((index, pos))
    }

    async fn index_for_owner(&self, owner_id: &str) -> Result<GraphIndex> {
        let snapshot = self.repository.load_snapshot(owner_id).await?;
        debug!(
            owner_id = %owner_id,
            concepts = snapshot.concepts.len(),
            relationships = snapshot.relationships.len(),
            "Loaded graph snapshot"
        );
        Ok(GraphIndex::build(snapshot))
    }

    /// Concepts reachable along outgoing edges within `depth` hops, strongest first
    pub async fn get_related(
        &self,
        concept_id: &str,
        options: RelatedOptions,
    ) -> Result<Vec<RelatedConcept>> {
        if let Some(min) = options.min_strength {
            validate_strength(min)?;
        }
        let depth = options.depth.unwrap_or(self.config.related_depth);
        let limit = self
            .config
            .effective_limit(options.limit, self.config.max_results);

        let (index, start) = self.index_for(concept_id).await?;
        let filter = EdgeFilter {
            types: options.types.as_deref(),
            min_strength: options.min_strength,
        };

        let mut reached = index.related(start, depth, &filter);
        // Positions follow id order, so ascending position is ascending id
        reached.sort_by(|a, b| b.strength.total_cmp(&a.strength).then(a.node.cmp(&b.node)));
        reached.truncate(limit);

        Ok(reached
            .into_iter()
            .map(|r| RelatedConcept {
                concept: index.concept(r.node).clone(),
                relationship_type: r.relationship_type,
                strength: r.strength,
            })
            .collect())
    }

    /// Shortest directed path, or `None` if none exists within `max_depth` edges
    pub async fn find_path(
        &self,
        source_id: &str,
        target_id: &str,
        options: PathOptions,
    ) -> Result<Option<ConceptPath>> {
        let (index, source) = self.index_for(source_id).await?;
        let target = match index.position(target_id) {
            Some(pos) => pos,
            None => {
                // Present but owned by someone else: unreachable, not missing
                if self.repository.get_concept(target_id).await?.is_some() {
                    return Ok(None);
                }
                return Err(Error::not_found("Concept", target_id));
            }
        };

        let max_depth = options.max_depth.unwrap_or(self.config.path_max_depth);
        let filter = EdgeFilter {
            types: options.relationship_types.as_deref(),
            min_strength: None,
        };

        let Some(path) = index.shortest_path(source, target, max_depth, &filter) else {
            debug!(source_id = %source_id, target_id = %target_id, max_depth, "No path found");
            return Ok(None);
        };

        let relationships = path
            .nodes
            .windows(2)
            .zip(&path.edges)
            .map(|(pair, edge)| PathRelationship {
                source_id: index.concept(pair[0]).id.clone(),
                target_id: index.concept(pair[1]).id.clone(),
                relationship_type: edge.relationship_type,
                strength: edge.strength,
            })
            .collect::<Vec<_>>();

        Ok(Some(ConceptPath {
            length: relationships.len(),
            nodes: path
                .nodes
                .iter()
                .map(|&pos| index.concept(pos).clone())
                .collect(),
            relationships,
        }))
    }

    /// Ancestors and descendants over hierarchical edges
    pub async fn get_hierarchy(
        &self,
        concept_id: &str,
        options: HierarchyOptions,
    ) -> Result<ConceptHierarchy> {
        let (index, pos) = self.index_for(concept_id).await?;
        let ancestor_depth = options.ancestor_depth.unwrap_or(self.config.ancestor_depth);
        let descendant_depth = options
            .descendant_depth
            .unwrap_or(self.config.descendant_depth);

        let collect = |positions: Vec<usize>| -> Vec<Concept> {
            positions
                .into_iter()
                .take(self.config.max_results)
                .map(|p| index.concept(p).clone())
                .collect()
        };

        Ok(ConceptHierarchy {
            concept: index.concept(pos).clone(),
            ancestors: collect(index.hierarchy_walk(pos, Direction::Incoming, ancestor_depth)),
            descendants: collect(index.hierarchy_walk(
                pos,
                Direction::Outgoing,
                descendant_depth,
            )),
        })
    }

    /// Case-insensitive substring search over names and aliases.
    ///
    /// Exact matches on name or alias come first, then alphabetical by name.
    pub async fn find_concepts(
        &self,
        query: &str,
        owner_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Concept>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(Error::validation("search query must not be blank"));
        }
        let limit = self
            .config
            .effective_limit(limit, self.config.search_limit);

        let concepts = self.repository.list_concepts(owner_id).await?;
        let mut matches: Vec<(bool, String, Concept)> = concepts
            .into_iter()
            .filter_map(|c| {
                let name = c.name.to_lowercase();
                let aliases: Vec<String> = c.aliases.iter().map(|a| a.to_lowercase()).collect();
                let hit = name.contains(&needle) || aliases.iter().any(|a| a.contains(&needle));
                if !hit {
                    return None;
                }
                let exact = name == needle || aliases.iter().any(|a| *a == needle);
                Some((!exact, name, c))
            })
            .collect();

        matches.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.id.cmp(&b.2.id))
        });
        matches.truncate(limit);

        Ok(matches.into_iter().map(|(_, _, c)| c).collect())
    }

    /// Most connected concepts of an owner
    pub async fn get_top_concepts(
        &self,
        owner_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ConceptWithStats>> {
        let limit = self.config.effective_limit(limit, self.config.top_limit);
        let index = self.index_for_owner(owner_id).await?;

        let mut ranked: Vec<usize> = (0..index.len()).collect();
        ranked.sort_by(|&a, &b| {
            index
                .degree(b)
                .cmp(&index.degree(a))
                .then(index.concept(b).entry_count.cmp(&index.concept(a).entry_count))
                .then(a.cmp(&b))
        });
        ranked.truncate(limit);

        Ok(ranked
            .into_iter()
            .map(|pos| ConceptWithStats {
                concept: index.concept(pos).clone(),
                connection_count: index.degree(pos),
                avg_relationship_strength: index.average_strength(pos),
            })
            .collect())
    }
}
