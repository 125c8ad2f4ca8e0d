//! Dense adjacency index over one owner's graph snapshot
//!
//! Concept ids are sorted and mapped to positions `0..n`; adjacency lists are
//! sorted by `(neighbor position, relationship type)`. Every walk keeps a
//! visited bitmap and a hop bound, so cycles never prevent termination, and
//! iteration order (hence every tie-break) is deterministic.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};

use super::concept::Concept;
use super::relationship::RelationshipType;
use super::repository::GraphSnapshot;

/// One half of a directed edge as seen from one endpoint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adjacent {
    /// Position of the concept on the other end
    pub node: usize,
    pub relationship_type: RelationshipType,
    pub strength: f64,
}

/// Which way a walk follows edges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Source to target
    Outgoing,
    /// Target to source
    Incoming,
}

/// Edge filter applied during a walk
#[derive(Debug, Clone, Default)]
pub struct EdgeFilter<'a> {
    pub types: Option<&'a [RelationshipType]>,
    pub min_strength: Option<f64>,
}

impl EdgeFilter<'_> {
    fn allows(&self, edge: &Adjacent) -> bool {
        if let Some(types) = self.types {
            if !types.contains(&edge.relationship_type) {
                return false;
            }
        }
        match self.min_strength {
            Some(min) => edge.strength >= min,
            None => true,
        }
    }
}

/// A node reached by [`GraphIndex::related`] and the edge that reached it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reached {
    pub node: usize,
    pub relationship_type: RelationshipType,
    pub strength: f64,
    pub hops: usize,
}

/// A path as positions; `edges[i]` leads from `nodes[i]` to `nodes[i + 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct IndexPath {
    pub nodes: Vec<usize>,
    pub edges: Vec<Adjacent>,
}

#[derive(Debug, Clone, Default)]
pub struct GraphIndex {
    concepts: Vec<Concept>,
    positions: HashMap<String, usize>,
    outgoing: Vec<Vec<Adjacent>>,
    incoming: Vec<Vec<Adjacent>>,
}

impl GraphIndex {
    /// Build the index; edges whose endpoints are not in the snapshot are skipped
    pub fn build(snapshot: GraphSnapshot) -> Self {
        let mut concepts = snapshot.concepts;
        concepts.sort_by(|a, b| a.id.cmp(&b.id));

        let positions: HashMap<String, usize> = concepts
            .iter()
            .enumerate()
            .map(|(pos, c)| (c.id.clone(), pos))
            .collect();

        let mut outgoing = vec![Vec::new(); concepts.len()];
        let mut incoming = vec![Vec::new(); concepts.len()];
        for rel in &snapshot.relationships {
            let (Some(&source), Some(&target)) =
                (positions.get(&rel.source_id), positions.get(&rel.target_id))
            else {
                continue;
            };
            outgoing[source].push(Adjacent {
                node: target,
                relationship_type: rel.relationship_type,
                strength: rel.strength,
            });
            incoming[target].push(Adjacent {
                node: source,
                relationship_type: rel.relationship_type,
                strength: rel.strength,
            });
        }
        for list in outgoing.iter_mut().chain(incoming.iter_mut()) {
            list.sort_by(|a, b| {
                a.node
                    .cmp(&b.node)
                    .then(a.relationship_type.cmp(&b.relationship_type))
            });
        }

        Self {
            concepts,
            positions,
            outgoing,
            incoming,
        }
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn concept(&self, pos: usize) -> &Concept {
        &self.concepts[pos]
    }

    pub fn concepts(&self) -> &[Concept] {
        &self.concepts
    }

    pub fn outgoing(&self, pos: usize) -> &[Adjacent] {
        &self.outgoing[pos]
    }

    pub fn incoming(&self, pos: usize) -> &[Adjacent] {
        &self.incoming[pos]
    }

    /// Incoming plus outgoing edge count
    pub fn degree(&self, pos: usize) -> usize {
        self.outgoing[pos].len() + self.incoming[pos].len()
    }

    /// Mean strength over all incident edges, 0 when there are none
    pub fn average_strength(&self, pos: usize) -> f64 {
        let degree = self.degree(pos);
        if degree == 0 {
            return 0.0;
        }
        let total: f64 = self.outgoing[pos]
            .iter()
            .chain(self.incoming[pos].iter())
            .map(|e| e.strength)
            .sum();
        total / degree as f64
    }

    /// Level-by-level expansion along outgoing edges up to `depth` hops.
    ///
    /// Each node is reported once, at its shortest hop distance. When several
    /// edges reach a node in the same level, the strongest one is kept (first
    /// in adjacency order on equal strength). The start node is never reported.
    pub fn related(&self, start: usize, depth: usize, filter: &EdgeFilter<'_>) -> Vec<Reached> {
        let mut visited = vec![false; self.len()];
        visited[start] = true;

        let mut frontier = vec![start];
        let mut found = Vec::new();

        for hops in 1..=depth {
            let mut level: HashMap<usize, Reached> = HashMap::new();
            for &node in &frontier {
                for edge in &self.outgoing[node] {
                    if visited[edge.node] || !filter.allows(edge) {
                        continue;
                    }
                    let candidate = Reached {
                        node: edge.node,
                        relationship_type: edge.relationship_type,
                        strength: edge.strength,
                        hops,
                    };
                    match level.entry(edge.node) {
                        Entry::Vacant(slot) => {
                            slot.insert(candidate);
                        }
                        Entry::Occupied(mut slot) => {
                            if candidate.strength > slot.get().strength {
                                slot.insert(candidate);
                            }
                        }
                    }
                }
            }
            if level.is_empty() {
                break;
            }

            let mut reached: Vec<Reached> = level.into_values().collect();
            reached.sort_by_key(|r| r.node);
            frontier = reached.iter().map(|r| r.node).collect();
            for r in &reached {
                visited[r.node] = true;
            }
            found.extend(reached);
        }

        found
    }

    /// Fewest-edge path from `source` to `target` of at most `max_depth` edges.
    ///
    /// Neighbors are expanded in ascending position order, so among paths of
    /// equal length the one discovered first wins.
    pub fn shortest_path(
        &self,
        source: usize,
        target: usize,
        max_depth: usize,
        filter: &EdgeFilter<'_>,
    ) -> Option<IndexPath> {
        if source == target {
            return Some(IndexPath {
                nodes: vec![source],
                edges: Vec::new(),
            });
        }

        let mut parent: Vec<Option<(usize, Adjacent)>> = vec![None; self.len()];
        let mut depth = vec![0usize; self.len()];
        let mut visited = vec![false; self.len()];
        visited[source] = true;

        let mut queue = VecDeque::from([source]);
        while let Some(node) = queue.pop_front() {
            if depth[node] >= max_depth {
                continue;
            }
            for edge in &self.outgoing[node] {
                if visited[edge.node] || !filter.allows(edge) {
                    continue;
                }
                visited[edge.node] = true;
                parent[edge.node] = Some((node, *edge));
                depth[edge.node] = depth[node] + 1;

                if edge.node == target {
                    return Some(self.unwind(&parent, target));
                }
                queue.push_back(edge.node);
            }
        }

        None
    }

    fn unwind(&self, parent: &[Option<(usize, Adjacent)>], target: usize) -> IndexPath {
        let mut nodes = vec![target];
        let mut edges = Vec::new();
        let mut current = target;
        while let Some((prev, edge)) = parent[current] {
            edges.push(edge);
            nodes.push(prev);
            current = prev;
        }
        nodes.reverse();
        edges.reverse();
        IndexPath { nodes, edges }
    }

    /// Breadth-first walk over hierarchical edges (`part_of`, `prerequisite_of`).
    ///
    /// Returns positions in discovery order, excluding `start`.
    pub fn hierarchy_walk(&self, start: usize, direction: Direction, depth: usize) -> Vec<usize> {
        let mut visited = vec![false; self.len()];
        visited[start] = true;

        let mut order = Vec::new();
        let mut frontier = vec![start];
        for _ in 0..depth {
            let mut next = Vec::new();
            for &node in &frontier {
                let edges = match direction {
                    Direction::Outgoing => &self.outgoing[node],
                    Direction::Incoming => &self.incoming[node],
                };
                for edge in edges {
                    if !edge.relationship_type.is_hierarchical() || visited[edge.node] {
                        continue;
                    }
                    visited[edge.node] = true;
                    order.push(edge.node);
                    next.push(edge.node);
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::{NewConcept, Relationship};
    use chrono::Utc;

    fn snapshot(ids: &[&str], edges: &[(&str, &str, RelationshipType, f64)]) -> GraphSnapshot {
        let now = Utc::now();
        GraphSnapshot {
            owner_id: "u-1".into(),
            concepts: ids
                .iter()
                .map(|id| Concept::new(*id, NewConcept::new("u-1", id.to_uppercase()), now).unwrap())
                .collect(),
            relationships: edges
                .iter()
                .map(|(s, t, ty, st)| Relationship::new(*s, *t, *ty, *st, now).unwrap())
                .collect(),
        }
    }

    use RelationshipType::*;

    #[test]
    fn test_positions_follow_sorted_ids() {
        let index = GraphIndex::build(snapshot(&["c", "a", "b"], &[]));
        assert_eq!(index.position("a"), Some(0));
        assert_eq!(index.position("c"), Some(2));
        assert_eq!(index.concept(1).id, "b");
        assert_eq!(index.position("zz"), None);
    }

    #[test]
    fn test_related_keeps_shortest_distance() {
        // a -> b -> c and a -> c: c must be reported at hop 1
        let index = GraphIndex::build(snapshot(
            &["a", "b", "c"],
            &[
                ("a", "b", RelatedTo, 0.9),
                ("b", "c", RelatedTo, 1.0),
                ("a", "c", RelatedTo, 0.1),
            ],
        ));
        let found = index.related(0, 3, &EdgeFilter::default());
        let c = found.iter().find(|r| r.node == 2).unwrap();
        assert_eq!(c.hops, 1);
        assert_eq!(c.strength, 0.1);
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_related_respects_filters_and_cycles() {
        let index = GraphIndex::build(snapshot(
            &["a", "b", "c"],
            &[
                ("a", "b", BuildsOn, 0.8),
                ("b", "a", BuildsOn, 0.8),
                ("b", "c", PartOf, 0.3),
            ],
        ));
        let types = [BuildsOn];
        let filter = EdgeFilter {
            types: Some(&types),
            min_strength: None,
        };
        let found = index.related(0, 10, &filter);
        assert_eq!(found.iter().map(|r| r.node).collect::<Vec<_>>(), vec![1]);

        let filter = EdgeFilter {
            types: None,
            min_strength: Some(0.5),
        };
        assert_eq!(index.related(0, 10, &filter).len(), 1);
    }

    #[test]
    fn test_shortest_path_prefers_fewest_edges() {
        let index = GraphIndex::build(snapshot(
            &["a", "b", "c", "d"],
            &[
                ("a", "b", RelatedTo, 1.0),
                ("b", "c", RelatedTo, 1.0),
                ("c", "d", RelatedTo, 1.0),
                ("a", "d", RelatedTo, 0.1),
            ],
        ));
        let path = index
            .shortest_path(0, 3, 6, &EdgeFilter::default())
            .unwrap();
        assert_eq!(path.nodes, vec![0, 3]);
        assert_eq!(path.edges.len(), 1);
    }

    #[test]
    fn test_shortest_path_tie_breaks_by_lowest_id() {
        // a -> c -> d and a -> b -> d: the route through b is discovered first
        let index = GraphIndex::build(snapshot(
            &["a", "b", "c", "d"],
            &[
                ("a", "c", RelatedTo, 1.0),
                ("a", "b", RelatedTo, 1.0),
                ("c", "d", RelatedTo, 1.0),
                ("b", "d", RelatedTo, 1.0),
            ],
        ));
        let path = index
            .shortest_path(0, 3, 6, &EdgeFilter::default())
            .unwrap();
        assert_eq!(path.nodes, vec![0, 1, 3]);
    }

    #[test]
    fn test_shortest_path_honors_max_depth_on_cycles() {
        let index = GraphIndex::build(snapshot(
            &["a", "b", "c"],
            &[
                ("a", "b", RelatedTo, 1.0),
                ("b", "a", RelatedTo, 1.0),
                ("b", "c", RelatedTo, 1.0),
            ],
        ));
        assert!(index.shortest_path(0, 2, 1, &EdgeFilter::default()).is_none());
        assert_eq!(
            index
                .shortest_path(0, 2, 2, &EdgeFilter::default())
                .unwrap()
                .nodes,
            vec![0, 1, 2]
        );
        assert!(index.shortest_path(2, 0, 6, &EdgeFilter::default()).is_none());
    }

    #[test]
    fn test_hierarchy_walk_both_directions() {
        // wheel part_of car part_of fleet; car related_to road
        let index = GraphIndex::build(snapshot(
            &["car", "fleet", "road", "wheel"],
            &[
                ("wheel", "car", PartOf, 1.0),
                ("car", "fleet", PartOf, 1.0),
                ("car", "road", RelatedTo, 1.0),
                ("fleet", "wheel", PartOf, 1.0),
            ],
        ));
        let car = index.position("car").unwrap();
        let wheel = index.position("wheel").unwrap();
        let fleet = index.position("fleet").unwrap();

        assert_eq!(index.hierarchy_walk(car, Direction::Outgoing, 5), vec![fleet, wheel]);
        assert_eq!(index.hierarchy_walk(car, Direction::Incoming, 5), vec![wheel, fleet]);
        assert_eq!(index.hierarchy_walk(car, Direction::Outgoing, 1), vec![fleet]);
    }

    #[test]
    fn test_degree_and_average_strength() {
        let index = GraphIndex::build(snapshot(
            &["a", "b", "c"],
            &[("a", "b", RelatedTo, 0.4), ("c", "a", RelatedTo, 0.8)],
        ));
        assert_eq!(index.degree(0), 2);
        assert!((index.average_strength(0) - 0.6).abs() < 1e-9);
        assert_eq!(index.average_strength(2), 0.8);

        let lonely = GraphIndex::build(snapshot(&["x"], &[]));
        assert_eq!(lonely.degree(0), 0);
        assert_eq!(lonely.average_strength(0), 0.0);
    }
}
