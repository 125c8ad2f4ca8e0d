//! Concept knowledge graph
//!
//! Concepts are the nodes of one user's personal knowledge graph; directed,
//! typed, weighted relationships connect concepts of the same owner.
//!
//! # Components
//!
//! - [`ConceptGraphStore`]: creates, updates and deletes concepts and edges
//! - [`GraphTraversal`]: related concepts, shortest paths, hierarchies, search
//! - [`ConceptMerger`]: folds one concept into another atomically
//!
//! Mutations go through a [`GraphRepository`] as [`GraphChanges`] units of
//! work; queries read a [`GraphSnapshot`] and answer from a [`GraphIndex`].

pub mod concept;
pub mod index;
pub mod merge;
pub mod relationship;
pub mod repository;
pub mod store;
pub mod traversal;

pub use concept::{Concept, ConceptUpdate, NewConcept};
pub use index::GraphIndex;
pub use merge::ConceptMerger;
pub use relationship::{
    DEFAULT_STRENGTH, Relationship, RelationshipKey, RelationshipType, validate_strength,
};
pub use repository::{GraphChanges, GraphRepository, GraphSnapshot};
pub use store::ConceptGraphStore;
pub use traversal::{
    ConceptHierarchy, ConceptPath, ConceptWithStats, GraphTraversal, HierarchyOptions,
    PathOptions, PathRelationship, RelatedConcept, RelatedOptions,
};
