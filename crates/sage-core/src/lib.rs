//! Sage Core Library
//!
//! This crate provides the core of a personal knowledge system:
//! - Concept knowledge graph (store, traversal, merge)
//! - Spaced-repetition review scheduling and review sessions
//! - Keyed locking for serialized mutations
//! - Storage (SQLite pool + migrations) and persistence backends
//! - Configuration, clock and identifier capabilities

pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod storage;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::clock::{Clock, IdGenerator, SystemClock, UuidGenerator};
    pub use crate::config::Config;
    pub use crate::domain::graph::{
        Concept, ConceptGraphStore, ConceptMerger, ConceptUpdate, GraphRepository, GraphTraversal,
        NewConcept, Relationship, RelationshipType,
    };
    pub use crate::domain::locking::LockManager;
    pub use crate::domain::review::{
        KnowledgeEntry, KnowledgeEntryRepository, ReviewResponse, ReviewScheduler, ReviewSession,
        ReviewSessionManager, ReviewSessionRepository,
    };
    pub use crate::error::{Error, Result};
}
