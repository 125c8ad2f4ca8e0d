//! Domain layer
//!
//! - `graph`: concepts, relationships, traversal and merge
//! - `review`: knowledge entries, scheduling and review sessions
//! - `locking`: keyed locks that serialize mutations

pub mod graph;
pub mod locking;
pub mod review;
