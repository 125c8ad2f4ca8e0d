//! Review persistence backends

mod memory;
mod sqlite;

pub use memory::{InMemoryKnowledgeEntryRepository, InMemoryReviewSessionRepository};
pub use sqlite::{SqliteKnowledgeEntryRepository, SqliteReviewSessionRepository};
