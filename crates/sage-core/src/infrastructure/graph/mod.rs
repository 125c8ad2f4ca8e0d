//! Concept graph persistence backends

mod memory;
mod sqlite;

pub use memory::InMemoryGraphRepository;
pub use sqlite::SqliteGraphRepository;
