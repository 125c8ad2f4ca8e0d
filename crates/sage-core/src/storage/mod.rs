//! Storage layer - SQLite
//!
//! - `database`: Connection pool management and initialization
//! - `migrations`: Schema versioning and automatic migration
//!
//! ```ignore
//! use sage_core::storage::Database;
//!
//! let db = Database::in_memory().await?;
//! let graph = SqliteGraphRepository::new(db.pool().clone());
//! ```

pub mod database;
pub mod migrations;

pub use database::{Database, DatabaseConfig, default_database_path};
pub use migrations::{CURRENT_VERSION, MigrationStatus, migration_status, run_migrations};
