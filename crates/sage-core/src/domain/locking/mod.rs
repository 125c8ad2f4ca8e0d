//! Keyed locking for serialized mutations
//!
//! Graph edits and merges are serialized per owner, session creation per
//! owner, and review responses per `(session, entry)` pair. Reads never lock.
//!
//! # Example
//!
//! ```ignore
//! use sage_core::domain::locking::{LockManager, LockScope};
//!
//! let manager = LockManager::new();
//! let _guard = manager.acquire(LockScope::graph(owner_id)).await;
//! // mutate the owner's graph...
//! // lock is released when the guard is dropped
//! ```

pub mod guard;
pub mod manager;
pub mod types;

pub use guard::LockGuard;
pub use manager::LockManager;
pub use types::LockScope;
