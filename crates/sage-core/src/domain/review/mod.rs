//! Spaced-repetition review engine
//!
//! - [`ReviewScheduler`]: which entries are due, and how a response moves an
//!   entry's retention score and next review time
//! - [`ReviewSessionManager`]: the Active → Completed lifecycle of a batch of
//!   reviews, calling the scheduler for every recorded response

pub mod entry;
pub mod manager;
pub mod repository;
pub mod scheduler;
pub mod session;

pub use entry::{KnowledgeEntry, ReviewResponse};
pub use manager::ReviewSessionManager;
pub use repository::{KnowledgeEntryRepository, ReviewSessionRepository};
pub use scheduler::{MAX_INTERVAL_DAYS, MIN_INTERVAL_DAYS, ReviewScheduler, ScheduleUpdate, schedule};
pub use session::{ReviewItem, ReviewSession, ReviewStats, SessionStatus};
