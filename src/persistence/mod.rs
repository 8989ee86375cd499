//! Persistence layer modules.

pub mod agent_repo;
pub mod db;
pub mod item_repo;
pub mod lock_repo;
pub mod queue_repo;
pub mod schema;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;
