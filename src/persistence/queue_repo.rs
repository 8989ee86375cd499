//! Per-segment queue registry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::clock::to_db_timestamp;
use crate::Result;

use super::db::Database;

/// Repository for queue records (one per segment).
#[derive(Clone)]
pub struct QueueRepo {
    db: Arc<Database>,
}

impl QueueRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Return the id of the queue for `segment`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if a statement fails.
    pub async fn resolve_or_create(&self, segment: &str, now: DateTime<Utc>) -> Result<String> {
        sqlx::query(
            "INSERT INTO queue (id, segment, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(segment) DO NOTHING",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(segment)
        .bind(to_db_timestamp(now))
        .execute(self.db.as_ref())
        .await?;

        let id: String = sqlx::query_scalar("SELECT id FROM queue WHERE segment = ?1")
            .bind(segment)
            .fetch_one(self.db.as_ref())
            .await?;
        Ok(id)
    }

    /// Look up the queue id for `segment` without creating it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_by_segment(&self, segment: &str) -> Result<Option<String>> {
        let id: Option<String> = sqlx::query_scalar("SELECT id FROM queue WHERE segment = ?1")
            .bind(segment)
            .fetch_optional(self.db.as_ref())
            .await?;
        Ok(id)
    }
}
