//! Lease repository for `SQLite` persistence.
//!
//! Every write here is one conditional statement so that acquisition,
//! release, and the expiry sweep never race through a read-then-write gap.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::clock::{from_db_timestamp, to_db_timestamp};
use crate::models::lock::{Lock, LockScope};
use crate::Result;

use super::db::Database;

/// Repository wrapper around `SQLite` for lease records.
#[derive(Clone)]
pub struct LockRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct LockRow {
    id: String,
    scope: String,
    target_id: String,
    holder: String,
    acquired_at: String,
    expires_at: String,
}

impl LockRow {
    fn into_lock(self) -> Result<Lock> {
        Ok(Lock {
            id: self.id,
            scope: LockScope::from_db_str(&self.scope)?,
            target_id: self.target_id,
            holder: self.holder,
            acquired_at: from_db_timestamp(&self.acquired_at, "acquired_at")?,
            expires_at: from_db_timestamp(&self.expires_at, "expires_at")?,
        })
    }
}

const LOCK_COLUMNS: &str = "id, scope, target_id, holder, acquired_at, expires_at";

impl LockRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or take over the lease on `(scope, target_id)`.
    ///
    /// The upsert only applies when no row exists, the row belongs to
    /// `holder` (renewal), or the row has expired at `now`. Returns `None`
    /// when another holder owns a live lease.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the statement fails.
    pub async fn try_acquire(
        &self,
        scope: LockScope,
        target_id: &str,
        holder: &str,
        token_hash: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Lock>> {
        let row: Option<LockRow> = sqlx::query_as(
            "INSERT INTO queue_lock (id, scope, target_id, holder, token_hash, acquired_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(scope, target_id) DO UPDATE SET
                 id = CASE
                     WHEN queue_lock.holder = excluded.holder THEN queue_lock.id
                     ELSE excluded.id
                 END,
                 acquired_at = CASE
                     WHEN queue_lock.holder = excluded.holder
                          AND queue_lock.expires_at > excluded.acquired_at
                     THEN queue_lock.acquired_at
                     ELSE excluded.acquired_at
                 END,
                 holder = excluded.holder,
                 token_hash = excluded.token_hash,
                 expires_at = excluded.expires_at
             WHERE queue_lock.holder = excluded.holder
                OR queue_lock.expires_at <= excluded.acquired_at
             RETURNING id, scope, target_id, holder, acquired_at, expires_at",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(scope.as_db_str())
        .bind(target_id)
        .bind(holder)
        .bind(token_hash)
        .bind(to_db_timestamp(now))
        .bind(to_db_timestamp(expires_at))
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(LockRow::into_lock).transpose()
    }

    /// Hand the lease on `(scope, target_id)` to `holder` regardless of who
    /// holds it now. The lock id survives when `holder` already owned it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the statement fails.
    pub async fn take_over(
        &self,
        scope: LockScope,
        target_id: &str,
        holder: &str,
        token_hash: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Lock> {
        let row: LockRow = sqlx::query_as(
            "INSERT INTO queue_lock (id, scope, target_id, holder, token_hash, acquired_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(scope, target_id) DO UPDATE SET
                 id = CASE
                     WHEN queue_lock.holder = excluded.holder THEN queue_lock.id
                     ELSE excluded.id
                 END,
                 acquired_at = CASE
                     WHEN queue_lock.holder = excluded.holder
                          AND queue_lock.expires_at > excluded.acquired_at
                     THEN queue_lock.acquired_at
                     ELSE excluded.acquired_at
                 END,
                 holder = excluded.holder,
                 token_hash = excluded.token_hash,
                 expires_at = excluded.expires_at
             RETURNING id, scope, target_id, holder, acquired_at, expires_at",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(scope.as_db_str())
        .bind(target_id)
        .bind(holder)
        .bind(token_hash)
        .bind(to_db_timestamp(now))
        .bind(to_db_timestamp(expires_at))
        .fetch_one(self.db.as_ref())
        .await?;

        row.into_lock()
    }

    /// Delete the live lease matching `token_hash` held by `holder`.
    ///
    /// Returns the released lease, or `None` when nothing matched.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the statement fails.
    pub async fn delete_by_token(
        &self,
        token_hash: &str,
        holder: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Lock>> {
        let row: Option<LockRow> = sqlx::query_as(&format!(
            "DELETE FROM queue_lock
             WHERE token_hash = ?1 AND holder = ?2 AND expires_at > ?3
             RETURNING {LOCK_COLUMNS}"
        ))
        .bind(token_hash)
        .bind(holder)
        .bind(to_db_timestamp(now))
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(LockRow::into_lock).transpose()
    }

    /// Delete the lease on a target, optionally restricted to `holder`.
    ///
    /// Returns `true` when a row was removed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the statement fails.
    pub async fn delete_target(
        &self,
        scope: LockScope,
        target_id: &str,
        holder: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM queue_lock
             WHERE scope = ?1 AND target_id = ?2 AND (?3 IS NULL OR holder = ?3)",
        )
        .bind(scope.as_db_str())
        .bind(target_id)
        .bind(holder)
        .execute(self.db.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete every lease whose expiry is at or before `now`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the statement fails.
    pub async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM queue_lock WHERE expires_at <= ?1")
            .bind(to_db_timestamp(now))
            .execute(self.db.as_ref())
            .await?;

        Ok(result.rows_affected())
    }

    /// Fetch the live lease on a target, if any.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_live(
        &self,
        scope: LockScope,
        target_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Lock>> {
        let row: Option<LockRow> = sqlx::query_as(&format!(
            "SELECT {LOCK_COLUMNS} FROM queue_lock
             WHERE scope = ?1 AND target_id = ?2 AND expires_at > ?3"
        ))
        .bind(scope.as_db_str())
        .bind(target_id)
        .bind(to_db_timestamp(now))
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(LockRow::into_lock).transpose()
    }

    /// List all live leases, soonest expiry first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_live(&self, now: DateTime<Utc>) -> Result<Vec<Lock>> {
        let rows: Vec<LockRow> = sqlx::query_as(&format!(
            "SELECT {LOCK_COLUMNS} FROM queue_lock
             WHERE expires_at > ?1
             ORDER BY expires_at ASC"
        ))
        .bind(to_db_timestamp(now))
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(LockRow::into_lock).collect()
    }
}
