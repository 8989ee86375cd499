//! Queue item repository for `SQLite` persistence.
//!
//! Items carry an optimistic `version`. The only write path after insert is
//! [`ItemRepo::compare_and_swap`], which applies a precomputed next state
//! only while the stored version still equals the expected one.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::clock::{from_db_timestamp, to_db_timestamp};
use crate::models::item::{HandoffPlan, ItemStateEntry, QueueItem};
use crate::{AppError, Result};

use super::db::Database;

/// Repository wrapper around `SQLite` for queue items and their history.
#[derive(Clone)]
pub struct ItemRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct ItemRow {
    id: String,
    source_id: String,
    segment: String,
    status_code: String,
    priority: i64,
    version: i64,
    assigned_agent: Option<String>,
    payload: String,
    metadata: String,
    handoff_plan: Option<String>,
    created_at: String,
    updated_at: String,
}

impl ItemRow {
    /// Convert a database row into the domain model.
    fn into_item(self) -> Result<QueueItem> {
        let payload: Value = serde_json::from_str(&self.payload)
            .map_err(|e| AppError::Db(format!("invalid payload: {e}")))?;
        let metadata: Value = serde_json::from_str(&self.metadata)
            .map_err(|e| AppError::Db(format!("invalid metadata: {e}")))?;
        let handoff_plan: Option<HandoffPlan> = self
            .handoff_plan
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| AppError::Db(format!("invalid handoff_plan: {e}")))?;

        Ok(QueueItem {
            id: self.id,
            source_id: self.source_id,
            segment: self.segment,
            status_code: self.status_code,
            priority: self.priority,
            version: self.version,
            assigned_agent: self.assigned_agent,
            payload,
            metadata,
            handoff_plan,
            created_at: from_db_timestamp(&self.created_at, "created_at")?,
            updated_at: from_db_timestamp(&self.updated_at, "updated_at")?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct StateRow {
    item_id: String,
    version: i64,
    status_code: String,
    segment: String,
    actor: Option<String>,
    note: Option<String>,
    created_at: String,
}

impl StateRow {
    fn into_entry(self) -> Result<ItemStateEntry> {
        Ok(ItemStateEntry {
            item_id: self.item_id,
            version: self.version,
            status_code: self.status_code,
            segment: self.segment,
            actor: self.actor,
            note: self.note,
            created_at: from_db_timestamp(&self.created_at, "created_at")?,
        })
    }
}

/// Filter for the candidate scan used by the claim coordinator.
#[derive(Debug, Clone)]
pub struct CandidateFilter<'a> {
    /// Segment to scan.
    pub segment: &'a str,
    /// Statuses that make an item claimable.
    pub pickup_statuses: &'a [String],
    /// Statuses that exclude an item even if listed as pickup.
    pub excluded_statuses: &'a [String],
    /// Minimum priority, when set.
    pub priority_floor: Option<i64>,
    /// Items already attempted in this call.
    pub exclude_ids: &'a [String],
    /// Page size.
    pub limit: u32,
}

fn to_json_text(value: &Value, field: &str) -> Result<String> {
    serde_json::to_string(value).map_err(|e| AppError::Db(format!("serialize {field}: {e}")))
}

fn plan_text(plan: Option<&HandoffPlan>) -> Result<Option<String>> {
    plan.map(serde_json::to_string)
        .transpose()
        .map_err(|e| AppError::Db(format!("serialize handoff_plan: {e}")))
}

fn list_text(values: &[String]) -> Result<String> {
    serde_json::to_string(values).map_err(|e| AppError::Db(format!("serialize list: {e}")))
}

async fn insert_state(
    conn: &mut sqlx::SqliteConnection,
    entry: &ItemStateEntry,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO queue_item_state (item_id, version, status_code, segment, actor, note, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(&entry.item_id)
    .bind(entry.version)
    .bind(&entry.status_code)
    .bind(&entry.segment)
    .bind(&entry.actor)
    .bind(&entry.note)
    .bind(to_db_timestamp(entry.created_at))
    .execute(conn)
    .await?;
    Ok(())
}

impl ItemRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new item together with its first history entry.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Conflict` if `source_id` is already taken, or
    /// `AppError::Db` if the insert fails.
    pub async fn insert(&self, item: &QueueItem, entry: &ItemStateEntry) -> Result<QueueItem> {
        let payload = to_json_text(&item.payload, "payload")?;
        let metadata = to_json_text(&item.metadata, "metadata")?;
        let plan = plan_text(item.handoff_plan.as_ref())?;

        let mut tx = self.db.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO queue_item (id, source_id, segment, status_code, priority, version,
             assigned_agent, payload, metadata, handoff_plan, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )
        .bind(&item.id)
        .bind(&item.source_id)
        .bind(&item.segment)
        .bind(&item.status_code)
        .bind(item.priority)
        .bind(item.version)
        .bind(&item.assigned_agent)
        .bind(&payload)
        .bind(&metadata)
        .bind(&plan)
        .bind(to_db_timestamp(item.created_at))
        .bind(to_db_timestamp(item.updated_at))
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Err(AppError::Conflict(format!(
                    "source_id '{}' already registered",
                    item.source_id
                )));
            }
            Err(err) => return Err(err.into()),
        }

        insert_state(&mut tx, entry).await?;
        tx.commit().await?;
        Ok(item.clone())
    }

    /// Retrieve an item by its ID.
    ///
    /// Returns `Ok(None)` if the item does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<QueueItem>> {
        let row: Option<ItemRow> = sqlx::query_as("SELECT * FROM queue_item WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.db.as_ref())
            .await?;

        row.map(ItemRow::into_item).transpose()
    }

    /// Whether an item with `source_id` exists.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn source_exists(&self, source_id: &str) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM queue_item WHERE source_id = ?1")
                .bind(source_id)
                .fetch_optional(self.db.as_ref())
                .await?;
        Ok(found.is_some())
    }

    /// Committed history of an item, ascending by version.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn history(&self, item_id: &str) -> Result<Vec<ItemStateEntry>> {
        let rows: Vec<StateRow> = sqlx::query_as(
            "SELECT item_id, version, status_code, segment, actor, note, created_at
             FROM queue_item_state
             WHERE item_id = ?1
             ORDER BY version ASC",
        )
        .bind(item_id)
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(StateRow::into_entry).collect()
    }

    /// Replace the item with `next` if the stored version still equals
    /// `expected_version`, bumping the version and appending `entry`.
    ///
    /// `next.version` is ignored; the stored version becomes
    /// `expected_version + 1`. Returns `false` when the guard failed
    /// (item missing or version moved); nothing is written in that case.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if a statement fails.
    pub async fn compare_and_swap(
        &self,
        next: &QueueItem,
        expected_version: i64,
        entry: &ItemStateEntry,
    ) -> Result<bool> {
        let payload = to_json_text(&next.payload, "payload")?;
        let metadata = to_json_text(&next.metadata, "metadata")?;

        let mut tx = self.db.begin().await?;
        let result = sqlx::query(
            "UPDATE queue_item
             SET segment = ?1, status_code = ?2, assigned_agent = ?3, payload = ?4,
                 metadata = ?5, updated_at = ?6, version = version + 1
             WHERE id = ?7 AND version = ?8",
        )
        .bind(&next.segment)
        .bind(&next.status_code)
        .bind(&next.assigned_agent)
        .bind(&payload)
        .bind(&metadata)
        .bind(to_db_timestamp(next.updated_at))
        .bind(&next.id)
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        insert_state(&mut tx, entry).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Oldest unlocked items in a segment matching `filter`.
    ///
    /// Items under a live item-scope lease at `now` are skipped. Ordering is
    /// creation time ascending with insertion order breaking ties.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_candidates(
        &self,
        filter: &CandidateFilter<'_>,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueItem>> {
        let rows: Vec<ItemRow> = sqlx::query_as(
            "SELECT i.* FROM queue_item i
             WHERE i.segment = ?1
               AND i.status_code IN (SELECT value FROM json_each(?2))
               AND i.status_code NOT IN (SELECT value FROM json_each(?3))
               AND (?4 IS NULL OR i.priority >= ?4)
               AND i.id NOT IN (SELECT value FROM json_each(?5))
               AND NOT EXISTS (
                   SELECT 1 FROM queue_lock l
                   WHERE l.scope = 'item' AND l.target_id = i.id AND l.expires_at > ?6
               )
             ORDER BY i.created_at ASC, i.rowid ASC
             LIMIT ?7",
        )
        .bind(filter.segment)
        .bind(list_text(filter.pickup_statuses)?)
        .bind(list_text(filter.excluded_statuses)?)
        .bind(filter.priority_floor)
        .bind(list_text(filter.exclude_ids)?)
        .bind(to_db_timestamp(now))
        .bind(i64::from(filter.limit))
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(ItemRow::into_item).collect()
    }
}
