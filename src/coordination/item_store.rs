//! Versioned item store.
//!
//! Mutations are compare-and-swap on the item's `version`: the next state is
//! computed from a snapshot taken at `expected_version` and committed only if
//! the stored version is still `expected_version`. Status changes are routed
//! through the handoff engine before commit, so segment and status always
//! change together.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::models::item::{
    merge_patch, Assignment, ItemMutation, ItemStateEntry, ItemWithHistory, QueueItem,
};
use crate::persistence::db::Database;
use crate::persistence::item_repo::{CandidateFilter, ItemRepo};
use crate::validation::normalize_code;
use crate::{AppError, Result};

use super::handoff;

/// Compare-and-swap store over queue items.
#[derive(Clone)]
pub struct ItemStore {
    repo: ItemRepo,
    clock: Arc<dyn Clock>,
}

impl ItemStore {
    /// Build a store over `db`.
    #[must_use]
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo: ItemRepo::new(db),
            clock,
        }
    }

    /// Fetch an item.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the item does not exist.
    pub async fn get(&self, item_id: &str) -> Result<QueueItem> {
        self.repo
            .get_by_id(item_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("item {item_id} not found")))
    }

    /// Fetch an item, returning `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` on persistence failure.
    pub async fn find(&self, item_id: &str) -> Result<Option<QueueItem>> {
        self.repo.get_by_id(item_id).await
    }

    /// Fetch an item with its committed history.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the item does not exist.
    pub async fn get_with_history(&self, item_id: &str) -> Result<ItemWithHistory> {
        let item = self.get(item_id).await?;
        let history = self.repo.history(item_id).await?;
        Ok(ItemWithHistory { item, history })
    }

    /// Whether an item with `source_id` already exists.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` on persistence failure.
    pub async fn source_exists(&self, source_id: &str) -> Result<bool> {
        self.repo.source_exists(source_id).await
    }

    /// Persist a brand-new item and its first history entry.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Conflict` for a duplicate `source_id`.
    pub async fn insert(
        &self,
        item: &QueueItem,
        actor: Option<String>,
        note: Option<String>,
    ) -> Result<QueueItem> {
        let entry = ItemStateEntry {
            item_id: item.id.clone(),
            version: item.version,
            status_code: item.status_code.clone(),
            segment: item.segment.clone(),
            actor,
            note,
            created_at: item.created_at,
        };
        self.repo.insert(item, &entry).await
    }

    /// Oldest unlocked candidates matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` on persistence failure.
    pub async fn candidates(&self, filter: &CandidateFilter<'_>) -> Result<Vec<QueueItem>> {
        self.repo.find_candidates(filter, self.clock.now()).await
    }

    /// Apply `mutation` if the stored version equals `expected_version`.
    ///
    /// On success the returned item carries version `expected_version + 1`.
    /// When the status changes, the handoff plan decides the new segment in
    /// the same commit.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the item does not exist,
    /// `AppError::VersionConflict` if the version moved (before or during
    /// the write), or `AppError::Validation` for a malformed status.
    pub async fn update(
        &self,
        item_id: &str,
        expected_version: i64,
        mutation: ItemMutation,
    ) -> Result<QueueItem> {
        let current = self.get(item_id).await?;
        if current.version != expected_version {
            return Err(version_conflict(item_id, expected_version, current.version));
        }

        let actor = mutation.actor.clone();
        let note = mutation.note.clone();
        let mut next = apply_mutation(&current, mutation)?;
        next.updated_at = self.clock.now();
        next.version = expected_version + 1;

        let entry = ItemStateEntry {
            item_id: next.id.clone(),
            version: next.version,
            status_code: next.status_code.clone(),
            segment: next.segment.clone(),
            actor,
            note,
            created_at: next.updated_at,
        };

        if !self
            .repo
            .compare_and_swap(&next, expected_version, &entry)
            .await?
        {
            return match self.repo.get_by_id(item_id).await? {
                None => Err(AppError::NotFound(format!("item {item_id} not found"))),
                Some(stored) => {
                    debug!(item_id, expected_version, stored = stored.version, "lost update race");
                    Err(version_conflict(item_id, expected_version, stored.version))
                }
            };
        }

        if next.segment == current.segment {
            debug!(item_id, version = next.version, status = %next.status_code, "item updated");
        } else {
            info!(
                item_id,
                version = next.version,
                from_segment = %current.segment,
                to_segment = %next.segment,
                status = %next.status_code,
                "item handed off"
            );
        }
        Ok(next)
    }
}

fn version_conflict(item_id: &str, expected: i64, stored: i64) -> AppError {
    AppError::VersionConflict(format!(
        "item {item_id} is at version {stored}, expected {expected}"
    ))
}

/// Compute the next state of `current` under `mutation` (version untouched).
fn apply_mutation(current: &QueueItem, mutation: ItemMutation) -> Result<QueueItem> {
    let mut next = current.clone();

    if let Some(ref raw) = mutation.status_code {
        let status = normalize_code(raw, "status_code")?;
        if status != current.status_code {
            next.segment = handoff::evaluate(current, &current.status_code, &status);
            next.status_code = status;
        }
    }

    patch_field(
        &mut next.payload,
        mutation.clear_payload,
        mutation.payload.as_ref(),
    );
    patch_field(
        &mut next.metadata,
        mutation.clear_metadata,
        mutation.metadata.as_ref(),
    );

    match mutation.assigned_agent {
        Assignment::Keep => {}
        Assignment::Set(agent) => next.assigned_agent = Some(agent),
        Assignment::Clear => next.assigned_agent = None,
    }

    Ok(next)
}

fn patch_field(field: &mut Value, clear: bool, patch: Option<&Value>) {
    if clear {
        *field = json!({});
    }
    if let Some(patch) = patch {
        merge_patch(field, patch);
    }
}
