//! Agent identity and per-role routing preferences.

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// A worker (human or automated).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Agent {
    /// Unique agent identifier.
    pub id: String,
    /// Role used to resolve preferences and capabilities.
    pub role_key: String,
    /// Human-readable name.
    pub display_name: String,
    /// Optional contact handle.
    #[serde(default)]
    pub contact: Option<String>,
}

impl Agent {
    /// Reject blank identifiers.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` when `id` or `role_key` is blank.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(AppError::Validation("agent id must not be blank".into()));
        }
        if self.role_key.trim().is_empty() {
            return Err(AppError::Validation("role_key must not be blank".into()));
        }
        Ok(())
    }
}

/// Routing policy for every agent sharing a role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentPreference {
    /// Role this policy applies to.
    pub role_key: String,
    /// Segments searched first, in order.
    pub primary_segments: Vec<String>,
    /// Segments searched when no primary segment yields a task.
    #[serde(default)]
    pub fallback_segments: Vec<String>,
    /// Statuses that make an item claimable.
    pub pickup_statuses: Vec<String>,
    /// Statuses meaning "in progress"; never offered for pickup.
    #[serde(default)]
    pub active_statuses: Vec<String>,
    /// Status recommended when accepting.
    pub accept_status: String,
    /// Status applied on release when none is given.
    pub return_status: String,
    /// Item lease TTL while the task is in progress.
    pub max_in_progress_minutes: i64,
}

impl AgentPreference {
    /// Check the policy is usable for claim evaluation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.role_key.trim().is_empty() {
            return Err(AppError::Validation("role_key must not be blank".into()));
        }
        if self.primary_segments.is_empty() {
            return Err(AppError::Validation(
                "primary_segments must not be empty".into(),
            ));
        }
        if self.pickup_statuses.is_empty() {
            return Err(AppError::Validation(
                "pickup_statuses must not be empty".into(),
            ));
        }
        if self.accept_status.trim().is_empty() || self.return_status.trim().is_empty() {
            return Err(AppError::Validation(
                "accept_status and return_status must not be blank".into(),
            ));
        }
        if self.max_in_progress_minutes <= 0 {
            return Err(AppError::Validation(
                "max_in_progress_minutes must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Lease TTL in seconds derived from `max_in_progress_minutes`.
    #[must_use]
    pub fn lease_ttl_seconds(&self) -> i64 {
        self.max_in_progress_minutes.saturating_mul(60)
    }
}
