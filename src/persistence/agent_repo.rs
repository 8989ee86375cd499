//! Agent directory and role preference repository.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::clock::to_db_timestamp;
use crate::models::agent::{Agent, AgentPreference};
use crate::{AppError, Result};

use super::db::Database;

/// Repository for agents and their per-role routing preferences.
#[derive(Clone)]
pub struct AgentRepo {
    db: Arc<Database>,
}

#[derive(sqlx::FromRow)]
struct AgentRow {
    id: String,
    role_key: String,
    display_name: String,
    contact: Option<String>,
}

impl From<AgentRow> for Agent {
    fn from(row: AgentRow) -> Self {
        Self {
            id: row.id,
            role_key: row.role_key,
            display_name: row.display_name,
            contact: row.contact,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PreferenceRow {
    role_key: String,
    primary_segments: String,
    fallback_segments: String,
    pickup_statuses: String,
    active_statuses: String,
    accept_status: String,
    return_status: String,
    max_in_progress_minutes: i64,
}

fn parse_list(raw: &str, column: &str) -> Result<Vec<String>> {
    serde_json::from_str(raw).map_err(|e| AppError::Db(format!("invalid {column}: {e}")))
}

fn list_text(values: &[String]) -> Result<String> {
    serde_json::to_string(values).map_err(|e| AppError::Db(format!("serialize list: {e}")))
}

impl PreferenceRow {
    fn into_preference(self) -> Result<AgentPreference> {
        Ok(AgentPreference {
            primary_segments: parse_list(&self.primary_segments, "primary_segments")?,
            fallback_segments: parse_list(&self.fallback_segments, "fallback_segments")?,
            pickup_statuses: parse_list(&self.pickup_statuses, "pickup_statuses")?,
            active_statuses: parse_list(&self.active_statuses, "active_statuses")?,
            role_key: self.role_key,
            accept_status: self.accept_status,
            return_status: self.return_status,
            max_in_progress_minutes: self.max_in_progress_minutes,
        })
    }
}

impl AgentRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or replace an agent record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the statement fails.
    pub async fn upsert_agent(&self, agent: &Agent, now: DateTime<Utc>) -> Result<Agent> {
        sqlx::query(
            "INSERT INTO agent (id, role_key, display_name, contact, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                 role_key = excluded.role_key,
                 display_name = excluded.display_name,
                 contact = excluded.contact,
                 updated_at = excluded.updated_at",
        )
        .bind(&agent.id)
        .bind(&agent.role_key)
        .bind(&agent.display_name)
        .bind(&agent.contact)
        .bind(to_db_timestamp(now))
        .execute(self.db.as_ref())
        .await?;

        Ok(agent.clone())
    }

    /// Retrieve an agent by ID.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_agent(&self, id: &str) -> Result<Option<Agent>> {
        let row: Option<AgentRow> = sqlx::query_as(
            "SELECT id, role_key, display_name, contact FROM agent WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(self.db.as_ref())
        .await?;

        Ok(row.map(Agent::from))
    }

    /// Insert or replace the preference for a role.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the statement fails.
    pub async fn upsert_preference(
        &self,
        preference: &AgentPreference,
        now: DateTime<Utc>,
    ) -> Result<AgentPreference> {
        sqlx::query(
            "INSERT INTO agent_preference (role_key, primary_segments, fallback_segments,
             pickup_statuses, active_statuses, accept_status, return_status,
             max_in_progress_minutes, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(role_key) DO UPDATE SET
                 primary_segments = excluded.primary_segments,
                 fallback_segments = excluded.fallback_segments,
                 pickup_statuses = excluded.pickup_statuses,
                 active_statuses = excluded.active_statuses,
                 accept_status = excluded.accept_status,
                 return_status = excluded.return_status,
                 max_in_progress_minutes = excluded.max_in_progress_minutes,
                 updated_at = excluded.updated_at",
        )
        .bind(&preference.role_key)
        .bind(list_text(&preference.primary_segments)?)
        .bind(list_text(&preference.fallback_segments)?)
        .bind(list_text(&preference.pickup_statuses)?)
        .bind(list_text(&preference.active_statuses)?)
        .bind(&preference.accept_status)
        .bind(&preference.return_status)
        .bind(preference.max_in_progress_minutes)
        .bind(to_db_timestamp(now))
        .execute(self.db.as_ref())
        .await?;

        Ok(preference.clone())
    }

    /// Retrieve the preference for a role.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_preference(&self, role_key: &str) -> Result<Option<AgentPreference>> {
        let row: Option<PreferenceRow> = sqlx::query_as(
            "SELECT role_key, primary_segments, fallback_segments, pickup_statuses,
                    active_statuses, accept_status, return_status, max_in_progress_minutes
             FROM agent_preference WHERE role_key = ?1",
        )
        .bind(role_key)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(PreferenceRow::into_preference).transpose()
    }
}
