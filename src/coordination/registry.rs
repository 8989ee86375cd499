//! Agent directory and role preferences.

use std::sync::Arc;

use tracing::info;

use crate::clock::Clock;
use crate::models::agent::{Agent, AgentPreference};
use crate::persistence::agent_repo::AgentRepo;
use crate::persistence::db::Database;
use crate::validation::{normalize_code, normalize_codes};
use crate::{AppError, Result};

/// Validated access to agents and their role preferences.
#[derive(Clone)]
pub struct AgentRegistry {
    repo: AgentRepo,
    clock: Arc<dyn Clock>,
}

impl AgentRegistry {
    /// Build a registry over `db`.
    #[must_use]
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo: AgentRepo::new(db),
            clock,
        }
    }

    /// Register or replace an agent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for blank identifiers.
    pub async fn upsert_agent(&self, agent: &Agent) -> Result<Agent> {
        agent.validate()?;
        let agent = Agent {
            id: agent.id.trim().to_owned(),
            role_key: agent.role_key.trim().to_owned(),
            display_name: agent.display_name.clone(),
            contact: agent.contact.clone(),
        };
        self.repo.upsert_agent(&agent, self.clock.now()).await
    }

    /// Look up an agent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the agent is not registered.
    pub async fn agent(&self, agent_id: &str) -> Result<Agent> {
        self.repo
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("agent {agent_id} not found")))
    }

    /// Register or replace the preference for a role.
    ///
    /// Segment and status lists are normalized before storage.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the preference is unusable.
    pub async fn upsert_preference(&self, preference: &AgentPreference) -> Result<AgentPreference> {
        preference.validate()?;
        let normalized = AgentPreference {
            role_key: preference.role_key.trim().to_owned(),
            primary_segments: normalize_codes(&preference.primary_segments, "primary_segments")?,
            fallback_segments: normalize_codes(
                &preference.fallback_segments,
                "fallback_segments",
            )?,
            pickup_statuses: normalize_codes(&preference.pickup_statuses, "pickup_statuses")?,
            active_statuses: normalize_codes(&preference.active_statuses, "active_statuses")?,
            accept_status: normalize_code(
                &preference.accept_status,
                "accept_status",
            )?,
            return_status: normalize_code(
                &preference.return_status,
                "return_status",
            )?,
            max_in_progress_minutes: preference.max_in_progress_minutes,
        };
        self.repo
            .upsert_preference(&normalized, self.clock.now())
            .await
    }

    /// Preference for a role.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the role has no preference.
    pub async fn preference(&self, role_key: &str) -> Result<AgentPreference> {
        self.repo
            .get_preference(role_key)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("no preference for role {role_key}")))
    }

    /// Preference for a role, or `None` when unset.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` on persistence failure.
    pub async fn find_preference(&self, role_key: &str) -> Result<Option<AgentPreference>> {
        self.repo.get_preference(role_key).await
    }

    /// Register every agent and preference listed in configuration.
    ///
    /// # Errors
    ///
    /// Returns the first registration failure.
    pub async fn seed(&self, agents: &[Agent], preferences: &[AgentPreference]) -> Result<()> {
        for agent in agents {
            self.upsert_agent(agent).await?;
        }
        for preference in preferences {
            self.upsert_preference(preference).await?;
        }
        if !agents.is_empty() || !preferences.is_empty() {
            info!(
                agents = agents.len(),
                preferences = preferences.len(),
                "registry seeded from configuration"
            );
        }
        Ok(())
    }
}
