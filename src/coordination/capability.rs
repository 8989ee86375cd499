//! Role-based capability checks.

use std::collections::HashMap;

use tracing::warn;

use crate::models::agent::Agent;
use crate::{AppError, Result};

use super::registry::AgentRegistry;

/// Capability required to claim, accept, release, and mutate items.
pub const CAP_WORK: &str = "work";
/// Capability that overrides lease ownership and guards registry writes.
pub const CAP_ADMIN: &str = "admin";

/// Grants capabilities to roles. A role list containing `"*"` grants the
/// capability to every registered agent.
#[derive(Clone)]
pub struct CapabilityCheck {
    grants: HashMap<String, Vec<String>>,
    registry: AgentRegistry,
}

impl CapabilityCheck {
    /// Build a checker from the configured capability map.
    #[must_use]
    pub fn new(grants: HashMap<String, Vec<String>>, registry: AgentRegistry) -> Self {
        Self { grants, registry }
    }

    /// Whether `role_key` holds `capability`.
    #[must_use]
    pub fn allows(&self, role_key: &str, capability: &str) -> bool {
        self.grants
            .get(capability)
            .is_some_and(|roles| roles.iter().any(|r| r == "*" || r == role_key))
    }

    /// Resolve `agent_id` and confirm its role holds `capability`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Forbidden` when the agent is unknown or its role
    /// lacks the capability.
    pub async fn require(&self, agent_id: &str, capability: &str) -> Result<Agent> {
        let agent = match self.registry.agent(agent_id).await {
            Ok(agent) => agent,
            Err(AppError::NotFound(_)) => {
                warn!(agent_id, capability, "unknown agent denied");
                return Err(AppError::Forbidden(format!(
                    "agent {agent_id} is not registered"
                )));
            }
            Err(err) => return Err(err),
        };

        if self.allows(&agent.role_key, capability) {
            Ok(agent)
        } else {
            warn!(agent_id, role = %agent.role_key, capability, "capability denied");
            Err(AppError::Forbidden(format!(
                "role {} lacks capability {capability}",
                agent.role_key
            )))
        }
    }

    /// Whether a resolved agent holds `capability`.
    #[must_use]
    pub fn agent_has(&self, agent: &Agent, capability: &str) -> bool {
        self.allows(&agent.role_key, capability)
    }
}
