//! Coordination services: leases, versioned items, claims, and ingestion.
//!
//! Every service receives its store, clock, and settings explicitly;
//! [`Services::new`] is the single place they are wired together.

pub mod capability;
pub mod claim;
pub mod handoff;
pub mod ingest;
pub mod item_store;
pub mod lock_manager;
pub mod registry;
pub mod sweeper;

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::GlobalConfig;
use crate::persistence::db::Database;
use crate::Result;

use self::capability::CapabilityCheck;
use self::claim::ClaimCoordinator;
use self::ingest::TaskIngestion;
use self::item_store::ItemStore;
use self::lock_manager::LockManager;
use self::registry::AgentRegistry;

/// The composed coordination core shared by the HTTP and IPC surfaces.
#[derive(Clone)]
pub struct Services {
    /// Lease manager.
    pub locks: LockManager,
    /// Versioned item store.
    pub items: ItemStore,
    /// Agent directory and role preferences.
    pub registry: AgentRegistry,
    /// Capability checks.
    pub capabilities: CapabilityCheck,
    /// Claim coordinator.
    pub claims: ClaimCoordinator,
    /// Task ingestion.
    pub ingestion: TaskIngestion,
}

impl Services {
    /// Wire every service over `db` and `clock` using `config`.
    #[must_use]
    pub fn new(db: &Arc<Database>, clock: &Arc<dyn Clock>, config: &GlobalConfig) -> Self {
        let locks = LockManager::new(
            Arc::clone(db),
            Arc::clone(clock),
            config.locks.default_ttl_seconds,
        );
        let items = ItemStore::new(Arc::clone(db), Arc::clone(clock));
        let registry = AgentRegistry::new(Arc::clone(db), Arc::clone(clock));
        let capabilities = CapabilityCheck::new(config.capabilities.clone(), registry.clone());
        let claims = ClaimCoordinator::new(
            items.clone(),
            locks.clone(),
            registry.clone(),
            capabilities.clone(),
            config.claims.candidate_batch_size,
        );
        let ingestion = TaskIngestion::new(
            Arc::clone(db),
            items.clone(),
            capabilities.clone(),
            config.ingestion.clone(),
            Arc::clone(clock),
        );

        Self {
            locks,
            items,
            registry,
            capabilities,
            claims,
            ingestion,
        }
    }

    /// Wire the services and register configured agents and preferences.
    ///
    /// # Errors
    ///
    /// Returns the first seeding failure.
    pub async fn bootstrap(
        db: &Arc<Database>,
        clock: &Arc<dyn Clock>,
        config: &GlobalConfig,
    ) -> Result<Self> {
        let services = Self::new(db, clock, config);
        services
            .registry
            .seed(&config.agents, &config.preferences)
            .await?;
        Ok(services)
    }
}
