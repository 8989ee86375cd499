//! Shared state handed to the HTTP and IPC surfaces.

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::GlobalConfig;
use crate::coordination::Services;
use crate::persistence::db::Database;
use crate::Result;

/// Composed services plus the configuration they were built from.
pub struct AppState {
    /// Validated configuration.
    pub config: Arc<GlobalConfig>,
    /// Coordination services.
    pub services: Services,
}

impl AppState {
    /// Wire services over `db` and seed the registry from `config`.
    ///
    /// # Errors
    ///
    /// Returns the first seeding failure.
    pub async fn build(
        db: &Arc<Database>,
        clock: &Arc<dyn Clock>,
        config: Arc<GlobalConfig>,
    ) -> Result<Arc<Self>> {
        let services = Services::bootstrap(db, clock, &config).await?;
        Ok(Arc::new(Self { config, services }))
    }
}
