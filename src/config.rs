//! Global configuration parsing and validation.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::models::agent::{Agent, AgentPreference};
use crate::{AppError, Result};

/// Environment variable carrying the IPC shared secret.
pub const IPC_TOKEN_ENV: &str = "WORKQUEUE_IPC_TOKEN";

/// Lease defaults and sweeper cadence.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LockConfig {
    /// TTL applied when a caller passes a non-positive TTL.
    #[serde(default = "default_ttl_seconds")]
    pub default_ttl_seconds: i64,
    /// Interval between expired-lock sweeps.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: default_ttl_seconds(),
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

fn default_ttl_seconds() -> i64 {
    60
}

fn default_cleanup_interval() -> u64 {
    30
}

/// Candidate scanning knobs for the claim coordinator.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ClaimConfig {
    /// Page size used when scanning a segment for candidates.
    #[serde(default = "default_candidate_batch_size")]
    pub candidate_batch_size: u32,
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            candidate_batch_size: default_candidate_batch_size(),
        }
    }
}

fn default_candidate_batch_size() -> u32 {
    25
}

/// Ingestion gatekeeping.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct IngestionConfig {
    /// Capability a caller needs to ingest.
    #[serde(default = "default_ingest_capability")]
    pub capability: String,
    /// When set, ingestion may only target this segment.
    #[serde(default)]
    pub creation_segment: Option<String>,
    /// When non-empty, every segment named by a request must be listed.
    #[serde(default)]
    pub allowed_segments: Vec<String>,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            capability: default_ingest_capability(),
            creation_segment: None,
            allowed_segments: Vec::new(),
        }
    }
}

fn default_ingest_capability() -> String {
    "ingest".into()
}

fn default_http_port() -> u16 {
    8080
}

fn default_bind_address() -> String {
    "127.0.0.1".into()
}

fn default_ipc_name() -> String {
    "workqueue".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data").join("workqueue.db")
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// `SQLite` database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// HTTP API port.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// HTTP bind address.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Named pipe / Unix socket identifier.
    #[serde(default = "default_ipc_name")]
    pub ipc_name: String,
    /// Shared secret required on IPC commands (populated at runtime).
    #[serde(skip)]
    pub ipc_auth_token: Option<String>,
    /// Lease settings.
    #[serde(default)]
    pub locks: LockConfig,
    /// Claim coordinator settings.
    #[serde(default)]
    pub claims: ClaimConfig,
    /// Ingestion settings.
    #[serde(default)]
    pub ingestion: IngestionConfig,
    /// Capability name to role keys (`"*"` matches any role).
    #[serde(default)]
    pub capabilities: HashMap<String, Vec<String>>,
    /// Agents registered at startup.
    #[serde(default)]
    pub agents: Vec<Agent>,
    /// Role preferences registered at startup.
    #[serde(default)]
    pub preferences: Vec<AgentPreference>,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read the IPC shared secret from the environment, if present.
    pub fn load_ipc_token(&mut self) {
        match env::var(IPC_TOKEN_ENV) {
            Ok(token) if !token.trim().is_empty() => self.ipc_auth_token = Some(token),
            Ok(_) => {
                warn!(env = IPC_TOKEN_ENV, "ipc token is empty; ipc commands are unauthenticated");
            }
            Err(_) => {}
        }
    }

    fn validate(&mut self) -> Result<()> {
        if self.locks.default_ttl_seconds <= 0 {
            return Err(AppError::Config(
                "locks.default_ttl_seconds must be greater than zero".into(),
            ));
        }
        if self.locks.cleanup_interval_seconds == 0 {
            return Err(AppError::Config(
                "locks.cleanup_interval_seconds must be greater than zero".into(),
            ));
        }
        if self.claims.candidate_batch_size == 0 {
            return Err(AppError::Config(
                "claims.candidate_batch_size must be greater than zero".into(),
            ));
        }
        if self.ingestion.capability.trim().is_empty() {
            return Err(AppError::Config(
                "ingestion.capability must not be empty".into(),
            ));
        }

        self.ingestion.allowed_segments = self
            .ingestion
            .allowed_segments
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        self.ingestion.creation_segment = self
            .ingestion
            .creation_segment
            .take()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        if let Some(ref creation) = self.ingestion.creation_segment {
            if !self.ingestion.allowed_segments.is_empty()
                && !self.ingestion.allowed_segments.contains(creation)
            {
                return Err(AppError::Config(format!(
                    "ingestion.creation_segment '{creation}' is not in allowed_segments"
                )));
            }
        }

        for agent in &self.agents {
            agent
                .validate()
                .map_err(|err| AppError::Config(format!("agent '{}': {err}", agent.id)))?;
        }
        for preference in &self.preferences {
            preference.validate().map_err(|err| {
                AppError::Config(format!("preference '{}': {err}", preference.role_key))
            })?;
        }

        Ok(())
    }
}
