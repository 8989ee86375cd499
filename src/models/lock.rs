//! Lease model for queue- and item-scope mutual exclusion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a lock protects.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockScope {
    /// A whole queue (segment container).
    Queue,
    /// A single queue item.
    Item,
}

impl LockScope {
    /// Column value used in `SQLite`.
    #[must_use]
    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::Queue => "queue",
            Self::Item => "item",
        }
    }

    /// Parse the stored column value.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` for unknown values.
    pub fn from_db_str(s: &str) -> crate::Result<Self> {
        match s {
            "queue" => Ok(Self::Queue),
            "item" => Ok(Self::Item),
            other => Err(crate::AppError::Db(format!("invalid lock scope: {other}"))),
        }
    }
}

/// A live or expired lease. The token is never part of this record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Lock {
    /// Lease identifier; stable across same-holder renewals.
    pub id: String,
    /// Protected scope.
    pub scope: LockScope,
    /// Queue id or item id.
    pub target_id: String,
    /// Owning agent.
    pub holder: String,
    /// When the current holder first obtained the lease.
    pub acquired_at: DateTime<Utc>,
    /// Expiry instant; the lease is live strictly before it.
    pub expires_at: DateTime<Utc>,
}

impl Lock {
    /// Whether the lease is still live at `now`.
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Result of a successful acquisition: the lease plus its bearer token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LockGrant {
    /// The granted lease.
    #[serde(flatten)]
    pub lock: Lock,
    /// Capability proving ownership; shown only to the acquirer.
    pub token: String,
}
