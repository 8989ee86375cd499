//! Claim coordinator results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::item::QueueItem;
use super::lock::LockGrant;

/// An item reserved for an agent under an item lease.
///
/// Reserving does not change the item; the agent still has to accept it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct TaskOffer {
    /// Reserved item, as read right after the lease was granted.
    pub item: QueueItem,
    /// Status the agent should set on accept.
    pub recommended_status: Option<String>,
    /// Granted lease length in minutes.
    pub ttl_minutes: i64,
    /// Always `true`: the reservation must be confirmed by accept.
    pub requires_acceptance: bool,
    /// The item lease.
    pub lease: LockGrant,
}

/// Result of a committed accept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct AcceptedTask {
    /// Item after the accept mutation.
    pub item: QueueItem,
    /// Lease length in minutes.
    pub ttl_minutes: i64,
    /// Renewed item lease.
    pub lease: LockGrant,
}

/// Preference-independent claim over explicit segments.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ClaimRequest {
    /// Segments scanned in order.
    pub segments: Vec<String>,
    /// Only items with at least this priority qualify.
    #[serde(default)]
    pub priority_floor: i64,
    /// Claimable statuses; empty means the caller's role pickup statuses.
    #[serde(default)]
    pub statuses: Vec<String>,
}

/// Confirmation of a reserved task.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct AcceptRequest {
    /// Version the caller last observed.
    pub expected_version: i64,
    /// Status to set; defaults to the role's accept status.
    #[serde(default)]
    pub status_code: Option<String>,
    /// History note.
    #[serde(default)]
    pub note: Option<String>,
    /// Payload merge patch.
    #[serde(default)]
    pub payload: Option<Value>,
    /// Metadata merge patch.
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Hand a task back to its segment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ReleaseRequest {
    /// Version the caller last observed.
    pub expected_version: i64,
    /// Status to set; defaults to the role's return status.
    #[serde(default)]
    pub status_code: Option<String>,
    /// History note.
    #[serde(default)]
    pub note: Option<String>,
}

/// Link to a result produced for a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SubmissionArtifact {
    /// Human-readable label.
    pub title: String,
    /// Where the result lives.
    pub url: String,
}

/// Completion of an accepted task.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct SubmitRequest {
    /// Version the caller last observed.
    pub expected_version: i64,
    /// Result links; entries with a blank title or url are ignored.
    #[serde(default)]
    pub artifacts: Vec<SubmissionArtifact>,
    /// History note.
    #[serde(default)]
    pub notes: Option<String>,
    /// Metadata merge patch; must be an object.
    #[serde(default)]
    pub metadata: Option<Value>,
}
