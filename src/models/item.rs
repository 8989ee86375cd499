//! Queue item model, handoff plan, and mutation inputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One `{status, target_segment}` routing rule. First match wins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HandoffCondition {
    /// Status that triggers this rule.
    pub status: String,
    /// Segment the item moves to when the rule fires.
    pub target_segment: String,
}

/// Routing plan attached to an item at ingestion time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HandoffPlan {
    /// Default target when no condition matches.
    pub next_segment: String,
    /// Ordered routing rules.
    #[serde(default)]
    pub conditions: Vec<HandoffCondition>,
    /// Informational notes for humans.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A unit of work moving through pipeline segments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct QueueItem {
    /// Unique record identifier.
    pub id: String,
    /// Upstream producer's identifier; unique across items.
    pub source_id: String,
    /// Current pipeline stage.
    pub segment: String,
    /// Current status code from the open status vocabulary.
    pub status_code: String,
    /// Claim priority; higher is more urgent.
    pub priority: i64,
    /// Optimistic version, bumped on every committed mutation.
    pub version: i64,
    /// Owning agent, if any.
    pub assigned_agent: Option<String>,
    /// Opaque task payload.
    pub payload: Value,
    /// Opaque metadata (references, templates, notes).
    pub metadata: Value,
    /// Routing plan evaluated on status transitions.
    pub handoff_plan: Option<HandoffPlan>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Change to the owning agent requested by a mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Assignment {
    /// Leave the current owner untouched.
    #[default]
    Keep,
    /// Assign to the given agent.
    Set(String),
    /// Remove the owner.
    Clear,
}

/// Mutation applied through the versioned update protocol.
///
/// `payload` and `metadata` are JSON merge patches: objects merge key by
/// key and `null` removes a key. The `clear_*` flags reset the field to an
/// empty object before the patch is applied.
#[derive(Debug, Clone, Default)]
pub struct ItemMutation {
    /// New status; `None` keeps the current one.
    pub status_code: Option<String>,
    /// Payload fragment to merge.
    pub payload: Option<Value>,
    /// Metadata fragment to merge.
    pub metadata: Option<Value>,
    /// Reset payload before merging.
    pub clear_payload: bool,
    /// Reset metadata before merging.
    pub clear_metadata: bool,
    /// Owner change.
    pub assigned_agent: Assignment,
    /// Agent performing the change, recorded in history.
    pub actor: Option<String>,
    /// Free-form note recorded in history.
    pub note: Option<String>,
}

impl ItemMutation {
    /// Mutation that only changes status.
    #[must_use]
    pub fn status(status_code: impl Into<String>) -> Self {
        Self {
            status_code: Some(status_code.into()),
            ..Self::default()
        }
    }
}

/// Versioned update submitted over the API.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ItemUpdateRequest {
    /// Version the caller last observed.
    pub expected_version: i64,
    /// New status.
    #[serde(default)]
    pub status_code: Option<String>,
    /// Payload merge patch.
    #[serde(default)]
    pub payload: Option<Value>,
    /// Metadata merge patch.
    #[serde(default)]
    pub metadata: Option<Value>,
    /// Reset payload before merging.
    #[serde(default)]
    pub clear_payload: bool,
    /// Reset metadata before merging.
    #[serde(default)]
    pub clear_metadata: bool,
    /// New owner.
    #[serde(default)]
    pub assigned_agent: Option<String>,
    /// Remove the owner; ignored when `assigned_agent` is set.
    #[serde(default)]
    pub clear_assigned_agent: bool,
    /// History note.
    #[serde(default)]
    pub note: Option<String>,
}

impl ItemUpdateRequest {
    /// Mutation performed by `actor`.
    #[must_use]
    pub fn into_mutation(self, actor: &str) -> ItemMutation {
        let assigned_agent = match self.assigned_agent {
            Some(agent) => Assignment::Set(agent),
            None if self.clear_assigned_agent => Assignment::Clear,
            None => Assignment::Keep,
        };
        ItemMutation {
            status_code: self.status_code,
            payload: self.payload,
            metadata: self.metadata,
            clear_payload: self.clear_payload,
            clear_metadata: self.clear_metadata,
            assigned_agent,
            actor: Some(actor.to_owned()),
            note: self.note,
        }
    }
}

/// One committed version of an item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ItemStateEntry {
    /// Item this entry belongs to.
    pub item_id: String,
    /// Version produced by the mutation.
    pub version: i64,
    /// Status after the mutation.
    pub status_code: String,
    /// Segment after the mutation.
    pub segment: String,
    /// Agent that committed the mutation.
    pub actor: Option<String>,
    /// Note supplied with the mutation.
    pub note: Option<String>,
    /// Commit timestamp.
    pub created_at: DateTime<Utc>,
}

/// Item together with its committed history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ItemWithHistory {
    /// Current item state.
    pub item: QueueItem,
    /// History ordered by ascending version.
    pub history: Vec<ItemStateEntry>,
}

/// Apply an RFC 7396 JSON merge patch to `target`.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge_patch(
                    target_map.entry(key.clone()).or_insert(Value::Null),
                    value,
                );
            }
        }
    }
}
