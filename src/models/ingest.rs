//! Ingestion request and result shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::item::HandoffPlan;

/// Versioned template reference attached to a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TemplateReference {
    /// Template code.
    pub code: String,
    /// Pinned template version.
    #[serde(default)]
    pub version: Option<String>,
    /// Source path of the template.
    #[serde(default)]
    pub path: Option<String>,
}

/// Template links grouped by kind. Stored as metadata, never interpreted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Templates {
    /// Primary templates.
    #[serde(default)]
    pub primary: Vec<String>,
    /// Checklist templates.
    #[serde(default)]
    pub checklists: Vec<String>,
    /// Additional references.
    #[serde(default)]
    pub references: Vec<TemplateReference>,
}

fn default_priority() -> i64 {
    50
}

/// Request from an upstream producer to enqueue a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct IngestRequest {
    /// Producer-side identifier; must be unique.
    pub source_id: String,
    /// Segment the task enters.
    pub segment: String,
    /// Status the task starts in.
    pub initial_status: String,
    /// Claim priority in `0..=100`.
    #[serde(default = "default_priority")]
    pub priority: i64,
    /// Short title.
    pub title: String,
    /// Optional summary.
    #[serde(default)]
    pub summary: Option<String>,
    /// Task payload, copied verbatim.
    #[serde(default)]
    pub payload: Value,
    /// Knowledge references (`http(s)://`, `/api/`, `knowledge/`).
    #[serde(default)]
    pub knowledge_refs: Vec<String>,
    /// Template links.
    #[serde(default)]
    pub templates: Templates,
    /// Routing plan for later handoffs.
    #[serde(default)]
    pub handoff_plan: Option<HandoffPlan>,
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct IngestResult {
    /// New item id.
    pub item_id: String,
    /// Queue the item was placed in.
    pub queue_id: String,
    /// Normalized segment.
    pub segment: String,
    /// Normalized initial status.
    pub status: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}
