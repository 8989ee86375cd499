//! Task ingestion from upstream producers.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::IngestionConfig;
use crate::models::ingest::{IngestRequest, IngestResult};
use crate::models::item::{HandoffCondition, HandoffPlan, QueueItem};
use crate::persistence::db::Database;
use crate::persistence::queue_repo::QueueRepo;
use crate::validation::{is_valid_knowledge_ref, normalize_code};
use crate::{AppError, Result};

use super::capability::CapabilityCheck;
use super::item_store::ItemStore;

const MAX_PRIORITY: i64 = 100;

/// Validates ingestion requests and enqueues new items.
#[derive(Clone)]
pub struct TaskIngestion {
    items: ItemStore,
    queues: QueueRepo,
    capabilities: CapabilityCheck,
    config: IngestionConfig,
    clock: Arc<dyn Clock>,
}

impl TaskIngestion {
    /// Compose the ingestion service.
    #[must_use]
    pub fn new(
        db: Arc<Database>,
        items: ItemStore,
        capabilities: CapabilityCheck,
        config: IngestionConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            items,
            queues: QueueRepo::new(db),
            capabilities,
            config,
            clock,
        }
    }

    /// Validate `request` on behalf of `caller` and enqueue it unclaimed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Forbidden` when the caller lacks the ingestion
    /// capability or targets a segment outside the configured ones,
    /// `AppError::Validation` for malformed requests, and
    /// `AppError::Conflict` for a duplicate `source_id`.
    #[instrument(skip(self, request), fields(source_id = %request.source_id))]
    pub async fn ingest(&self, caller: &str, request: IngestRequest) -> Result<IngestResult> {
        self.capabilities
            .require(caller, &self.config.capability)
            .await?;

        let source_id = request.source_id.trim().to_owned();
        if source_id.is_empty() {
            return Err(AppError::Validation("source_id must not be blank".into()));
        }
        let segment = normalize_code(&request.segment, "segment")?;
        self.check_creation_segment(&segment)?;
        let status = normalize_code(&request.initial_status, "initial_status")?;

        if !(0..=MAX_PRIORITY).contains(&request.priority) {
            return Err(AppError::Validation(format!(
                "priority {} is outside 0..={MAX_PRIORITY}",
                request.priority
            )));
        }
        let title = request.title.trim().to_owned();
        if title.is_empty() {
            return Err(AppError::Validation("title must not be blank".into()));
        }
        let summary = request
            .summary
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned);

        if request.knowledge_refs.is_empty() {
            return Err(AppError::Validation("knowledge_refs must not be empty".into()));
        }
        let invalid_refs: Vec<&str> = request
            .knowledge_refs
            .iter()
            .map(String::as_str)
            .filter(|r| !is_valid_knowledge_ref(r))
            .collect();
        if !invalid_refs.is_empty() {
            return Err(AppError::Validation(format!(
                "invalid knowledge references: {}",
                invalid_refs.join(", ")
            )));
        }
        let knowledge_refs: Vec<String> = request
            .knowledge_refs
            .iter()
            .map(|r| r.trim().to_owned())
            .collect();

        let handoff_plan = request
            .handoff_plan
            .as_ref()
            .map(|plan| self.normalize_plan(plan))
            .transpose()?;

        if self.items.source_exists(&source_id).await? {
            return Err(AppError::Conflict(format!(
                "source_id {source_id} was already ingested"
            )));
        }

        let now = self.clock.now();
        let queue_id = self.queues.resolve_or_create(&segment, now).await?;

        let metadata = json!({
            "source_id": source_id,
            "title": title,
            "summary": summary,
            "knowledge_refs": knowledge_refs,
            "templates": request.templates,
            "handoff_notes": handoff_plan.as_ref().and_then(|p| p.notes.clone()),
        });
        let payload = match request.payload {
            Value::Null => json!({}),
            other => other,
        };

        let item = QueueItem {
            id: Uuid::new_v4().to_string(),
            source_id,
            segment,
            status_code: status,
            priority: request.priority,
            version: 1,
            assigned_agent: None,
            payload,
            metadata,
            handoff_plan,
            created_at: now,
            updated_at: now,
        };
        let item = self
            .items
            .insert(&item, Some(caller.to_owned()), Some("ingested".into()))
            .await?;

        info!(
            item_id = %item.id,
            queue_id = %queue_id,
            segment = %item.segment,
            status = %item.status_code,
            "task ingested"
        );
        Ok(IngestResult {
            item_id: item.id,
            queue_id,
            segment: item.segment,
            status: item.status_code,
            created_at: item.created_at,
        })
    }

    fn check_creation_segment(&self, segment: &str) -> Result<()> {
        if let Some(ref creation) = self.config.creation_segment {
            if creation != segment {
                return Err(AppError::Forbidden(format!(
                    "ingestion is only allowed into segment {creation}"
                )));
            }
        }
        self.check_allowed(segment)
    }

    fn check_allowed(&self, segment: &str) -> Result<()> {
        let allowed = &self.config.allowed_segments;
        if allowed.is_empty() || allowed.iter().any(|s| s == segment) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "segment {segment} is not an allowed segment"
            )))
        }
    }

    fn normalize_plan(&self, plan: &HandoffPlan) -> Result<HandoffPlan> {
        let next_segment = normalize_code(&plan.next_segment, "handoff_plan.next_segment")?;
        self.check_allowed(&next_segment)?;

        let mut conditions = Vec::with_capacity(plan.conditions.len());
        for condition in &plan.conditions {
            let target_segment =
                normalize_code(&condition.target_segment, "handoff_plan.target_segment")?;
            self.check_allowed(&target_segment)?;
            conditions.push(HandoffCondition {
                status: normalize_code(&condition.status, "handoff_plan.status")?,
                target_segment,
            });
        }

        Ok(HandoffPlan {
            next_segment,
            conditions,
            notes: plan
                .notes
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_owned),
        })
    }
}
