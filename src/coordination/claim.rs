//! Claim coordinator.
//!
//! `find_next_task` and `claim_task` share one selection path: scan a
//! segment oldest-first for unlocked eligible items, try to lease each
//! candidate once, and stop at the first win. A lost lease race moves on to
//! the next candidate; nothing here waits on another agent.

use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::models::agent::{Agent, AgentPreference};
use crate::models::item::{Assignment, ItemMutation, ItemUpdateRequest, ItemWithHistory, QueueItem};
use crate::models::lock::{LockGrant, LockScope};
use crate::models::task::{
    AcceptRequest, AcceptedTask, ClaimRequest, ReleaseRequest, SubmissionArtifact, SubmitRequest,
    TaskOffer,
};
use crate::persistence::item_repo::CandidateFilter;
use crate::validation::{normalize_code, normalize_codes};
use crate::{AppError, Result};

use super::capability::{CapabilityCheck, CAP_ADMIN, CAP_WORK};
use super::item_store::ItemStore;
use super::lock_manager::LockManager;
use super::registry::AgentRegistry;

/// Status committed by a successful submission.
pub const COMPLETED_STATUS: &str = "completed";

/// Eligibility criteria for one selection pass.
struct Selection<'a> {
    segments: &'a [String],
    pickup_statuses: &'a [String],
    excluded_statuses: &'a [String],
    priority_floor: Option<i64>,
    ttl_seconds: i64,
}

impl Selection<'_> {
    fn still_eligible(&self, item: &QueueItem, segment: &str) -> bool {
        item.segment == segment
            && self.pickup_statuses.contains(&item.status_code)
            && !self.excluded_statuses.contains(&item.status_code)
            && self.priority_floor.is_none_or(|floor| item.priority >= floor)
    }
}

/// Reserves, accepts, and releases tasks on behalf of agents.
#[derive(Clone)]
pub struct ClaimCoordinator {
    items: ItemStore,
    locks: LockManager,
    registry: AgentRegistry,
    capabilities: CapabilityCheck,
    batch_size: u32,
}

impl ClaimCoordinator {
    /// Compose a coordinator from its collaborators.
    #[must_use]
    pub fn new(
        items: ItemStore,
        locks: LockManager,
        registry: AgentRegistry,
        capabilities: CapabilityCheck,
        batch_size: u32,
    ) -> Self {
        Self {
            items,
            locks,
            registry,
            capabilities,
            batch_size: batch_size.max(1),
        }
    }

    /// Reserve the oldest eligible item in the agent's most-preferred segment.
    ///
    /// Primary segments are exhausted before fallback segments. Returns
    /// `Ok(None)` when nothing is claimable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Forbidden` if the agent lacks `work`, or
    /// `AppError::NotFound` if its role has no preference.
    #[instrument(skip(self))]
    pub async fn find_next_task(&self, agent_id: &str) -> Result<Option<TaskOffer>> {
        let agent = self.capabilities.require(agent_id, CAP_WORK).await?;
        let preference = self.registry.preference(&agent.role_key).await?;

        let segments: Vec<String> = preference
            .primary_segments
            .iter()
            .chain(preference.fallback_segments.iter())
            .cloned()
            .collect();
        let selection = Selection {
            segments: &segments,
            pickup_statuses: &preference.pickup_statuses,
            excluded_statuses: &preference.active_statuses,
            priority_floor: None,
            ttl_seconds: preference.lease_ttl_seconds(),
        };

        let reserved = self.reserve(&agent.id, &selection).await?;
        Ok(reserved.map(|(item, lease)| {
            offer(
                item,
                lease,
                Some(preference.accept_status.clone()),
                selection.ttl_seconds,
            )
        }))
    }

    /// Reserve the oldest eligible item in caller-supplied segments with at
    /// least `priority_floor` priority.
    ///
    /// Statuses default to the role's pickup statuses when the request
    /// names none.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Forbidden` if the agent lacks `work`, or
    /// `AppError::Validation` if no segments or statuses can be determined.
    #[instrument(skip(self, request), fields(segments = ?request.segments))]
    pub async fn claim_task(
        &self,
        agent_id: &str,
        request: &ClaimRequest,
    ) -> Result<Option<TaskOffer>> {
        let agent = self.capabilities.require(agent_id, CAP_WORK).await?;
        let segments = normalize_codes(&request.segments, "segments")?;
        if segments.is_empty() {
            return Err(AppError::Validation("segments must not be empty".into()));
        }

        let preference = self.registry.find_preference(&agent.role_key).await?;
        let pickup_statuses = if request.statuses.is_empty() {
            preference
                .as_ref()
                .map(|p| p.pickup_statuses.clone())
                .ok_or_else(|| {
                    AppError::Validation(format!(
                        "statuses are required: role {} has no preference",
                        agent.role_key
                    ))
                })?
        } else {
            normalize_codes(&request.statuses, "statuses")?
        };
        let excluded_statuses = preference
            .as_ref()
            .map(|p| p.active_statuses.clone())
            .unwrap_or_default();

        let selection = Selection {
            segments: &segments,
            pickup_statuses: &pickup_statuses,
            excluded_statuses: &excluded_statuses,
            priority_floor: Some(request.priority_floor),
            ttl_seconds: self.lease_ttl(preference.as_ref()),
        };

        let reserved = self.reserve(&agent.id, &selection).await?;
        Ok(reserved.map(|(item, lease)| {
            offer(
                item,
                lease,
                preference.as_ref().map(|p| p.accept_status.clone()),
                selection.ttl_seconds,
            )
        }))
    }

    /// Commit acceptance of a task: set its status, assign it to the caller,
    /// and hold the item lease for the role's in-progress window.
    ///
    /// The version check alone decides the winner. A caller whose
    /// reservation lapsed still succeeds when nobody mutated the item in the
    /// meantime; the item lease then moves to the caller.
    ///
    /// # Errors
    ///
    /// Returns `AppError::VersionConflict` if the item moved since it was
    /// reserved, `AppError::NotFound` for unknown items, or
    /// `AppError::Forbidden` if the caller lacks `work`.
    #[instrument(skip(self, request), fields(expected_version = request.expected_version))]
    pub async fn accept_task(
        &self,
        agent_id: &str,
        item_id: &str,
        request: AcceptRequest,
    ) -> Result<AcceptedTask> {
        let agent = self.capabilities.require(agent_id, CAP_WORK).await?;
        let preference = self.registry.find_preference(&agent.role_key).await?;
        let status = match (request.status_code, preference.as_ref()) {
            (Some(status), _) => status,
            (None, Some(p)) => p.accept_status.clone(),
            (None, None) => {
                return Err(AppError::Validation(
                    "status_code is required when the role has no preference".into(),
                ))
            }
        };
        let ttl_seconds = self.lease_ttl(preference.as_ref());

        let mutation = ItemMutation {
            status_code: Some(status),
            payload: request.payload,
            metadata: request.metadata,
            assigned_agent: Assignment::Set(agent.id.clone()),
            actor: Some(agent.id.clone()),
            note: request.note,
            ..ItemMutation::default()
        };
        let item = self
            .items
            .update(item_id, request.expected_version, mutation)
            .await?;

        let lease = self
            .locks
            .take_over(LockScope::Item, item_id, &agent.id, ttl_seconds)
            .await?;
        info!(item_id, agent_id = %agent.id, status = %item.status_code, "task accepted");
        Ok(AcceptedTask {
            item,
            ttl_minutes: ttl_minutes(ttl_seconds),
            lease,
        })
    }

    /// Hand a task back: set the return status, clear the owner, and drop
    /// the item lease.
    ///
    /// The live lease holder (or the assigned agent once the lease lapsed)
    /// may release; anyone else needs `admin`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::LockUnavailable` when the caller may not release
    /// the item, `AppError::VersionConflict`, `AppError::NotFound`, or
    /// `AppError::Forbidden`.
    #[instrument(skip(self, request), fields(expected_version = request.expected_version))]
    pub async fn release_task(
        &self,
        agent_id: &str,
        item_id: &str,
        request: ReleaseRequest,
    ) -> Result<QueueItem> {
        let agent = self.capabilities.require(agent_id, CAP_WORK).await?;
        let current = self.items.get(item_id).await?;
        let admin = self.capabilities.agent_has(&agent, CAP_ADMIN);
        self.ensure_may_modify(&agent, &current, admin, true).await?;

        let status = match request.status_code {
            Some(status) => status,
            None => self.registry.preference(&agent.role_key).await?.return_status,
        };

        let mutation = ItemMutation {
            status_code: Some(status),
            assigned_agent: Assignment::Clear,
            actor: Some(agent.id.clone()),
            note: request.note,
            ..ItemMutation::default()
        };
        let item = self
            .items
            .update(item_id, request.expected_version, mutation)
            .await?;

        self.locks
            .release_target(LockScope::Item, item_id, None)
            .await?;
        info!(item_id, agent_id = %agent.id, status = %item.status_code, admin, "task released");
        Ok(item)
    }

    /// Complete an accepted task: record its result artifacts, move it to
    /// [`COMPLETED_STATUS`] (which runs the handoff plan), and drop the
    /// caller's item lease.
    ///
    /// Artifacts accumulate under the `artifacts` metadata key across
    /// submissions.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Forbidden` when the caller is not the assigned
    /// agent, `AppError::Validation` when no usable artifact is supplied or
    /// `metadata` is not an object, plus `AppError::VersionConflict` and
    /// `AppError::NotFound` from the item store.
    #[instrument(skip(self, request), fields(expected_version = request.expected_version))]
    pub async fn submit_task(
        &self,
        agent_id: &str,
        item_id: &str,
        request: SubmitRequest,
    ) -> Result<QueueItem> {
        let agent = self.capabilities.require(agent_id, CAP_WORK).await?;
        let current = self.items.get(item_id).await?;
        if current.assigned_agent.as_deref() != Some(agent.id.as_str()) {
            warn!(item_id, agent_id = %agent.id, owner = ?current.assigned_agent, "submission by non-owner");
            return Err(AppError::Forbidden(format!(
                "item {item_id} is not assigned to {}",
                agent.id
            )));
        }

        let artifacts: Vec<&SubmissionArtifact> = request
            .artifacts
            .iter()
            .filter(|a| !a.title.trim().is_empty() && !a.url.trim().is_empty())
            .collect();
        if artifacts.is_empty() {
            return Err(AppError::Validation(
                "at least one result artifact is required".into(),
            ));
        }

        let mut patch = match request.metadata {
            None => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => return Err(AppError::Validation("metadata must be an object".into())),
        };
        let mut recorded = current
            .metadata
            .get("artifacts")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        recorded.extend(artifacts.iter().map(|a| {
            json!({
                "title": a.title.trim(),
                "url": a.url.trim(),
                "submitted_by": agent.id,
            })
        }));
        patch.insert("artifacts".into(), Value::Array(recorded));

        let mutation = ItemMutation {
            status_code: Some(COMPLETED_STATUS.to_owned()),
            metadata: Some(Value::Object(patch)),
            actor: Some(agent.id.clone()),
            note: request.notes,
            ..ItemMutation::default()
        };
        let item = self
            .items
            .update(item_id, request.expected_version, mutation)
            .await?;

        self.locks
            .release_target(LockScope::Item, item_id, Some(&agent.id))
            .await?;
        info!(item_id, agent_id = %agent.id, segment = %item.segment, "task submitted");
        Ok(item)
    }

    /// Generic versioned update on behalf of an agent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::LockUnavailable` when another agent holds a live
    /// lease and the caller lacks `admin`, plus the item store's errors.
    #[instrument(skip(self, request), fields(expected_version = request.expected_version))]
    pub async fn update_item(
        &self,
        agent_id: &str,
        item_id: &str,
        request: ItemUpdateRequest,
    ) -> Result<ItemWithHistory> {
        let agent = self.capabilities.require(agent_id, CAP_WORK).await?;
        let current = self.items.get(item_id).await?;
        let admin = self.capabilities.agent_has(&agent, CAP_ADMIN);
        self.ensure_may_modify(&agent, &current, admin, false).await?;

        let expected = request.expected_version;
        self.items
            .update(item_id, expected, request.into_mutation(&agent.id))
            .await?;
        self.items.get_with_history(item_id).await
    }

    /// Administrative reclaim: clear the owner, optionally set `status`, and
    /// drop any lease, at the item's current version.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for unknown items or
    /// `AppError::VersionConflict` if the item moved during the reclaim.
    #[instrument(skip(self))]
    pub async fn reclaim(
        &self,
        item_id: &str,
        status: Option<&str>,
        actor: &str,
    ) -> Result<QueueItem> {
        let current = self.items.get(item_id).await?;
        let status_code = status.map(|s| normalize_code(s, "status")).transpose()?;

        let mutation = ItemMutation {
            status_code,
            assigned_agent: Assignment::Clear,
            actor: Some(actor.to_owned()),
            note: Some("administrative reclaim".into()),
            ..ItemMutation::default()
        };
        let item = self
            .items
            .update(item_id, current.version, mutation)
            .await?;
        let dropped = self
            .locks
            .release_target(LockScope::Item, item_id, None)
            .await?;
        warn!(item_id, actor, lease_dropped = dropped, "item reclaimed");
        Ok(item)
    }

    async fn reserve(
        &self,
        agent_id: &str,
        selection: &Selection<'_>,
    ) -> Result<Option<(QueueItem, LockGrant)>> {
        for segment in selection.segments {
            let mut tried: Vec<String> = Vec::new();
            loop {
                let filter = CandidateFilter {
                    segment,
                    pickup_statuses: selection.pickup_statuses,
                    excluded_statuses: selection.excluded_statuses,
                    priority_floor: selection.priority_floor,
                    exclude_ids: &tried,
                    limit: self.batch_size,
                };
                let page = self.items.candidates(&filter).await?;
                if page.is_empty() {
                    break;
                }

                for candidate in page {
                    tried.push(candidate.id.clone());
                    let lease = match self
                        .locks
                        .acquire(LockScope::Item, &candidate.id, agent_id, selection.ttl_seconds)
                        .await
                    {
                        Ok(lease) => lease,
                        Err(AppError::LockUnavailable(_)) => {
                            debug!(item_id = %candidate.id, "candidate taken, trying next");
                            continue;
                        }
                        Err(err) => return Err(err),
                    };

                    match self.items.find(&candidate.id).await? {
                        Some(fresh) if selection.still_eligible(&fresh, segment) => {
                            info!(item_id = %fresh.id, agent_id, segment = %segment, "task reserved");
                            return Ok(Some((fresh, lease)));
                        }
                        _ => {
                            debug!(item_id = %candidate.id, "candidate changed after lease, skipping");
                            self.drop_lease(&candidate.id, agent_id).await;
                        }
                    }
                }
            }
        }
        debug!(agent_id, "no task available");
        Ok(None)
    }

    async fn ensure_may_modify(
        &self,
        agent: &Agent,
        item: &QueueItem,
        admin: bool,
        require_ownership: bool,
    ) -> Result<()> {
        if admin {
            return Ok(());
        }
        match self.locks.live_lock(LockScope::Item, &item.id).await? {
            Some(lock) if lock.holder != agent.id => Err(AppError::LockUnavailable(format!(
                "item {} is leased by another agent",
                item.id
            ))),
            Some(_) => Ok(()),
            None if require_ownership
                && item
                    .assigned_agent
                    .as_deref()
                    .is_some_and(|owner| owner != agent.id) =>
            {
                Err(AppError::LockUnavailable(format!(
                    "item {} is assigned to another agent",
                    item.id
                )))
            }
            None => Ok(()),
        }
    }

    async fn drop_lease(&self, item_id: &str, agent_id: &str) {
        if let Err(err) = self
            .locks
            .release_target(LockScope::Item, item_id, Some(agent_id))
            .await
        {
            warn!(item_id, agent_id, %err, "failed to drop lease");
        }
    }

    fn lease_ttl(&self, preference: Option<&AgentPreference>) -> i64 {
        preference.map_or_else(
            || self.locks.effective_ttl(0),
            AgentPreference::lease_ttl_seconds,
        )
    }
}

fn offer(
    item: QueueItem,
    lease: LockGrant,
    recommended_status: Option<String>,
    ttl_seconds: i64,
) -> TaskOffer {
    TaskOffer {
        item,
        recommended_status,
        ttl_minutes: ttl_minutes(ttl_seconds),
        requires_acceptance: true,
        lease,
    }
}

/// Whole minutes covering `ttl_seconds`, rounded up.
fn ttl_minutes(ttl_seconds: i64) -> i64 {
    (ttl_seconds + 59) / 60
}
