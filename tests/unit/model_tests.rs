use serde_json::json;

use workqueue::models::agent::AgentPreference;
use workqueue::models::ingest::IngestRequest;
use workqueue::models::item::{merge_patch, Assignment, ItemUpdateRequest};
use workqueue::models::lock::LockScope;
use workqueue::models::task::{AcceptRequest, ClaimRequest};

#[test]
fn lock_scope_wire_and_db_forms() {
    assert_eq!(serde_json::to_value(LockScope::Item).unwrap(), json!("ITEM"));
    assert_eq!(
        serde_json::from_value::<LockScope>(json!("QUEUE")).unwrap(),
        LockScope::Queue
    );
    assert_eq!(LockScope::Item.as_db_str(), "item");
    assert_eq!(LockScope::from_db_str("queue").unwrap(), LockScope::Queue);
    assert!(LockScope::from_db_str("table").is_err());
}

#[test]
fn ingest_request_defaults() {
    let request: IngestRequest = serde_json::from_value(json!({
        "source_id": "s-1",
        "segment": "concept",
        "initial_status": "draft",
        "title": "Vendor quest"
    }))
    .unwrap();
    assert_eq!(request.priority, 50);
    assert!(request.knowledge_refs.is_empty());
    assert!(request.templates.primary.is_empty());
    assert!(request.handoff_plan.is_none());
}

#[test]
fn handoff_plan_conditions_default_empty() {
    let request: IngestRequest = serde_json::from_value(json!({
        "source_id": "s-1",
        "segment": "concept",
        "initial_status": "draft",
        "title": "Vendor quest",
        "handoff_plan": { "next_segment": "qa" }
    }))
    .unwrap();
    let plan = request.handoff_plan.unwrap();
    assert_eq!(plan.next_segment, "qa");
    assert!(plan.conditions.is_empty());
}

#[test]
fn update_request_maps_assignment() {
    let set: ItemUpdateRequest =
        serde_json::from_value(json!({ "expected_version": 3, "assigned_agent": "writer-b" }))
            .unwrap();
    assert_eq!(
        set.into_mutation("ops-1").assigned_agent,
        Assignment::Set("writer-b".into())
    );

    let clear: ItemUpdateRequest =
        serde_json::from_value(json!({ "expected_version": 3, "clear_assigned_agent": true }))
            .unwrap();
    let mutation = clear.into_mutation("ops-1");
    assert_eq!(mutation.assigned_agent, Assignment::Clear);
    assert_eq!(mutation.actor.as_deref(), Some("ops-1"));

    let keep: ItemUpdateRequest =
        serde_json::from_value(json!({ "expected_version": 3 })).unwrap();
    assert_eq!(keep.into_mutation("ops-1").assigned_agent, Assignment::Keep);
}

#[test]
fn task_requests_have_optional_fields() {
    let accept: AcceptRequest =
        serde_json::from_value(json!({ "expected_version": 1 })).unwrap();
    assert!(accept.status_code.is_none());
    assert!(accept.payload.is_none());

    let claim: ClaimRequest = serde_json::from_value(json!({ "segments": ["qa"] })).unwrap();
    assert_eq!(claim.priority_floor, 0);
    assert!(claim.statuses.is_empty());
}

#[test]
fn preference_lease_ttl() {
    let preference = AgentPreference {
        role_key: "writer".into(),
        primary_segments: vec!["concept".into()],
        fallback_segments: Vec::new(),
        pickup_statuses: vec!["draft".into()],
        active_statuses: Vec::new(),
        accept_status: "in_review".into(),
        return_status: "ready".into(),
        max_in_progress_minutes: 30,
    };
    assert_eq!(preference.lease_ttl_seconds(), 1800);
    preference.validate().unwrap();
}

#[test]
fn merge_patch_nested_objects() {
    let mut target = json!({ "a": { "b": 1, "c": 2 }, "d": [1, 2] });
    merge_patch(&mut target, &json!({ "a": { "c": null, "e": 3 }, "d": [3] }));
    assert_eq!(target, json!({ "a": { "b": 1, "e": 3 }, "d": [3] }));
}
