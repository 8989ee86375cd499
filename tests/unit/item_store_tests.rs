use serde_json::json;

use workqueue::models::item::{Assignment, ItemMutation};
use workqueue::AppError;

use crate::test_helpers::harness;

#[tokio::test]
async fn ingested_item_starts_at_version_one_with_history() {
    let h = harness().await;
    let ingested = h.ingest("src-1", "concept", "draft").await;

    let found = h
        .services
        .items
        .get_with_history(&ingested.item_id)
        .await
        .expect("get");
    assert_eq!(found.item.version, 1);
    assert_eq!(found.history.len(), 1);
    assert_eq!(found.history[0].version, 1);
    assert_eq!(found.history[0].status_code, "draft");
}

#[tokio::test]
async fn update_bumps_version_and_appends_history() {
    let h = harness().await;
    let id = h.ingest("src-1", "concept", "draft").await.item_id;

    let updated = h
        .services
        .items
        .update(
            &id,
            1,
            ItemMutation {
                payload: Some(json!({ "outline": ["hook", "twist"] })),
                actor: Some("writer-a".into()),
                note: Some("outlined".into()),
                ..ItemMutation::default()
            },
        )
        .await
        .expect("update");

    assert_eq!(updated.version, 2);
    assert_eq!(updated.status_code, "draft");
    assert_eq!(updated.segment, "concept");
    assert_eq!(
        updated.payload,
        json!({ "brief": "write the vendor quest", "outline": ["hook", "twist"] })
    );

    let history = h.services.items.get_with_history(&id).await.expect("get").history;
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].version, 2);
    assert_eq!(history[1].actor.as_deref(), Some("writer-a"));
    assert_eq!(history[1].note.as_deref(), Some("outlined"));
}

#[tokio::test]
async fn stale_version_fails_without_side_effects() {
    let h = harness().await;
    let id = h.ingest("src-1", "concept", "draft").await.item_id;
    h.services
        .items
        .update(&id, 1, ItemMutation::status("ready"))
        .await
        .expect("first update");

    let err = h
        .services
        .items
        .update(&id, 1, ItemMutation::status("done"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::VersionConflict(_)));

    let stored = h.services.items.get_with_history(&id).await.expect("get");
    assert_eq!(stored.item.version, 2);
    assert_eq!(stored.item.status_code, "ready");
    assert_eq!(stored.item.segment, "archive");
    assert_eq!(stored.history.len(), 2);
}

#[tokio::test]
async fn missing_item_is_not_found() {
    let h = harness().await;
    let err = h
        .services
        .items
        .update("nope", 1, ItemMutation::status("ready"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn done_hands_off_to_qa() {
    let h = harness().await;
    let id = h.ingest("src-1", "concept", "draft").await.item_id;

    let updated = h
        .services
        .items
        .update(&id, 1, ItemMutation::status("done"))
        .await
        .expect("update");
    assert_eq!(updated.status_code, "done");
    assert_eq!(updated.segment, "qa");

    let history = h.services.items.get_with_history(&id).await.expect("get").history;
    assert_eq!(history[1].segment, "qa");
}

#[tokio::test]
async fn other_status_hands_off_to_default() {
    let h = harness().await;
    let id = h.ingest("src-1", "concept", "draft").await.item_id;

    let updated = h
        .services
        .items
        .update(&id, 1, ItemMutation::status("in_review"))
        .await
        .expect("update");
    assert_eq!(updated.segment, "archive");
}

#[tokio::test]
async fn same_status_does_not_hand_off() {
    let h = harness().await;
    let id = h.ingest("src-1", "concept", "draft").await.item_id;

    let updated = h
        .services
        .items
        .update(&id, 1, ItemMutation::status("DRAFT"))
        .await
        .expect("update");
    assert_eq!(updated.segment, "concept");
    assert_eq!(updated.version, 2);
}

#[tokio::test]
async fn assignment_can_be_set_and_cleared() {
    let h = harness().await;
    let id = h.ingest("src-1", "concept", "draft").await.item_id;

    let assigned = h
        .services
        .items
        .update(
            &id,
            1,
            ItemMutation {
                assigned_agent: Assignment::Set("writer-a".into()),
                ..ItemMutation::default()
            },
        )
        .await
        .expect("assign");
    assert_eq!(assigned.assigned_agent.as_deref(), Some("writer-a"));

    let cleared = h
        .services
        .items
        .update(
            &id,
            2,
            ItemMutation {
                assigned_agent: Assignment::Clear,
                ..ItemMutation::default()
            },
        )
        .await
        .expect("clear");
    assert!(cleared.assigned_agent.is_none());
    let stored = h.services.items.get(&id).await.expect("get");
    assert!(stored.assigned_agent.is_none());
}

#[tokio::test]
async fn metadata_clear_and_null_removal() {
    let h = harness().await;
    let id = h.ingest("src-1", "concept", "draft").await.item_id;

    let patched = h
        .services
        .items
        .update(
            &id,
            1,
            ItemMutation {
                metadata: Some(json!({ "summary": null, "reviewer": "ops-1" })),
                ..ItemMutation::default()
            },
        )
        .await
        .expect("patch");
    assert!(patched.metadata.get("summary").is_none());
    assert_eq!(patched.metadata["reviewer"], json!("ops-1"));
    assert_eq!(patched.metadata["source_id"], json!("src-1"));

    let cleared = h
        .services
        .items
        .update(
            &id,
            2,
            ItemMutation {
                clear_metadata: true,
                ..ItemMutation::default()
            },
        )
        .await
        .expect("clear");
    assert_eq!(cleared.metadata, json!({}));
}

#[tokio::test]
async fn concurrent_updates_with_same_version_succeed_once() {
    let h = harness().await;
    let id = h.ingest("src-1", "concept", "draft").await.item_id;
    let a = h.services.items.clone();
    let b = h.services.items.clone();

    let (ra, rb) = tokio::join!(
        a.update(&id, 1, ItemMutation::status("ready")),
        b.update(&id, 1, ItemMutation::status("done")),
    );

    let successes = [&ra, &rb].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    let failure = if ra.is_err() { ra } else { rb };
    assert!(matches!(failure, Err(AppError::VersionConflict(_))));

    let stored = h.services.items.get(&id).await.expect("get");
    assert_eq!(stored.version, 2);
}
