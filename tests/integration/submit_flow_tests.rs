//! Task completion through submission.

use serde_json::json;

use workqueue::coordination::claim::COMPLETED_STATUS;
use workqueue::models::lock::LockScope;
use workqueue::models::task::{AcceptRequest, SubmissionArtifact, SubmitRequest};
use workqueue::AppError;

use crate::test_helpers::{harness, ingest_request, Harness, OPS, PRODUCER, WRITER_A, WRITER_B};

/// Ingest a planned item and have `WRITER_A` reserve and accept it.
async fn accepted_item(h: &Harness) -> (String, i64) {
    let id = h.ingest("x", "concept", "draft").await.item_id;
    h.services
        .claims
        .find_next_task(WRITER_A)
        .await
        .expect("find")
        .expect("task");
    let accepted = h
        .services
        .claims
        .accept_task(
            WRITER_A,
            &id,
            AcceptRequest {
                expected_version: 1,
                ..AcceptRequest::default()
            },
        )
        .await
        .expect("accept");
    (id, accepted.item.version)
}

fn link(title: &str, url: &str) -> SubmissionArtifact {
    SubmissionArtifact {
        title: title.to_owned(),
        url: url.to_owned(),
    }
}

fn submit_at(version: i64) -> SubmitRequest {
    SubmitRequest {
        expected_version: version,
        artifacts: vec![link("Draft", "https://docs.example.com/quests/x")],
        notes: Some("ready for review".into()),
        metadata: None,
    }
}

#[tokio::test]
async fn submission_completes_and_hands_off() {
    let h = harness().await;
    let (id, version) = accepted_item(&h).await;

    let item = h
        .services
        .claims
        .submit_task(WRITER_A, &id, submit_at(version))
        .await
        .expect("submit");
    assert_eq!(item.status_code, COMPLETED_STATUS);
    assert_eq!(item.segment, "archive");
    assert_eq!(item.version, version + 1);
    assert_eq!(
        item.metadata["artifacts"],
        json!([{
            "title": "Draft",
            "url": "https://docs.example.com/quests/x",
            "submitted_by": WRITER_A,
        }])
    );

    let history = h.services.items.get_with_history(&id).await.expect("item").history;
    let last = history.last().expect("history");
    assert_eq!(last.note.as_deref(), Some("ready for review"));
    assert_eq!(last.status_code, COMPLETED_STATUS);
}

#[tokio::test]
async fn completed_condition_routes_to_its_target() {
    let h = harness().await;
    let mut request = ingest_request("y", "concept", "draft");
    if let Some(plan) = request.handoff_plan.as_mut() {
        plan.conditions[0].status = COMPLETED_STATUS.to_owned();
    }
    let id = h
        .services
        .ingestion
        .ingest(PRODUCER, request)
        .await
        .expect("ingest")
        .item_id;
    h.services
        .claims
        .accept_task(
            WRITER_A,
            &id,
            AcceptRequest {
                expected_version: 1,
                ..AcceptRequest::default()
            },
        )
        .await
        .expect("accept");

    let item = h
        .services
        .claims
        .submit_task(WRITER_A, &id, submit_at(2))
        .await
        .expect("submit");
    assert_eq!(item.segment, "qa");
}

#[tokio::test]
async fn submission_drops_lease() {
    let h = harness().await;
    let (id, version) = accepted_item(&h).await;
    assert!(h
        .services
        .locks
        .live_lock(LockScope::Item, &id)
        .await
        .expect("query")
        .is_some());

    h.services
        .claims
        .submit_task(WRITER_A, &id, submit_at(version))
        .await
        .expect("submit");
    assert!(h
        .services
        .locks
        .live_lock(LockScope::Item, &id)
        .await
        .expect("query")
        .is_none());
    assert_eq!(h.lock_rows().await, 0);
}

#[tokio::test]
async fn submission_after_lease_lapse_is_still_allowed() {
    let h = harness().await;
    let (id, version) = accepted_item(&h).await;
    h.advance(31 * 60);
    h.services.locks.cleanup_expired().await.expect("sweep");

    h.services
        .claims
        .submit_task(WRITER_A, &id, submit_at(version))
        .await
        .expect("owner submits without a lease");
}

#[tokio::test]
async fn non_owner_cannot_submit() {
    let h = harness().await;
    let (id, version) = accepted_item(&h).await;

    for agent in [WRITER_B, OPS] {
        let err = h
            .services
            .claims
            .submit_task(agent, &id, submit_at(version))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    let unassigned = h.ingest("z", "concept", "draft").await.item_id;
    let err = h
        .services
        .claims
        .submit_task(WRITER_A, &unassigned, submit_at(1))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn submission_requires_an_artifact() {
    let h = harness().await;
    let (id, version) = accepted_item(&h).await;

    let mut request = submit_at(version);
    request.artifacts = vec![link("  ", "https://docs.example.com/x"), link("Draft", "")];
    let err = h
        .services
        .claims
        .submit_task(WRITER_A, &id, request)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let mut request = submit_at(version);
    request.artifacts.clear();
    let err = h
        .services
        .claims
        .submit_task(WRITER_A, &id, request)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let stored = h.services.items.get(&id).await.expect("item");
    assert_eq!(stored.version, version);
    assert!(h
        .services
        .locks
        .live_lock(LockScope::Item, &id)
        .await
        .expect("query")
        .is_some());
}

#[tokio::test]
async fn stale_submission_conflicts() {
    let h = harness().await;
    let (id, version) = accepted_item(&h).await;

    let err = h
        .services
        .claims
        .submit_task(WRITER_A, &id, submit_at(version - 1))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::VersionConflict(_)));
}

#[tokio::test]
async fn submission_merges_metadata_and_accumulates_artifacts() {
    let h = harness().await;
    let id = h.ingest_unplanned("u", "concept", "draft").await.item_id;
    h.services
        .claims
        .accept_task(
            WRITER_A,
            &id,
            AcceptRequest {
                expected_version: 1,
                ..AcceptRequest::default()
            },
        )
        .await
        .expect("accept");

    let mut first = submit_at(2);
    first.metadata = Some(json!({ "word_count": 1200 }));
    h.services
        .claims
        .submit_task(WRITER_A, &id, first)
        .await
        .expect("first submit");

    let mut second = submit_at(3);
    second.artifacts = vec![link("Revision", "/api/drafts/2")];
    let item = h
        .services
        .claims
        .submit_task(WRITER_A, &id, second)
        .await
        .expect("second submit");
    assert_eq!(item.metadata["word_count"], json!(1200));
    assert_eq!(item.metadata["artifacts"].as_array().map(Vec::len), Some(2));
    assert_eq!(item.metadata["source_id"], json!("u"));

    let mut bad = submit_at(4);
    bad.metadata = Some(json!(["not", "an", "object"]));
    let err = h
        .services
        .claims
        .submit_task(WRITER_A, &id, bad)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}
