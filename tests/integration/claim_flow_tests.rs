//! Reservation and acceptance flows through the claim coordinator.

use serde_json::json;

use workqueue::models::item::ItemMutation;
use workqueue::models::lock::LockScope;
use workqueue::models::task::{AcceptRequest, ClaimRequest};
use workqueue::AppError;

use crate::test_helpers::{harness, PULLER, WRITER_A, WRITER_B};

fn accept_at(version: i64) -> AcceptRequest {
    AcceptRequest {
        expected_version: version,
        ..AcceptRequest::default()
    }
}

#[tokio::test]
async fn oldest_item_is_offered_first() {
    let h = harness().await;
    let older = h.ingest("a", "concept", "draft").await;
    let newer = h.ingest("b", "concept", "draft").await;

    let offer = h
        .services
        .claims
        .find_next_task(WRITER_A)
        .await
        .expect("find")
        .expect("task available");
    assert_eq!(offer.item.id, older.item_id);
    assert_eq!(offer.recommended_status.as_deref(), Some("in_review"));
    assert_eq!(offer.ttl_minutes, 30);
    assert!(offer.requires_acceptance);
    assert_eq!(offer.lease.lock.holder, WRITER_A);

    let next = h
        .services
        .claims
        .find_next_task(WRITER_B)
        .await
        .expect("find")
        .expect("second task");
    assert_eq!(next.item.id, newer.item_id);
}

#[tokio::test]
async fn reservation_does_not_mutate_item() {
    let h = harness().await;
    let id = h.ingest("a", "concept", "draft").await.item_id;

    let offer = h
        .services
        .claims
        .find_next_task(WRITER_A)
        .await
        .expect("find")
        .expect("task");
    assert_eq!(offer.item.version, 1);

    let stored = h.services.items.get(&id).await.expect("item");
    assert_eq!(stored.version, 1);
    assert_eq!(stored.status_code, "draft");
    assert!(stored.assigned_agent.is_none());
}

#[tokio::test]
async fn primary_segment_preempts_older_fallback_item() {
    let h = harness().await;
    h.ingest("old-backlog", "backlog", "draft").await;
    let primary = h.ingest("new-concept", "concept", "draft").await;

    let offer = h
        .services
        .claims
        .find_next_task(WRITER_A)
        .await
        .expect("find")
        .expect("task");
    assert_eq!(offer.item.id, primary.item_id);
    assert_eq!(offer.item.segment, "concept");
}

#[tokio::test]
async fn fallback_segment_used_when_primary_is_empty() {
    let h = harness().await;
    let fallback = h.ingest("only-backlog", "backlog", "ready").await;

    let offer = h
        .services
        .claims
        .find_next_task(WRITER_A)
        .await
        .expect("find")
        .expect("task");
    assert_eq!(offer.item.id, fallback.item_id);
}

#[tokio::test]
async fn nothing_claimable_returns_none() {
    let h = harness().await;
    h.ingest("wrong-status", "concept", "blocked").await;
    h.ingest("wrong-segment", "qa", "draft").await;

    let offer = h.services.claims.find_next_task(WRITER_A).await.expect("find");
    assert!(offer.is_none());
}

#[tokio::test]
async fn scan_pages_past_locked_candidates() {
    let h = harness().await;
    let mut ids = Vec::new();
    for n in 0..5 {
        ids.push(h.ingest(&format!("src-{n}"), "concept", "draft").await.item_id);
    }
    for id in &ids[..4] {
        h.services
            .locks
            .acquire(LockScope::Item, id, WRITER_B, 600)
            .await
            .expect("pre-lock");
    }

    let offer = h
        .services
        .claims
        .find_next_task(WRITER_A)
        .await
        .expect("find")
        .expect("task");
    assert_eq!(offer.item.id, ids[4]);
}

#[tokio::test]
async fn concurrent_finders_reserve_distinct_items() {
    let h = harness().await;
    h.ingest("a", "concept", "draft").await;
    h.ingest("b", "concept", "draft").await;

    let claims_a = h.services.claims.clone();
    let claims_b = h.services.claims.clone();
    let (ra, rb) = tokio::join!(
        claims_a.find_next_task(WRITER_A),
        claims_b.find_next_task(WRITER_B),
    );
    let a = ra.expect("a").expect("a task");
    let b = rb.expect("b").expect("b task");
    assert_ne!(a.item.id, b.item.id);
}

#[tokio::test]
async fn single_item_race_has_one_winner() {
    let h = harness().await;
    h.ingest("only", "concept", "draft").await;

    let claims_a = h.services.claims.clone();
    let claims_b = h.services.claims.clone();
    let (ra, rb) = tokio::join!(
        claims_a.find_next_task(WRITER_A),
        claims_b.find_next_task(WRITER_B),
    );
    let winners = [ra.expect("a"), rb.expect("b")]
        .into_iter()
        .flatten()
        .count();
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn accept_commits_status_and_assignment() {
    let h = harness().await;
    h.ingest("x", "concept", "draft").await;

    let offer = h
        .services
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
            &offer.item.id,
            AcceptRequest {
                expected_version: offer.item.version,
                status_code: offer.recommended_status.clone(),
                note: Some("starting".into()),
                payload: Some(json!({ "draft_url": "/api/drafts/1" })),
                metadata: None,
            },
        )
        .await
        .expect("accept");

    assert_eq!(accepted.item.status_code, "in_review");
    assert_eq!(accepted.item.segment, "archive");
    assert_eq!(accepted.item.version, 2);
    assert_eq!(accepted.item.assigned_agent.as_deref(), Some(WRITER_A));
    assert_eq!(accepted.item.payload["draft_url"], json!("/api/drafts/1"));
    assert_eq!(accepted.ttl_minutes, 30);
    assert_eq!(accepted.lease.lock.id, offer.lease.lock.id);
    assert_ne!(accepted.lease.token, offer.lease.token);
}

#[tokio::test]
async fn accept_without_status_uses_role_default() {
    let h = harness().await;
    let id = h.ingest("x", "concept", "draft").await.item_id;

    let accepted = h
        .services
        .claims
        .accept_task(WRITER_A, &id, accept_at(1))
        .await
        .expect("accept");
    assert_eq!(accepted.item.status_code, "in_review");
}

#[tokio::test]
async fn second_accept_with_stale_version_conflicts() {
    let h = harness().await;
    h.ingest("x", "concept", "draft").await;

    let offer = h
        .services
        .claims
        .find_next_task(WRITER_A)
        .await
        .expect("find")
        .expect("task");
    let original_version = offer.item.version;

    h.services
        .claims
        .accept_task(WRITER_A, &offer.item.id, accept_at(original_version))
        .await
        .expect("A accepts");

    let err = h
        .services
        .claims
        .accept_task(WRITER_B, &offer.item.id, accept_at(original_version))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::VersionConflict(_)));

    let lease = h
        .services
        .locks
        .live_lock(LockScope::Item, &offer.item.id)
        .await
        .expect("query")
        .expect("A keeps the lease");
    assert_eq!(lease.holder, WRITER_A);
}

#[tokio::test]
async fn lapsed_reservation_still_accepts_unchanged_item() {
    let h = harness().await;
    h.ingest("x", "concept", "draft").await;
    let first = h
        .services
        .claims
        .find_next_task(WRITER_A)
        .await
        .expect("find")
        .expect("task");

    h.advance(31 * 60);
    let second = h
        .services
        .claims
        .find_next_task(WRITER_B)
        .await
        .expect("find")
        .expect("lapsed reservation is claimable");
    assert_eq!(second.item.id, first.item.id);
    assert_eq!(second.item.version, 1);

    let accepted = h
        .services
        .claims
        .accept_task(WRITER_A, &first.item.id, accept_at(first.item.version))
        .await
        .expect("unchanged item accepts after lease lapse");
    assert_eq!(accepted.item.assigned_agent.as_deref(), Some(WRITER_A));
    assert_eq!(accepted.lease.lock.holder, WRITER_A);

    let err = h
        .services
        .claims
        .accept_task(WRITER_B, &second.item.id, accept_at(second.item.version))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::VersionConflict(_)));

    let err = h
        .services
        .locks
        .release(&second.lease.token, WRITER_B)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::LockUnavailable(_)));
}

#[tokio::test]
async fn accept_moves_live_reservation_to_accepter() {
    let h = harness().await;
    h.ingest("x", "concept", "draft").await;
    let offer = h
        .services
        .claims
        .find_next_task(WRITER_A)
        .await
        .expect("find")
        .expect("task");

    let accepted = h
        .services
        .claims
        .accept_task(WRITER_B, &offer.item.id, accept_at(offer.item.version))
        .await
        .expect("version check decides the winner");
    assert_eq!(accepted.item.assigned_agent.as_deref(), Some(WRITER_B));

    let lease = h
        .services
        .locks
        .live_lock(LockScope::Item, &offer.item.id)
        .await
        .expect("query")
        .expect("lease");
    assert_eq!(lease.holder, WRITER_B);
    assert_eq!(h.lock_rows().await, 1);

    let err = h
        .services
        .claims
        .accept_task(WRITER_A, &offer.item.id, accept_at(offer.item.version))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::VersionConflict(_)));
}

#[tokio::test]
async fn accept_unknown_item_is_not_found() {
    let h = harness().await;
    let err = h
        .services
        .claims
        .accept_task(WRITER_A, "missing", accept_at(1))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn active_status_items_are_not_offered() {
    let h = harness().await;
    let id = h.ingest_unplanned("x", "concept", "draft").await.item_id;
    h.services
        .claims
        .accept_task(WRITER_A, &id, accept_at(1))
        .await
        .expect("accept");
    h.services
        .locks
        .release_target(LockScope::Item, &id, None)
        .await
        .expect("drop lease");

    let offer = h.services.claims.find_next_task(WRITER_B).await.expect("find");
    assert!(offer.is_none());
}

#[tokio::test]
async fn blocked_item_is_never_leased() {
    let h = harness().await;
    let id = h.ingest("x", "concept", "draft").await.item_id;
    h.services
        .items
        .update(&id, 1, ItemMutation::status("blocked"))
        .await
        .expect("block");

    let offer = h.services.claims.find_next_task(WRITER_A).await.expect("find");
    assert!(offer.is_none());
    assert!(h
        .services
        .locks
        .live_lock(LockScope::Item, &id)
        .await
        .expect("query")
        .is_none());
}

#[tokio::test]
async fn claim_task_honours_priority_floor() {
    let h = harness().await;
    h.ingest_with_priority("low", "qa", 10).await;
    let high = h.ingest_with_priority("high", "qa", 80).await;

    let offer = h
        .services
        .claims
        .claim_task(
            PULLER,
            &ClaimRequest {
                segments: vec!["QA".into()],
                priority_floor: 50,
                statuses: vec!["draft".into()],
            },
        )
        .await
        .expect("claim")
        .expect("task");
    assert_eq!(offer.item.id, high.item_id);
    assert!(offer.recommended_status.is_none());
    assert_eq!(offer.ttl_minutes, 1);
}

#[tokio::test]
async fn claim_task_walks_segments_in_order() {
    let h = harness().await;
    h.ingest("backlog-item", "backlog", "draft").await;
    let qa = h.ingest("qa-item", "qa", "draft").await;

    let offer = h
        .services
        .claims
        .claim_task(
            WRITER_A,
            &ClaimRequest {
                segments: vec!["qa".into(), "backlog".into()],
                priority_floor: 0,
                statuses: Vec::new(),
            },
        )
        .await
        .expect("claim")
        .expect("task");
    assert_eq!(offer.item.id, qa.item_id);
    assert_eq!(offer.recommended_status.as_deref(), Some("in_review"));
    assert_eq!(offer.ttl_minutes, 30);
}

#[tokio::test]
async fn claim_task_and_find_next_share_leases() {
    let h = harness().await;
    h.ingest("only", "concept", "draft").await;

    h.services
        .claims
        .claim_task(
            PULLER,
            &ClaimRequest {
                segments: vec!["concept".into()],
                priority_floor: 0,
                statuses: vec!["draft".into()],
            },
        )
        .await
        .expect("claim")
        .expect("task");

    let offer = h.services.claims.find_next_task(WRITER_A).await.expect("find");
    assert!(offer.is_none());
}

#[tokio::test]
async fn claim_task_requires_statuses_without_preference() {
    let h = harness().await;
    let err = h
        .services
        .claims
        .claim_task(
            PULLER,
            &ClaimRequest {
                segments: vec!["concept".into()],
                priority_floor: 0,
                statuses: Vec::new(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = h
        .services
        .claims
        .claim_task(PULLER, &ClaimRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn find_next_requires_registered_agent_and_preference() {
    let h = harness().await;
    let err = h.services.claims.find_next_task("ghost").await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let err = h.services.claims.find_next_task(PULLER).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}
