//! `/items` endpoints.

use reqwest::StatusCode;
use serde_json::json;

use super::http_support::{body, TestServer};
use crate::test_helpers::{WRITER_A, WRITER_B};

#[tokio::test]
async fn get_item_includes_history() {
    let server = TestServer::start().await;
    let id = server.harness.ingest("x", "concept", "draft").await.item_id;

    let response = server.get(&format!("/items/{id}"), WRITER_B).await;
    assert_eq!(response.status(), StatusCode::OK);
    let detail = body(response).await;
    assert_eq!(detail["item"]["version"], json!(1));
    assert_eq!(detail["item"]["metadata"]["title"], json!("Task x"));
    assert_eq!(detail["history"][0]["note"], json!("ingested"));
}

#[tokio::test]
async fn patch_with_status_change_hands_off() {
    let server = TestServer::start().await;
    let id = server.harness.ingest("x", "concept", "draft").await.item_id;

    let response = server
        .patch(
            &format!("/items/{id}"),
            WRITER_A,
            json!({
                "expected_version": 1,
                "status_code": "done",
                "payload": { "result": "approved" },
                "note": "shipped",
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let detail = body(response).await;
    assert_eq!(detail["item"]["segment"], json!("qa"));
    assert_eq!(detail["item"]["status_code"], json!("done"));
    assert_eq!(detail["item"]["payload"]["result"], json!("approved"));
    assert_eq!(detail["history"][1]["segment"], json!("qa"));
    assert_eq!(detail["history"][1]["actor"], json!(WRITER_A));
}

#[tokio::test]
async fn patch_null_removes_key() {
    let server = TestServer::start().await;
    let id = server.harness.ingest("x", "concept", "draft").await.item_id;

    let detail = body(
        server
            .patch(
                &format!("/items/{id}"),
                WRITER_A,
                json!({ "expected_version": 1, "payload": { "brief": null } }),
            )
            .await,
    )
    .await;
    assert_eq!(detail["item"]["payload"], json!({}));
}
