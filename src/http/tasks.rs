//! Claim coordinator endpoints. "No task available" is `{"task": null}`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::models::item::QueueItem;
use crate::models::task::{
    AcceptRequest, AcceptedTask, ClaimRequest, ReleaseRequest, SubmitRequest, TaskOffer,
};
use crate::state::AppState;
use crate::Result;

use super::Caller;

#[derive(Debug, Serialize)]
pub(super) struct TaskResponse {
    task: Option<TaskOffer>,
}

pub(super) async fn next(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
) -> Result<Json<TaskResponse>> {
    let task = state.services.claims.find_next_task(&caller).await?;
    Ok(Json(TaskResponse { task }))
}

pub(super) async fn claim(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Json(body): Json<ClaimRequest>,
) -> Result<Json<TaskResponse>> {
    let task = state.services.claims.claim_task(&caller, &body).await?;
    Ok(Json(TaskResponse { task }))
}

pub(super) async fn accept(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(item_id): Path<String>,
    Json(body): Json<AcceptRequest>,
) -> Result<Json<AcceptedTask>> {
    let accepted = state
        .services
        .claims
        .accept_task(&caller, &item_id, body)
        .await?;
    Ok(Json(accepted))
}

pub(super) async fn release(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(item_id): Path<String>,
    Json(body): Json<ReleaseRequest>,
) -> Result<Json<QueueItem>> {
    let item = state
        .services
        .claims
        .release_task(&caller, &item_id, body)
        .await?;
    Ok(Json(item))
}

pub(super) async fn submit(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(item_id): Path<String>,
    Json(body): Json<SubmitRequest>,
) -> Result<Json<QueueItem>> {
    let item = state
        .services
        .claims
        .submit_task(&caller, &item_id, body)
        .await?;
    Ok(Json(item))
}
