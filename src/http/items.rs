//! Item read/update and ingestion endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::coordination::capability::CAP_WORK;
use crate::models::ingest::{IngestRequest, IngestResult};
use crate::models::item::{ItemUpdateRequest, ItemWithHistory};
use crate::state::AppState;
use crate::Result;

use super::Caller;

pub(super) async fn get_item(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(item_id): Path<String>,
) -> Result<Json<ItemWithHistory>> {
    let services = &state.services;
    services.capabilities.require(&caller, CAP_WORK).await?;
    let item = services.items.get_with_history(&item_id).await?;
    Ok(Json(item))
}

pub(super) async fn update_item(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(item_id): Path<String>,
    Json(body): Json<ItemUpdateRequest>,
) -> Result<Json<ItemWithHistory>> {
    let updated = state
        .services
        .claims
        .update_item(&caller, &item_id, body)
        .await?;
    Ok(Json(updated))
}

pub(super) async fn ingest(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Json(body): Json<IngestRequest>,
) -> Result<(StatusCode, Json<IngestResult>)> {
    let result = state.services.ingestion.ingest(&caller, body).await?;
    Ok((StatusCode::CREATED, Json(result)))
}
