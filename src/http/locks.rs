//! Lease endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::coordination::capability::{CAP_ADMIN, CAP_WORK};
use crate::models::lock::{Lock, LockGrant, LockScope};
use crate::state::AppState;
use crate::{AppError, Result};

use super::Caller;

#[derive(Debug, Deserialize)]
pub(super) struct AcquireBody {
    scope: LockScope,
    target_id: String,
    #[serde(default)]
    holder: Option<String>,
    #[serde(default)]
    ttl_seconds: i64,
}

#[derive(Debug, Deserialize)]
pub(super) struct ReleaseBody {
    token: String,
}

pub(super) async fn acquire(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Json(body): Json<AcquireBody>,
) -> Result<Json<LockGrant>> {
    let services = &state.services;
    let agent = services.capabilities.require(&caller, CAP_WORK).await?;
    let holder = body.holder.unwrap_or_else(|| agent.id.clone());
    if holder != agent.id && !services.capabilities.agent_has(&agent, CAP_ADMIN) {
        return Err(AppError::Forbidden(
            "only admins may acquire leases for another holder".into(),
        ));
    }

    let grant = services
        .locks
        .acquire(body.scope, &body.target_id, &holder, body.ttl_seconds)
        .await?;
    Ok(Json(grant))
}

pub(super) async fn release(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Json(body): Json<ReleaseBody>,
) -> Result<Json<Lock>> {
    let services = &state.services;
    let agent = services.capabilities.require(&caller, CAP_WORK).await?;
    let lock = services.locks.release(&body.token, &agent.id).await?;
    Ok(Json(lock))
}

pub(super) async fn cleanup(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
) -> Result<Json<Value>> {
    let services = &state.services;
    services.capabilities.require(&caller, CAP_ADMIN).await?;
    let reclaimed = services.locks.cleanup_expired().await?;
    Ok(Json(json!({ "reclaimed": reclaimed })))
}
