//! Agent and role preference endpoints. Writes require `admin`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use crate::coordination::capability::{CAP_ADMIN, CAP_WORK};
use crate::models::agent::{Agent, AgentPreference};
use crate::state::AppState;
use crate::Result;

use super::Caller;

#[derive(Debug, Deserialize)]
pub(super) struct AgentBody {
    role_key: String,
    display_name: String,
    #[serde(default)]
    contact: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct PreferenceBody {
    primary_segments: Vec<String>,
    #[serde(default)]
    fallback_segments: Vec<String>,
    pickup_statuses: Vec<String>,
    #[serde(default)]
    active_statuses: Vec<String>,
    accept_status: String,
    return_status: String,
    max_in_progress_minutes: i64,
}

pub(super) async fn put_agent(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(agent_id): Path<String>,
    Json(body): Json<AgentBody>,
) -> Result<Json<Agent>> {
    let services = &state.services;
    services.capabilities.require(&caller, CAP_ADMIN).await?;
    let agent = Agent {
        id: agent_id,
        role_key: body.role_key,
        display_name: body.display_name,
        contact: body.contact,
    };
    Ok(Json(services.registry.upsert_agent(&agent).await?))
}

pub(super) async fn get_agent(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(agent_id): Path<String>,
) -> Result<Json<Agent>> {
    let services = &state.services;
    services.capabilities.require(&caller, CAP_WORK).await?;
    Ok(Json(services.registry.agent(&agent_id).await?))
}

pub(super) async fn put_preference(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(role_key): Path<String>,
    Json(body): Json<PreferenceBody>,
) -> Result<Json<AgentPreference>> {
    let services = &state.services;
    services.capabilities.require(&caller, CAP_ADMIN).await?;
    let preference = AgentPreference {
        role_key,
        primary_segments: body.primary_segments,
        fallback_segments: body.fallback_segments,
        pickup_statuses: body.pickup_statuses,
        active_statuses: body.active_statuses,
        accept_status: body.accept_status,
        return_status: body.return_status,
        max_in_progress_minutes: body.max_in_progress_minutes,
    };
    Ok(Json(services.registry.upsert_preference(&preference).await?))
}

pub(super) async fn get_preference(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(role_key): Path<String>,
) -> Result<Json<AgentPreference>> {
    let services = &state.services;
    services.capabilities.require(&caller, CAP_WORK).await?;
    Ok(Json(services.registry.preference(&role_key).await?))
}
