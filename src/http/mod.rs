//! HTTP API (axum).
//!
//! Callers identify themselves with the `x-agent-id` header; every handler
//! resolves that agent through the capability check before touching the
//! core. Errors render as `{"code", "message", "retryable"}`.

mod items;
mod locks;
mod registry;
mod tasks;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::state::AppState;
use crate::{AppError, Result};

/// Header carrying the calling agent's id.
pub const AGENT_HEADER: &str = "x-agent-id";

/// Calling agent, taken from [`AGENT_HEADER`].
#[derive(Debug, Clone)]
pub struct Caller(pub String);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        parts
            .headers
            .get(AGENT_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Self(value.to_owned()))
            .ok_or_else(|| AppError::Forbidden(format!("missing {AGENT_HEADER} header")))
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::VersionConflict(_) | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::LockUnavailable(_) => StatusCode::LOCKED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) | Self::Db(_) | Self::Ipc(_) | Self::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.code(), %self, "request failed");
        }
        let body = json!({
            "code": self.code(),
            "message": self.to_string(),
            "retryable": self.retryable(),
        });
        (status, Json(body)).into_response()
    }
}

/// Build the API router over `state`.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/locks", post(locks::acquire))
        .route("/locks/release", post(locks::release))
        .route("/locks/cleanup", post(locks::cleanup))
        .route("/tasks/next", post(tasks::next))
        .route("/tasks/claim", post(tasks::claim))
        .route("/tasks/{id}/accept", post(tasks::accept))
        .route("/tasks/{id}/release", post(tasks::release))
        .route("/tasks/{id}/submit", post(tasks::submit))
        .route("/items/{id}", get(items::get_item).patch(items::update_item))
        .route("/ingest", post(items::ingest))
        .route("/agents/{id}", put(registry::put_agent).get(registry::get_agent))
        .route(
            "/preferences/{role}",
            put(registry::put_preference).get(registry::get_preference),
        )
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

/// Bind the API listener on the configured address.
///
/// # Errors
///
/// Returns `AppError::Config` for an unparsable address, or `AppError::Io`
/// if the port cannot be bound.
pub async fn bind(bind_address: &str, port: u16) -> Result<TcpListener> {
    let addr: SocketAddr = format!("{bind_address}:{port}")
        .parse()
        .map_err(|err| AppError::Config(format!("invalid bind address {bind_address}: {err}")))?;
    TcpListener::bind(addr)
        .await
        .map_err(|err| AppError::Io(format!("failed to bind http on {addr}: {err}")))
}

/// Serve the API on `listener` until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Io` if the server fails.
pub async fn serve(state: Arc<AppState>, listener: TcpListener, ct: CancellationToken) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "http api listening");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Io(format!("http server error: {err}")))?;

    info!("http api shut down");
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let response = next.run(request).await;
    debug!(%method, %path, status = response.status().as_u16(), "http request");
    response
}
