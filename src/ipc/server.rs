//! Local IPC server for `workqueue-ctl` commands.
//!
//! Listens on a named pipe (Windows) or Unix domain socket (Linux/macOS)
//! using the `interprocess` crate. Accepts line-delimited JSON commands
//! and routes them to the coordination services.
//!
//! ## Protocol
//!
//! Request (one JSON object per line):
//! ```json
//! {"command": "cleanup"}
//! {"command": "locks"}
//! {"command": "reclaim", "id": "item-123", "status": "ready"}
//! {"command": "preference", "role": "writer"}
//! {"command": "item", "id": "item-123"}
//! ```
//!
//! Response (one JSON object per line):
//! ```json
//! {"ok": true, "data": { ... } }
//! {"ok": false, "error": "not found: item item-123 not found"}
//! ```

use std::sync::Arc;

use interprocess::local_socket::{tokio::prelude::*, GenericNamespaced, ListenerOptions};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::state::AppState;
use crate::{AppError, Result};

/// Actor recorded in item history for operator commands.
const OPERATOR_ACTOR: &str = "operator";

/// Inbound IPC request from `workqueue-ctl`.
#[derive(Debug, Deserialize)]
struct IpcRequest {
    /// Command verb.
    command: String,
    /// Item identifier (for `reclaim`, `item`).
    id: Option<String>,
    /// Status applied by `reclaim`.
    status: Option<String>,
    /// Role key (for `preference`).
    role: Option<String>,
    /// Shared-secret authentication token.
    auth_token: Option<String>,
}

/// Outbound IPC response to `workqueue-ctl`.
#[derive(Debug, Serialize)]
struct IpcResponse {
    /// Whether the command succeeded.
    ok: bool,
    /// Payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl IpcResponse {
    fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }

    fn from_result<T: Serialize>(result: Result<T>) -> Self {
        match result.and_then(|value| {
            serde_json::to_value(value)
                .map_err(|err| AppError::Ipc(format!("failed to encode response: {err}")))
        }) {
            Ok(data) => Self::success(data),
            Err(err) => Self::error(err.to_string()),
        }
    }
}

/// Spawn the IPC server task.
///
/// # Errors
///
/// Returns `AppError::Ipc` if the listener cannot be created.
pub fn spawn_ipc_server(
    state: Arc<AppState>,
    ct: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    let name = state.config.ipc_name.clone();

    let listener_name = name
        .clone()
        .to_ns_name::<GenericNamespaced>()
        .map_err(|err| AppError::Ipc(format!("invalid ipc socket name '{name}': {err}")))?;

    let listener = ListenerOptions::new()
        .name(listener_name)
        .create_tokio()
        .map_err(|err| AppError::Ipc(format!("failed to create ipc listener: {err}")))?;

    info!(ipc_name = %name, "IPC server listening");

    let handle = tokio::spawn(
        async move {
            loop {
                tokio::select! {
                    () = ct.cancelled() => {
                        info!("IPC server shutting down");
                        break;
                    }
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok(stream) => {
                                tokio::spawn(handle_connection(stream, Arc::clone(&state)));
                            }
                            Err(err) => warn!(%err, "IPC accept failed"),
                        }
                    }
                }
            }
        }
        .instrument(info_span!("ipc_server", name = %name)),
    );

    Ok(handle)
}

/// Handle a single IPC client connection.
async fn handle_connection(stream: interprocess::local_socket::tokio::Stream, state: Arc<AppState>) {
    async move {
        let (reader, mut writer) = stream.split();
        let mut buf_reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            match buf_reader.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    let response = match serde_json::from_str::<IpcRequest>(trimmed) {
                        Ok(request) => dispatch_command(&request, &state).await,
                        Err(err) => IpcResponse::error(format!("invalid json: {err}")),
                    };

                    let mut response_line = serde_json::to_string(&response).unwrap_or_else(|_| {
                        r#"{"ok":false,"error":"serialization failed"}"#.to_owned()
                    });
                    response_line.push('\n');

                    if let Err(err) = writer.write_all(response_line.as_bytes()).await {
                        warn!(%err, "failed to write ipc response");
                        break;
                    }
                }
                Err(err) => {
                    warn!(%err, "ipc read error");
                    break;
                }
            }
        }
    }
    .instrument(info_span!("ipc_conn"))
    .await;
}

/// Route an IPC command to the matching service call.
async fn dispatch_command(request: &IpcRequest, state: &AppState) -> IpcResponse {
    if let Some(ref expected) = state.config.ipc_auth_token {
        match request.auth_token {
            Some(ref provided) if provided == expected => {}
            _ => {
                warn!(command = %request.command, "IPC request rejected: invalid auth token");
                return IpcResponse::error("unauthorized");
            }
        }
    }

    let services = &state.services;
    let span = info_span!("ipc_command", command = %request.command);
    async move {
        match request.command.as_str() {
            "cleanup" => IpcResponse::from_result(
                services
                    .locks
                    .cleanup_expired()
                    .await
                    .map(|reclaimed| json!({ "reclaimed": reclaimed })),
            ),
            "locks" => IpcResponse::from_result(
                services
                    .locks
                    .list_live()
                    .await
                    .map(|locks| json!({ "locks": locks })),
            ),
            "reclaim" => {
                let Some(ref id) = request.id else {
                    return IpcResponse::error("missing required 'id' field");
                };
                IpcResponse::from_result(
                    services
                        .claims
                        .reclaim(id, request.status.as_deref(), OPERATOR_ACTOR)
                        .await,
                )
            }
            "preference" => {
                let Some(ref role) = request.role else {
                    return IpcResponse::error("missing required 'role' field");
                };
                IpcResponse::from_result(services.registry.preference(role).await)
            }
            "item" => {
                let Some(ref id) = request.id else {
                    return IpcResponse::error("missing required 'id' field");
                };
                IpcResponse::from_result(services.items.get_with_history(id).await)
            }
            other => IpcResponse::error(format!("unknown command: {other}")),
        }
    }
    .instrument(span)
    .await
}
