//! The transport adapter: upgrades one HTTP connection to a
//! WebSocket, authenticates and authorizes it, registers it with the hub,
//! and then just shuttles frames — all session semantics live in
//! `collab_core`.
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use collab_core::DiagramPermission;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Demo-only override used by integration tests to open a connection
    /// as a reader without standing up a real permission backend.
    permission: Option<String>,
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Path((threat_model_id, diagram_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let user = match state.auth.authenticate(bearer).await {
        Ok(user) => user,
        Err(_) => return (StatusCode::UNAUTHORIZED, "authentication failed").into_response(),
    };

    let permission = if query.permission.as_deref() == Some("reader") {
        DiagramPermission::Reader
    } else {
        match state
            .permissions
            .permission_for(&user, threat_model_id, diagram_id)
            .await
        {
            Ok(permission) => permission,
            Err(_) => return (StatusCode::FORBIDDEN, "permission lookup failed").into_response(),
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, threat_model_id, diagram_id, user, permission))
}

async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    threat_model_id: Uuid,
    diagram_id: Uuid,
    user: collab_core::User,
    permission: DiagramPermission,
) {
    let (_handle, client_id, mut outbound) = match state
        .hub
        .register(threat_model_id, diagram_id, user, permission)
        .await
    {
        Ok(joined) => joined,
        Err(e) => {
            warn!(diagram = %diagram_id, error = %e, "failed to join session");
            return;
        }
    };

    let (mut ws_tx, mut ws_rx) = socket.split();
    let config = state.config.clone();

    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(Duration::from_secs(config.ping_interval_seconds));
        let write_deadline = Duration::from_secs(config.write_deadline_seconds);
        loop {
            tokio::select! {
                maybe_msg = outbound.recv() => {
                    let Some(msg) = maybe_msg else { break };
                    let json = match serde_json::to_string(&msg) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(error = %e, "failed to serialize outbound message");
                            continue;
                        }
                    };
                    let send = ws_tx.send(WsMessage::Text(json));
                    if tokio::time::timeout(write_deadline, send).await.is_err() {
                        warn!(client = %client_id, "write deadline exceeded, closing");
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = ws_tx.close().await;
    });

    let read_deadline = Duration::from_secs(config.read_deadline_seconds);
    loop {
        let frame = match tokio::time::timeout(read_deadline, ws_rx.next()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) => {
                debug!(client = %client_id, error = %e, "websocket read error");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                debug!(client = %client_id, "read deadline exceeded");
                break;
            }
        };

        match frame {
            WsMessage::Text(text) => {
                if text.len() > config.max_message_bytes {
                    warn!(client = %client_id, size = text.len(), "oversized frame, closing connection");
                    state
                        .hub
                        .dispatch(
                            diagram_id,
                            client_id,
                            collab_core::Message::Error {
                                message: "frame exceeds max_message_bytes".to_string(),
                            },
                        )
                        .await;
                    break;
                }
                match serde_json::from_str::<collab_core::Message>(&text) {
                    Ok(msg) => state.hub.dispatch(diagram_id, client_id, msg).await,
                    Err(e) => debug!(client = %client_id, error = %e, "failed to parse inbound frame"),
                }
            }
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    state.hub.disconnect(diagram_id, client_id).await;
    writer.abort();
}
