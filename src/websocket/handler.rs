use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::auth::Claims;
use crate::connection_manager::Connection;
use crate::server::AppState;
use crate::transport::{ChannelTransport, OutboundMessage};

use super::message::{ClientMessage, ServerMessage};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// WebSocket upgrade handler
#[tracing::instrument(
    name = "ws.upgrade",
    skip(ws, state, query, headers),
    fields(has_query_token = query.token.is_some())
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    // Extract token from query parameter or Authorization header
    let Some(token) = extract_token(&query, &headers) else {
        return (StatusCode::UNAUTHORIZED, "Missing authentication token").into_response();
    };

    let claims = match state.jwt_validator.validate(&token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!(error = %e, "JWT validation failed");
            return (StatusCode::UNAUTHORIZED, "Invalid token").into_response();
        }
    };

    tracing::info!(user_id = %claims.sub, "WebSocket upgrade requested");

    ws.on_upgrade(move |socket| handle_socket(socket, state, claims))
}

/// Extract token from query parameter or Authorization header
fn extract_token(query: &WsQuery, headers: &HeaderMap) -> Option<String> {
    if let Some(ref token) = query.token {
        return Some(token.clone());
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Handle an established WebSocket connection
#[tracing::instrument(name = "ws.connection", skip(socket, state, claims), fields(user_id = %claims.sub))]
async fn handle_socket(socket: WebSocket, state: AppState, claims: Claims) {
    let connection_start = std::time::Instant::now();
    let (transport, rx) = ChannelTransport::pair(state.settings.websocket.channel_buffer_size);

    let mut metadata = BTreeMap::new();
    if let Some(device) = &claims.device {
        metadata.insert("device".to_string(), serde_json::json!(device));
    }

    let connection = match state
        .manager
        .add_connection_by_user(&claims.sub, Box::new(transport), metadata)
    {
        Ok(conn) => conn,
        Err(e) => {
            // Not registered, so the frame goes straight onto the socket
            let (mut ws_sender, _) = socket.split();
            let error = serde_json::to_string(&ServerMessage::error("CONNECTION_REJECTED", e.to_string()));
            if let Ok(json) = error {
                let _ = ws_sender.send(Message::Text(json.into())).await;
            }
            let _ = ws_sender.close().await;
            return;
        }
    };
    let connection_id = connection.connection_id.clone();

    tracing::info!(
        connection_id = %connection_id,
        user_id = %connection.user_id,
        "WebSocket connection established"
    );

    let (ws_sender, mut ws_receiver) = socket.split();
    let mut send_task = tokio::spawn(write_frames(ws_sender, rx));

    let state_clone = state.clone();
    let conn_clone = connection.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_message(msg, &state_clone, &conn_clone).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = &mut send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
            recv_task.abort();
        }
        _ = &mut recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
            send_task.abort();
        }
    }

    // Already gone when the server closed it (cleanup, shutdown)
    drop(connection);
    state.manager.remove_connection(connection_id.as_str()).await;

    tracing::info!(
        connection_id = %connection_id,
        duration_secs = connection_start.elapsed().as_secs_f64(),
        "WebSocket connection closed"
    );
}

/// Drain the transport's channel onto the socket
async fn write_frames(
    mut ws_sender: futures::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<OutboundMessage>,
) {
    while let Some(msg) = rx.recv().await {
        let text = match msg.to_json() {
            Some(Ok(text)) => text,
            Some(Err(e)) => {
                tracing::error!(error = %e, "Failed to serialize frame");
                continue;
            }
            None => {
                let _ = ws_sender.close().await;
                break;
            }
        };

        if ws_sender.send(Message::Text(text.into())).await.is_err() {
            break;
        }
    }
}

/// Process a received WebSocket message
/// Returns false if the connection should be closed
async fn process_message(msg: Message, state: &AppState, conn: &Arc<Connection>) -> bool {
    match msg {
        Message::Text(text) => {
            conn.touch();

            let reply = match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Ping) => ServerMessage::Pong,
                Err(e) => {
                    tracing::debug!(
                        connection_id = %conn.connection_id,
                        error = %e,
                        "Failed to parse client message"
                    );
                    ServerMessage::error("INVALID_MESSAGE", e.to_string())
                }
            };

            state
                .manager
                .send_to_connection(conn.connection_id.as_str(), reply)
                .await;
            true
        }
        Message::Binary(_) => {
            state
                .manager
                .send_to_connection(
                    conn.connection_id.as_str(),
                    ServerMessage::error("UNSUPPORTED_FORMAT", "Binary messages are not supported"),
                )
                .await;
            true
        }
        Message::Ping(_) | Message::Pong(_) => {
            // Axum answers pings itself; only record activity
            conn.touch();
            true
        }
        Message::Close(_) => {
            tracing::debug!(connection_id = %conn.connection_id, "Received close frame");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_token_prefers_query() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));

        let query = WsQuery {
            token: Some("from-query".to_string()),
        };
        assert_eq!(extract_token(&query, &headers).as_deref(), Some("from-query"));

        let query = WsQuery { token: None };
        assert_eq!(extract_token(&query, &headers).as_deref(), Some("from-header"));
    }

    #[test]
    fn test_extract_token_missing() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(extract_token(&WsQuery { token: None }, &headers).is_none());
    }
}
