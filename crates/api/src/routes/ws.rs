use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::interval;

use docline_domain::identity::UserIdentity;

use crate::error::ApiError;
use crate::middleware::verify_token;
use crate::realtime::{
    EVENT_CONNECTION_ESTABLISHED, EVENT_CONNECTION_STATS, EVENT_PONG, EVENT_ROOM_SUBSCRIBED,
    EVENT_ROOM_UNSUBSCRIBED, EventEnvelope, OUTBOUND_QUEUE_DEPTH,
};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct WsQuery {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Ping,
    Subscribe { room: String },
    Unsubscribe { room: String },
    GetStats,
}

/// Authenticates before the upgrade; a missing or invalid token never
/// reaches the websocket layer.
pub(crate) async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let token = query.token.ok_or(ApiError::Unauthorized)?;
    let identity =
        verify_token(&state.config.jwt_secret, &token).ok_or(ApiError::Unauthorized)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, identity)))
}

async fn handle_socket(socket: WebSocket, state: AppState, identity: UserIdentity) {
    let (mut sink, mut incoming) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_QUEUE_DEPTH);

    let user_id = identity.user_id.clone();
    let connection_id = state.registry.connect(identity, tx);
    tracing::info!(%connection_id, %user_id, "websocket connected");

    let established = EventEnvelope::new(
        EVENT_CONNECTION_ESTABLISHED,
        json!({ "connection_id": connection_id, "user_id": user_id }),
    );
    state
        .registry
        .send_personal_message(&connection_id, &established);

    let mut heartbeat = interval(Duration::from_secs(state.config.ws_heartbeat_secs.max(1)));
    heartbeat.tick().await; // first tick is immediate

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(text) = outbound else { break };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            inbound = incoming.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&state, &connection_id, &text);
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        state.registry.touch_ping(&connection_id);
                        if sink.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
            _ = heartbeat.tick() => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.registry.disconnect(&connection_id);
    tracing::info!(%connection_id, "websocket disconnected");
}

/// Malformed or unrecognized client messages are logged and dropped; the
/// session stays open.
fn handle_client_message(state: &AppState, connection_id: &str, text: &str) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(err) => {
            tracing::debug!(%connection_id, error = %err, "unparseable websocket message");
            return;
        }
    };

    match message {
        ClientMessage::Ping => {
            state.registry.touch_ping(connection_id);
            let pong = EventEnvelope::new(EVENT_PONG, json!({}));
            state.registry.send_personal_message(connection_id, &pong);
        }
        ClientMessage::Subscribe { room } => {
            if state.registry.subscribe_to_room(connection_id, &room) {
                let ack = EventEnvelope::new(EVENT_ROOM_SUBSCRIBED, json!({ "room": room }));
                state.registry.send_personal_message(connection_id, &ack);
            }
        }
        ClientMessage::Unsubscribe { room } => {
            state.registry.unsubscribe_from_room(connection_id, &room);
            let ack = EventEnvelope::new(EVENT_ROOM_UNSUBSCRIBED, json!({ "room": room }));
            state.registry.send_personal_message(connection_id, &ack);
        }
        ClientMessage::GetStats => {
            let stats = state.registry.stats();
            let body = match serde_json::to_value(&stats) {
                Ok(value) => value,
                Err(_) => json!({}),
            };
            let envelope = EventEnvelope::new(EVENT_CONNECTION_STATS, body);
            state
                .registry
                .send_personal_message(connection_id, &envelope);
        }
    }
}
