//! WebSocket endpoint: one task pair per connection feeding the relay.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use huddle_shared::WsEnvelope;
use uuid::Uuid;

use crate::frame::RelayFrame;
use crate::state::AppState;

/// WebSocket upgrade handler. No authentication: identities are whatever the
/// client announces.
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let conn_id = Uuid::new_v4();
    let mut outbox = state.relay.connect(conn_id).await;
    let heartbeat = state.config.heartbeat_interval;
    let idle_timeout = state.config.idle_timeout;

    tracing::info!("Connection {} opened", conn_id);

    // Writer: relayed events plus periodic pings
    let send_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(heartbeat);
        ticker.tick().await;

        loop {
            tokio::select! {
                event = outbox.recv() => {
                    let Some(event) = event else { break };
                    let json = match event.encode() {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::error!("Failed to encode {}: {}", event.payload.kind, e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if sender.send(Message::Ping(Default::default())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Reader: any inbound frame, pongs included, counts as liveness
    loop {
        let msg = match tokio::time::timeout(idle_timeout, receiver.next()).await {
            Err(_) => {
                tracing::info!("Connection {} silent for {:?}, dropping", conn_id, idle_timeout);
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                tracing::debug!("Connection {} read error: {}", conn_id, e);
                break;
            }
            Ok(Some(Ok(msg))) => msg,
        };

        match msg {
            Message::Text(text) => match WsEnvelope::<RelayFrame>::decode(text.as_str()) {
                Ok(envelope) => {
                    state.relay.dispatch(conn_id, envelope).await;
                }
                Err(e) => tracing::warn!("Dropping frame from {}: {}", conn_id, e),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    send_task.abort();
    state.relay.disconnect(conn_id).await;

    tracing::info!("Connection {} closed", conn_id);
}
