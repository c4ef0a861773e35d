//! Native/Desktop WebSocket implementation using tokio-tungstenite.

use std::sync::Arc;

use futures_channel::mpsc::UnboundedReceiver;
use futures_util::{SinkExt, StreamExt};
use huddle_shared::{ClientCommand, ServerEvent, WsEnvelope};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::{ConnectionState, WsHandle};

type EventCallback = Arc<dyn Fn(WsEnvelope<ServerEvent>) + Send + Sync>;
type StateCallback = Arc<dyn Fn(ConnectionState) + Send + Sync>;

/// A WebSocket connection to the relay (native implementation).
///
/// Must be opened from within a tokio runtime.
pub struct WsConnection {
    handle: WsHandle,
}

impl WsConnection {
    /// Start connecting to `url`. Commands sent through [`Self::handle`]
    /// before the socket is open are queued and written once it is.
    pub fn open(
        url: impl Into<String>,
        on_event: impl Fn(WsEnvelope<ServerEvent>) + Send + Sync + 'static,
        on_state: impl Fn(ConnectionState) + Send + Sync + 'static,
    ) -> Self {
        let (handle, receiver) = WsHandle::channel(url);
        tokio::spawn(run_connection(
            handle.url.clone(),
            receiver,
            Arc::new(on_event),
            Arc::new(on_state),
        ));
        Self { handle }
    }

    /// Get a handle for sending commands
    pub fn handle(&self) -> WsHandle {
        self.handle.clone()
    }

    /// Close the connection (idempotent).
    pub fn close(&self) {
        self.handle.close();
    }
}

async fn run_connection(
    url: String,
    mut receiver: UnboundedReceiver<WsEnvelope<ClientCommand>>,
    on_event: EventCallback,
    on_state: StateCallback,
) {
    on_state(ConnectionState::Connecting);

    let ws_stream = match connect_async(url.as_str()).await {
        Ok((ws_stream, _response)) => ws_stream,
        Err(e) => {
            crate::log_error!("WebSocket error for {}: {}", url, e);
            on_state(ConnectionState::Failed {
                reason: e.to_string(),
            });
            return;
        }
    };

    on_state(ConnectionState::Connected);
    crate::log_info!("WebSocket connected to {}", url);

    let (mut write, mut read) = ws_stream.split();

    // Channel to signal when connection closes
    let (close_tx, mut close_rx) = tokio::sync::mpsc::unbounded_channel::<()>();

    // Read task
    let url_for_read = url.clone();
    let close_tx_for_read = close_tx.clone();
    let read_task = tokio::spawn(async move {
        while let Some(msg_result) = read.next().await {
            match msg_result {
                Ok(Message::Text(text)) => match WsEnvelope::<ServerEvent>::decode(text.as_str()) {
                    Ok(event) => on_event(event),
                    Err(e) => crate::log_warn!("Ignoring frame from {}: {}", url_for_read, e),
                },
                Ok(Message::Close(_)) => {
                    crate::log_info!("WebSocket to {} received close frame", url_for_read);
                    break;
                }
                Ok(_) => {
                    // Pings are answered by tungstenite; nothing else is expected
                }
                Err(e) => {
                    crate::log_error!("WebSocket read error: {}", e);
                    break;
                }
            }
        }
        let _ = close_tx_for_read.send(());
    });

    // Write task
    let url_for_write = url.clone();
    let write_task = tokio::spawn(async move {
        while let Some(cmd) = receiver.next().await {
            match cmd.encode() {
                Ok(json) => {
                    if let Err(e) = write.send(Message::Text(json.into())).await {
                        crate::log_error!("Send to {} failed: {}", url_for_write, e);
                        break;
                    }
                }
                Err(e) => crate::log_error!("Serialize failed: {}", e),
            }
        }
        // Handle closed locally: say goodbye
        let _ = write.close().await;
        let _ = close_tx.send(());
    });

    // Wait for either side to finish
    close_rx.recv().await;
    read_task.abort();
    write_task.abort();

    crate::log_info!("WebSocket to {} closed", url);
    on_state(ConnectionState::Disconnected);
}
