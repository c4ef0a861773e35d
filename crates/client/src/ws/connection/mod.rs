//! WebSocket connection to the relay.
//!
//! This module provides the shared types and conditionally includes
//! the platform-specific implementation. Connections are opened once and
//! closed once; reconnecting is up to the embedder (open a new one).

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use huddle_shared::{ClientCommand, WsEnvelope};
use uuid::Uuid;

use crate::error::SessionError;

/// Connection state for a WebSocket
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Disconnected or failed: the connection will not come back.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected | ConnectionState::Failed { .. }
        )
    }
}

/// Handle for sending commands through a WebSocket connection.
///
/// Cloning shares the underlying queue; closing any clone closes the
/// connection for all of them.
#[derive(Debug, Clone)]
pub struct WsHandle {
    id: Uuid,
    sender: UnboundedSender<WsEnvelope<ClientCommand>>,
    pub url: String,
}

impl WsHandle {
    /// A handle plus the queue a transport drains to write frames.
    pub fn channel(url: impl Into<String>) -> (Self, UnboundedReceiver<WsEnvelope<ClientCommand>>) {
        let (sender, receiver) = unbounded();
        let handle = Self {
            id: Uuid::new_v4(),
            sender,
            url: url.into(),
        };
        (handle, receiver)
    }

    /// Identifies the connection this handle belongs to.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue a command for the server
    pub fn send(&self, cmd: ClientCommand) -> Result<(), SessionError> {
        crate::log_debug!("Queueing {} for {}", cmd.kind(), self.url);
        self.sender
            .unbounded_send(WsEnvelope::new(cmd))
            .map_err(|_| SessionError::LinkClosed)
    }

    /// Close the connection. Closing twice is a no-op.
    pub fn close(&self) {
        self.sender.close_channel();
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

// Include platform-specific implementation
#[cfg(target_arch = "wasm32")]
mod connection_wasm;
#[cfg(target_arch = "wasm32")]
pub use connection_wasm::WsConnection;

#[cfg(not(target_arch = "wasm32"))]
mod connection_native;
#[cfg(not(target_arch = "wasm32"))]
pub use connection_native::WsConnection;
