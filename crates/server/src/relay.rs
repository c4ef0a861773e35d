//! Event relay: fans client commands out to the other connections.
//!
//! Addressing rules:
//!
//! | command          | relayed as        | delivered to            |
//! |------------------|-------------------|-------------------------|
//! | `user.join`      | `user.joined`     | everyone, sender too    |
//! | `message.send`   | `message.new`     | everyone, sender too    |
//! | `message.delete` | `message.deleted` | everyone, sender too    |
//! | `typing.start`   | `typing.start`    | everyone but the sender |
//! | `typing.stop`    | `typing.stop`     | everyone but the sender |
//!
//! On disconnect a `user.left` is broadcast to everyone still connected, but
//! only if the connection had joined. Only the type tag is read: `data` goes
//! out exactly as it came in, so any connection may speak for any identity
//! or delete any message id.

use std::collections::HashMap;

use huddle_shared::{CommandKind, Identity, WsEnvelope, USER_LEFT};
use tokio::sync::{mpsc, RwLock};

use crate::frame::RelayFrame;
use crate::registry::{ConnectionId, ConnectionRegistry};

/// Per-connection outgoing queue, drained by the socket writer task.
pub type Outbox = mpsc::UnboundedSender<WsEnvelope<RelayFrame>>;

/// Who receives a relayed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Everyone,
    EveryoneExcept(ConnectionId),
}

impl Audience {
    pub fn includes(&self, conn_id: &ConnectionId) -> bool {
        match self {
            Audience::Everyone => true,
            Audience::EveryoneExcept(excluded) => excluded != conn_id,
        }
    }
}

#[derive(Default)]
struct RelayInner {
    registry: ConnectionRegistry,
    peers: HashMap<ConnectionId, Outbox>,
}

impl RelayInner {
    fn fan_out(&self, audience: Audience, event: WsEnvelope<RelayFrame>) -> usize {
        let mut delivered = 0;
        for (conn_id, outbox) in &self.peers {
            if !audience.includes(conn_id) {
                continue;
            }
            if outbox.send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                tracing::debug!("Outbox for {} already closed", conn_id);
            }
        }
        delivered
    }
}

/// Registry plus recipient table, guarded by one lock so that joins, leaves
/// and messages are observed in the same order by every connection.
#[derive(Default)]
pub struct Relay {
    inner: RwLock<RelayInner>,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a command from `from` to its audience and outgoing event.
    /// `None` for a type outside the command set.
    pub fn route(from: ConnectionId, frame: RelayFrame) -> Option<(Audience, RelayFrame)> {
        let kind = CommandKind::from_tag(&frame.kind)?;
        let audience = match kind {
            CommandKind::Join | CommandKind::SendMessage | CommandKind::DeleteMessage => {
                Audience::Everyone
            }
            CommandKind::Typing | CommandKind::StopTyping => Audience::EveryoneExcept(from),
        };
        Some((audience, RelayFrame::new(kind.event_tag(), frame.data)))
    }

    /// Add a connection to the recipient table and hand back its queue.
    pub async fn connect(
        &self,
        conn_id: ConnectionId,
    ) -> mpsc::UnboundedReceiver<WsEnvelope<RelayFrame>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.write().await;
        inner.peers.insert(conn_id, tx);
        tracing::debug!("Connection {} attached ({} open)", conn_id, inner.peers.len());
        rx
    }

    /// Apply a frame received on `conn_id`. Returns how many connections
    /// the resulting event was queued for.
    pub async fn dispatch(
        &self,
        conn_id: ConnectionId,
        envelope: WsEnvelope<RelayFrame>,
    ) -> usize {
        let WsEnvelope {
            id: origin,
            payload,
            ..
        } = envelope;
        let kind = payload.kind.clone();
        let Some((audience, event)) = Self::route(conn_id, payload) else {
            tracing::warn!("Dropping {:?} frame from {}", kind, conn_id);
            return 0;
        };

        let mut inner = self.inner.write().await;
        if event.kind == CommandKind::Join.event_tag() {
            let identity = Identity::from_value(&event.data);
            if inner.registry.register(conn_id, event.data.clone()) {
                tracing::info!(
                    "{} joined on {} (userId: {})",
                    identity.username,
                    conn_id,
                    identity.user_id
                );
            } else {
                tracing::debug!("{} re-announced on {}", identity.username, conn_id);
            }
        }

        let delivered = inner.fan_out(audience, WsEnvelope::correlated(event, &origin));
        tracing::debug!("Relayed {} from {} to {} connection(s)", kind, conn_id, delivered);
        delivered
    }

    /// Tear down a connection. Safe to call more than once: the registry
    /// eviction and the `user.left` broadcast happen at most once.
    pub async fn disconnect(&self, conn_id: ConnectionId) -> Option<Identity> {
        let mut inner = self.inner.write().await;
        inner.peers.remove(&conn_id);

        let announced = inner.registry.remove(&conn_id)?;
        let identity = Identity::from_value(&announced);
        tracing::info!("{} left ({})", identity.username, conn_id);
        inner.fan_out(
            Audience::Everyone,
            WsEnvelope::new(RelayFrame::new(USER_LEFT, announced)),
        );
        Some(identity)
    }

    /// Number of open connections, joined or not.
    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.peers.len()
    }

    pub async fn identity_of(&self, conn_id: &ConnectionId) -> Option<Identity> {
        self.inner.read().await.registry.identity(conn_id)
    }

    /// Number of connections that have announced an identity.
    pub async fn joined_count(&self) -> usize {
        self.inner.read().await.registry.len()
    }
}
