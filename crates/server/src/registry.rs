//! Connection registry: which identity is announced on which live connection.

use std::collections::HashMap;

use huddle_shared::Identity;
use serde_json::Value;
use uuid::Uuid;

/// Opaque per-connection handle, minted when the socket is upgraded.
pub type ConnectionId = Uuid;

/// Maps live connections to the identity most recently announced on them.
///
/// The identity is kept exactly as it arrived on the wire, so the departure
/// announcement repeats it field for field. Several connections may carry
/// the same `userId`; each one gets its own entry and its own departure.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: HashMap<ConnectionId, Value>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for `conn_id`. Returns true if the
    /// connection had not announced an identity before.
    pub fn register(&mut self, conn_id: ConnectionId, identity: Value) -> bool {
        self.entries.insert(conn_id, identity).is_none()
    }

    /// The announced payload for `conn_id`, as received.
    pub fn lookup(&self, conn_id: &ConnectionId) -> Option<&Value> {
        self.entries.get(conn_id)
    }

    /// The announced identity for `conn_id`, read leniently.
    pub fn identity(&self, conn_id: &ConnectionId) -> Option<Identity> {
        self.lookup(conn_id).map(Identity::from_value)
    }

    /// Evict the entry for a closed connection.
    pub fn remove(&mut self, conn_id: &ConnectionId) -> Option<Value> {
        self.entries.remove(conn_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
