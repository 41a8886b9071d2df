use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::dto::ws::ServerEnvelope;

/// Identifier assigned to each live WebSocket connection.
pub type ConnectionId = Uuid;

/// Role a connection plays within its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The session's privileged controller.
    Host,
    /// A regular participant.
    Player,
}

/// Handle used to push messages to a connected client.
#[derive(Clone)]
pub struct ConnectionHandle {
    /// Registry key of this connection.
    pub id: ConnectionId,
    /// Writer-task channel feeding the socket.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Session identity a connection acquired by joining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionBinding {
    /// Session the connection is routed under.
    pub session_id: Uuid,
    /// Player identity for player connections; `None` for hosts.
    pub player_id: Option<Uuid>,
    /// Host or player.
    pub role: Role,
}

struct ConnectionEntry {
    handle: ConnectionHandle,
    binding: Option<ConnectionBinding>,
}

/// Process-local map from connection ids to their outbound channel and
/// session binding. This is the only pure in-memory shared structure; all
/// other state goes through the persistence gateway.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ConnectionEntry>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly opened connection (not yet bound to a session).
    pub fn register(&self, handle: ConnectionHandle) {
        self.connections.insert(
            handle.id,
            ConnectionEntry {
                handle,
                binding: None,
            },
        );
    }

    /// Attach a session identity to a connection after a successful join.
    ///
    /// Returns `false` when the connection already went away.
    pub fn bind(&self, id: ConnectionId, binding: ConnectionBinding) -> bool {
        match self.connections.get_mut(&id) {
            Some(mut entry) => {
                entry.binding = Some(binding);
                true
            }
            None => false,
        }
    }

    /// Current binding of a connection, if it joined a session.
    pub fn binding(&self, id: ConnectionId) -> Option<ConnectionBinding> {
        self.connections.get(&id).and_then(|entry| entry.binding)
    }

    /// Drop a connection, returning the binding it held.
    pub fn unregister(&self, id: ConnectionId) -> Option<ConnectionBinding> {
        self.connections
            .remove(&id)
            .and_then(|(_, entry)| entry.binding)
    }

    /// Number of connections currently routed under a session.
    pub fn session_connection_count(&self, session_id: Uuid) -> usize {
        self.connections
            .iter()
            .filter(|entry| {
                entry
                    .binding
                    .is_some_and(|binding| binding.session_id == session_id)
            })
            .count()
    }

    /// Reply to a single connection.
    pub fn send_to(&self, id: ConnectionId, envelope: &ServerEnvelope) {
        let Some(payload) = encode(envelope) else {
            return;
        };
        let delivered = self
            .connections
            .get(&id)
            .map(|entry| entry.handle.tx.send(Message::Text(payload.into())).is_ok());
        if delivered == Some(false) {
            self.drop_closed(&[id]);
        }
    }

    /// Deliver to the connection(s) registered as host for a session.
    pub fn send_to_host(&self, session_id: Uuid, envelope: &ServerEnvelope) {
        self.send_where(envelope, |_, binding| {
            binding.session_id == session_id && binding.role == Role::Host
        });
    }

    /// Deliver to every connection registered under a session, optionally
    /// excluding one (typically the sender).
    pub fn broadcast(
        &self,
        session_id: Uuid,
        envelope: &ServerEnvelope,
        exclude: Option<ConnectionId>,
    ) {
        self.send_where(envelope, |id, binding| {
            binding.session_id == session_id && Some(id) != exclude
        });
    }

    fn send_where(
        &self,
        envelope: &ServerEnvelope,
        matches: impl Fn(ConnectionId, &ConnectionBinding) -> bool,
    ) {
        let Some(payload) = encode(envelope) else {
            return;
        };

        let mut closed = Vec::new();
        for entry in self.connections.iter() {
            let Some(binding) = entry.binding.as_ref() else {
                continue;
            };
            if !matches(entry.handle.id, binding) {
                continue;
            }
            if entry
                .handle
                .tx
                .send(Message::Text(payload.clone().into()))
                .is_err()
            {
                closed.push(entry.handle.id);
            }
        }
        self.drop_closed(&closed);
    }

    fn drop_closed(&self, ids: &[ConnectionId]) {
        for id in ids {
            warn!(connection_id = %id, "dropping closed connection from registry");
            self.connections.remove(id);
        }
    }
}

/// Serialize an envelope, logging instead of failing on serializer bugs.
fn encode(envelope: &ServerEnvelope) -> Option<String> {
    match serde_json::to_string(envelope) {
        Ok(payload) => Some(payload),
        Err(err) => {
            warn!(error = %err, "failed to serialize outbound message");
            None
        }
    }
}
