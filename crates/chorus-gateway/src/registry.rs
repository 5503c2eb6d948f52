use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// A serialized gateway event, shared between every session it is pushed to.
pub type Payload = Arc<str>;

/// Unique identifier for one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

pub(crate) struct Session {
    pub(crate) tx: mpsc::UnboundedSender<Payload>,
    pub(crate) bound_at: DateTime<Utc>,
}

/// Tracks live connections per identity. In-memory, process-local.
///
/// Entries are sharded by identity: bind/unbind for one identity are
/// linearized on its shard, other identities are unaffected.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, HashMap<ConnectionId, Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a connection's outbound channel to `identity`.
    pub fn bind(&self, identity: &str, tx: mpsc::UnboundedSender<Payload>) -> ConnectionId {
        let conn_id = ConnectionId::new();
        let mut entry = self.sessions.entry(identity.to_string()).or_default();
        entry.insert(
            conn_id,
            Session {
                tx,
                bound_at: Utc::now(),
            },
        );
        debug!(
            "Bound connection {} to {} ({} live)",
            conn_id,
            identity,
            entry.len()
        );
        conn_id
    }

    /// Removes exactly one connection. Returns false if it was not bound.
    /// Once this returns, no delivery can reach that connection.
    pub fn unbind(&self, identity: &str, conn_id: ConnectionId) -> bool {
        let removed = match self.sessions.get_mut(identity) {
            Some(mut sessions) => sessions.remove(&conn_id).is_some(),
            None => false,
        };

        if removed {
            // Re-checked under the shard lock; a racing bind keeps the entry.
            self.sessions.remove_if(identity, |_, sessions| sessions.is_empty());
            debug!("Unbound connection {} from {}", conn_id, identity);
        }
        removed
    }

    /// Live connections of `identity`, possibly empty.
    pub fn connections_for(&self, identity: &str) -> Vec<ConnectionId> {
        self.sessions
            .get(identity)
            .map(|sessions| sessions.keys().copied().collect())
            .unwrap_or_default()
    }

    /// When each live connection of `identity` was bound.
    pub fn bindings_for(&self, identity: &str) -> Vec<(ConnectionId, DateTime<Utc>)> {
        self.sessions
            .get(identity)
            .map(|sessions| sessions.iter().map(|(id, s)| (*id, s.bound_at)).collect())
            .unwrap_or_default()
    }

    pub fn is_online(&self, identity: &str) -> bool {
        self.sessions.contains_key(identity)
    }

    pub fn online_count(&self) -> usize {
        self.sessions.len()
    }

    /// Runs `f` over the sessions of `identity` while holding its shard,
    /// so a concurrent unbind either happens before or after the whole call.
    pub(crate) fn with_sessions<R>(
        &self,
        identity: &str,
        f: impl FnOnce(&HashMap<ConnectionId, Session>) -> R,
    ) -> Option<R> {
        self.sessions.get(identity).map(|sessions| f(&sessions))
    }
}
