//! The per-listener connection registry.
//!
//! Every listener (a bound address accepting clients or servers) owns one
//! [`ConnectionRegistry`]. It knows every live connection that arrived on
//! that listener, answers "how many are registered?", and forgets a
//! connection when it disconnects.
//!
//! # Concurrency note
//!
//! `ConnectionRegistry` is NOT thread-safe by itself; it uses a plain
//! `HashMap`. The server wraps each one in a `parking_lot::Mutex`, and no
//! caller holds that lock across an await.

use std::collections::HashMap;
use std::sync::Arc;

use kestrel_transport::ConnectionId;

use crate::{Client, Peer};

/// A connection as the registry sees it.
#[derive(Debug, Clone)]
pub enum RegisteredConnection {
    Client(Arc<Client>),
    Peer(Arc<Peer>),
}

impl RegisteredConnection {
    pub fn id(&self) -> ConnectionId {
        match self {
            Self::Client(c) => c.id(),
            Self::Peer(p) => p.id(),
        }
    }

    /// Whether the connection has finished registration (or link auth).
    pub fn is_authenticated(&self) -> bool {
        match self {
            Self::Client(c) => c.is_registered(),
            Self::Peer(p) => p.is_authenticated(),
        }
    }
}

/// Point-in-time counts for one listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryStats {
    pub total: usize,
    pub authenticated: usize,
}

impl RegistryStats {
    pub fn unauthenticated(&self) -> usize {
        self.total - self.authenticated
    }
}

/// Live connections on one listener.
///
/// ## Lifecycle
///
/// ```text
/// accept ──→ insert() ──→ [PreAuth] ──(registration)──→ [Auth]
///                              │                           │
///                              └──────→ remove() ←─────────┘
/// ```
pub struct ConnectionRegistry {
    /// Listener label (its bind address), for logs.
    listener: String,
    connections: HashMap<ConnectionId, RegisteredConnection>,
}

impl ConnectionRegistry {
    /// Creates an empty registry for the listener labelled `listener`.
    pub fn new(listener: impl Into<String>) -> Self {
        Self {
            listener: listener.into(),
            connections: HashMap::new(),
        }
    }

    pub fn listener(&self) -> &str {
        &self.listener
    }

    /// Records a newly accepted connection.
    pub fn insert(&mut self, conn: RegisteredConnection) {
        let id = conn.id();
        self.connections.insert(id, conn);
        tracing::debug!(listener = %self.listener, conn_id = %id, "connection registered");
    }

    /// Forgets a connection. Returns it if it was present, so repeated
    /// removal is harmless.
    pub fn remove(&mut self, id: ConnectionId) -> Option<RegisteredConnection> {
        let removed = self.connections.remove(&id);
        if removed.is_some() {
            tracing::debug!(listener = %self.listener, conn_id = %id, "connection removed");
        }
        removed
    }

    /// Counts of all and of registered connections.
    pub fn stats(&self) -> RegistryStats {
        let authenticated = self
            .connections
            .values()
            .filter(|c| c.is_authenticated())
            .count();
        RegistryStats {
            total: self.connections.len(),
            authenticated,
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for `ConnectionRegistry`, named
    //! `test_{function}_{scenario}_{expected}`.

    use kestrel_liveness::LivenessConfig;
    use tokio::sync::mpsc;

    use super::*;

    // -- Helpers ----------------------------------------------------------

    fn client() -> Arc<Client> {
        let (tx, _rx) = mpsc::unbounded_channel();
        Arc::new(Client::local(
            ConnectionId::next(),
            "127.0.0.1",
            false,
            tx,
            &LivenessConfig::default(),
        ))
    }

    fn registered(client: &Arc<Client>) {
        client.replace_nick(&format!("u{}", client.id().into_inner()));
        client.set_user("u", "User").unwrap();
        assert!(client.try_register());
    }

    // =====================================================================
    // insert() / stats()
    // =====================================================================

    #[test]
    fn test_stats_counts_authenticated_separately() {
        let mut reg = ConnectionRegistry::new("127.0.0.1:6667");
        let a = client();
        let b = client();
        reg.insert(RegisteredConnection::Client(Arc::clone(&a)));
        reg.insert(RegisteredConnection::Client(Arc::clone(&b)));

        assert_eq!(reg.stats(), RegistryStats { total: 2, authenticated: 0 });

        registered(&a);
        let stats = reg.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.authenticated, 1);
        assert_eq!(stats.unauthenticated(), 1);
    }

    #[test]
    fn test_stats_counts_authenticated_peer() {
        let mut reg = ConnectionRegistry::new("127.0.0.1:7000");
        let (tx, _rx) = mpsc::unbounded_channel();
        let peer = Arc::new(Peer::new(ConnectionId::next(), tx, &LivenessConfig::default()));
        reg.insert(RegisteredConnection::Peer(Arc::clone(&peer)));
        reg.insert(RegisteredConnection::Client(client()));
        assert_eq!(reg.stats(), RegistryStats { total: 2, authenticated: 0 });

        peer.authenticate("hub.test", "002", "Hub");

        assert_eq!(reg.stats(), RegistryStats { total: 2, authenticated: 1 });
        assert_eq!(reg.len(), 2);
    }

    // =====================================================================
    // remove()
    // =====================================================================

    #[test]
    fn test_remove_twice_is_harmless() {
        let mut reg = ConnectionRegistry::new("127.0.0.1:6667");
        let a = client();
        reg.insert(RegisteredConnection::Client(Arc::clone(&a)));

        assert!(reg.remove(a.id()).is_some());
        assert!(reg.remove(a.id()).is_none());
        assert!(reg.is_empty());
    }
}
