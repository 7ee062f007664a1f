//! Connection-to-identity binding.
//!
//! A [`ConnectionId`] is an ephemeral handle minted per socket; an
//! [`Identity`] is the durable, client-chosen name that membership and turn
//! state are keyed on. The registry maps between the two so that a client who
//! reconnects keeps its standing in a room.

use std::collections::HashMap;
use std::fmt;

use uuid::Uuid;

use crate::protocol::Identity;

/// Ephemeral handle for one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Mint a fresh connection handle.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bidirectional registry of connection bindings.
///
/// Invariant: one identity is bound to at most one connection at a time.
/// Binding an identity that is already bound elsewhere replaces the old
/// binding (latest connection wins), so events arriving on the stale
/// connection fail resolution from then on.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    by_connection: HashMap<ConnectionId, Identity>,
    by_identity: HashMap<Identity, ConnectionId>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a connection to an identity, displacing any previous connection
    /// bound to the same identity.
    pub fn bind(&mut self, conn: ConnectionId, identity: Identity) {
        // A connection re-binding under a new identity abandons its old one.
        if let Some(previous) = self.by_connection.get(&conn) {
            if self.by_identity.get(previous) == Some(&conn) && *previous != identity {
                let previous = previous.clone();
                self.by_identity.remove(&previous);
            }
        }
        if let Some(stale) = self.by_identity.insert(identity.clone(), conn) {
            if stale != conn {
                self.by_connection.remove(&stale);
                tracing::debug!(%identity, %stale, "identity rebound to a newer connection");
            }
        }
        self.by_connection.insert(conn, identity);
    }

    /// The identity bound to a connection, if any.
    pub fn resolve(&self, conn: ConnectionId) -> Option<&Identity> {
        self.by_connection.get(&conn)
    }

    /// The connection an identity is currently bound to, if any.
    pub fn connection_of(&self, identity: &str) -> Option<ConnectionId> {
        self.by_identity.get(identity).copied()
    }

    /// Remove a connection's binding, returning the identity it held.
    ///
    /// A no-op when the connection was already displaced by a rebind.
    pub fn unbind(&mut self, conn: ConnectionId) -> Option<Identity> {
        let identity = self.by_connection.remove(&conn)?;
        // Only drop the reverse entry if it still points at this connection.
        if self.by_identity.get(&identity) == Some(&conn) {
            self.by_identity.remove(&identity);
        }
        Some(identity)
    }

    pub fn len(&self) -> usize {
        self.by_connection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_connection.is_empty()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn bind_then_resolve() {
        let mut registry = IdentityRegistry::new();
        let conn = ConnectionId::new();
        registry.bind(conn, "alice".into());

        assert_eq!(registry.resolve(conn).map(String::as_str), Some("alice"));
        assert_eq!(registry.connection_of("alice"), Some(conn));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_connection_does_not_resolve() {
        let registry = IdentityRegistry::new();
        assert_eq!(registry.resolve(ConnectionId::new()), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn rebinding_displaces_the_stale_connection() {
        let mut registry = IdentityRegistry::new();
        let first = ConnectionId::new();
        let second = ConnectionId::new();

        registry.bind(first, "alice".into());
        registry.bind(second, "alice".into());

        // Latest connection wins; the first no longer resolves.
        assert_eq!(registry.resolve(first), None);
        assert_eq!(registry.resolve(second).map(String::as_str), Some("alice"));
        assert_eq!(registry.connection_of("alice"), Some(second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unbind_returns_the_identity_and_clears_both_directions() {
        let mut registry = IdentityRegistry::new();
        let conn = ConnectionId::new();
        registry.bind(conn, "bob".into());

        assert_eq!(registry.unbind(conn), Some("bob".into()));
        assert_eq!(registry.resolve(conn), None);
        assert_eq!(registry.connection_of("bob"), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn unbinding_a_displaced_connection_keeps_the_new_binding() {
        let mut registry = IdentityRegistry::new();
        let first = ConnectionId::new();
        let second = ConnectionId::new();

        registry.bind(first, "alice".into());
        registry.bind(second, "alice".into());

        // The stale socket closing must not evict the fresh binding.
        assert_eq!(registry.unbind(first), None);
        assert_eq!(registry.connection_of("alice"), Some(second));
    }
}
