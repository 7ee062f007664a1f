//! Outbound delivery abstraction.
//!
//! The engine core never talks to sockets. It hands every outbound
//! [`ServerEvent`] to a [`Delivery`], which knows how to reach individual
//! connections and room topics. Delivery is fire-and-forget: a connection
//! that cannot accept an event is logged and skipped, never an error the
//! engine has to unwind — room state must not depend on a slow client.
//!
//! [`ChannelDelivery`] is the standard implementation: one bounded channel
//! per connection, drained by a writer task owned by the front-end.

use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::identity::ConnectionId;
use crate::protocol::ServerEvent;
use crate::room::RoomKey;

/// Outbound event fan-out, as seen by the engine.
///
/// Implementations track which connections are subscribed to which room
/// topic. All methods are infallible from the engine's point of view.
pub trait Delivery {
    /// Deliver an event to one connection.
    fn send(&mut self, conn: ConnectionId, event: &ServerEvent);

    /// Deliver an event to every connection subscribed to a room topic.
    fn broadcast(&mut self, room: &RoomKey, event: &ServerEvent);

    /// Add a connection to a room topic.
    fn subscribe(&mut self, conn: ConnectionId, room: &RoomKey);

    /// Remove a connection from a room topic.
    fn unsubscribe(&mut self, conn: ConnectionId, room: &RoomKey);
}

/// Per-connection event buffer size for [`ChannelDelivery`].
///
/// A client further behind than this is dropped rather than allowed to
/// backpressure the engine.
pub const DELIVERY_BUFFER: usize = 64;

/// Channel-backed [`Delivery`].
///
/// The front-end registers one bounded sender per connection and drains the
/// receiving half into the socket. Events for a full or closed channel are
/// dropped with a warning.
#[derive(Debug, Default)]
pub struct ChannelDelivery {
    senders: HashMap<ConnectionId, mpsc::Sender<ServerEvent>>,
    topics: HashMap<RoomKey, HashSet<ConnectionId>>,
}

impl ChannelDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a channel for a connection, returning the half
    /// the front-end's writer task drains.
    pub fn register(&mut self, conn: ConnectionId) -> mpsc::Receiver<ServerEvent> {
        let (sender, receiver) = mpsc::channel(DELIVERY_BUFFER);
        self.senders.insert(conn, sender);
        receiver
    }

    /// Drop a connection's channel and all of its topic subscriptions.
    pub fn deregister(&mut self, conn: ConnectionId) {
        self.senders.remove(&conn);
        for members in self.topics.values_mut() {
            members.remove(&conn);
        }
        self.topics.retain(|_, members| !members.is_empty());
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.senders.len()
    }

    fn push(&self, conn: ConnectionId, event: &ServerEvent) {
        let Some(sender) = self.senders.get(&conn) else {
            tracing::warn!(%conn, "delivery to unregistered connection dropped");
            return;
        };
        match sender.try_send(event.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!(%conn, "event buffer full, dropping event for slow client");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(%conn, "event channel closed, dropping event");
            }
        }
    }
}

impl Delivery for ChannelDelivery {
    fn send(&mut self, conn: ConnectionId, event: &ServerEvent) {
        self.push(conn, event);
    }

    fn broadcast(&mut self, room: &RoomKey, event: &ServerEvent) {
        let Some(members) = self.topics.get(room) else {
            return;
        };
        for conn in members.iter().copied().collect::<Vec<_>>() {
            self.push(conn, event);
        }
    }

    fn subscribe(&mut self, conn: ConnectionId, room: &RoomKey) {
        self.topics.entry(room.clone()).or_default().insert(conn);
    }

    fn unsubscribe(&mut self, conn: ConnectionId, room: &RoomKey) {
        if let Some(members) = self.topics.get_mut(room) {
            members.remove(&conn);
            if members.is_empty() {
                self.topics.remove(room);
            }
        }
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
    use crate::protocol::{GameKind, PlayerStatus};

    fn status_event() -> ServerEvent {
        ServerEvent::StatusUpdate {
            status: PlayerStatus::Waiting,
            result: None,
        }
    }

    fn key() -> RoomKey {
        RoomKey::new(GameKind::Tictactoe, "lobby")
    }

    #[test]
    fn send_reaches_only_the_target_connection() {
        let mut delivery = ChannelDelivery::new();
        let alice = ConnectionId::new();
        let bob = ConnectionId::new();
        let mut alice_rx = delivery.register(alice);
        let mut bob_rx = delivery.register(bob);

        delivery.send(alice, &status_event());

        assert_eq!(alice_rx.try_recv().unwrap(), status_event());
        assert!(bob_rx.try_recv().is_err());
    }

    #[test]
    fn broadcast_reaches_every_subscriber() {
        let mut delivery = ChannelDelivery::new();
        let alice = ConnectionId::new();
        let bob = ConnectionId::new();
        let outsider = ConnectionId::new();
        let mut alice_rx = delivery.register(alice);
        let mut bob_rx = delivery.register(bob);
        let mut outsider_rx = delivery.register(outsider);

        delivery.subscribe(alice, &key());
        delivery.subscribe(bob, &key());
        delivery.broadcast(&key(), &status_event());

        assert!(alice_rx.try_recv().is_ok());
        assert!(bob_rx.try_recv().is_ok());
        assert!(outsider_rx.try_recv().is_err());
    }

    #[test]
    fn unsubscribe_stops_broadcasts() {
        let mut delivery = ChannelDelivery::new();
        let alice = ConnectionId::new();
        let mut alice_rx = delivery.register(alice);

        delivery.subscribe(alice, &key());
        delivery.unsubscribe(alice, &key());
        delivery.broadcast(&key(), &status_event());

        assert!(alice_rx.try_recv().is_err());
    }

    #[test]
    fn deregister_removes_the_connection_everywhere() {
        let mut delivery = ChannelDelivery::new();
        let alice = ConnectionId::new();
        let _alice_rx = delivery.register(alice);
        delivery.subscribe(alice, &key());

        delivery.deregister(alice);
        assert_eq!(delivery.connection_count(), 0);

        // Dropped without panicking or reaching anyone.
        delivery.broadcast(&key(), &status_event());
        delivery.send(alice, &status_event());
    }

    #[test]
    fn full_buffer_drops_instead_of_blocking() {
        let mut delivery = ChannelDelivery::new();
        let alice = ConnectionId::new();
        let mut alice_rx = delivery.register(alice);

        for _ in 0..(DELIVERY_BUFFER + 5) {
            delivery.send(alice, &status_event());
        }

        let mut received = 0;
        while alice_rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, DELIVERY_BUFFER);
    }
}
