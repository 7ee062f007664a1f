#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Shared test utilities for grid-duel integration tests.
//!
//! Provides [`RecordingDelivery`], an in-memory [`Delivery`] that records
//! every event each connection would have received, plus constructors for
//! common client events.

use std::collections::{HashMap, HashSet};

use grid_duel::identity::ConnectionId;
use grid_duel::protocol::{ClientEvent, GameKind, MoveInput, ServerEvent};
use grid_duel::room::RoomKey;
use grid_duel::{Delivery, ErrorCode, EventRouter};

// ── RecordingDelivery ───────────────────────────────────────────────

/// A [`Delivery`] that records deliveries instead of writing to sockets.
///
/// Broadcasts are fanned out to the connections subscribed at delivery time,
/// so `events_for` shows exactly what one client would have seen, in order.
#[derive(Debug, Default)]
pub struct RecordingDelivery {
    /// Every delivered event, per connection, in delivery order.
    pub delivered: Vec<(ConnectionId, ServerEvent)>,
    /// Current topic subscriptions.
    pub topics: HashMap<RoomKey, HashSet<ConnectionId>>,
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events a connection received, in order.
    pub fn events_for(&self, conn: ConnectionId) -> Vec<&ServerEvent> {
        self.delivered
            .iter()
            .filter(|(target, _)| *target == conn)
            .map(|(_, event)| event)
            .collect()
    }

    /// The error codes a connection received, in order.
    pub fn errors_for(&self, conn: ConnectionId) -> Vec<ErrorCode> {
        self.events_for(conn)
            .into_iter()
            .filter_map(|event| match event {
                ServerEvent::Error { code, .. } => Some(*code),
                _ => None,
            })
            .collect()
    }

    /// Forget everything delivered so far (subscriptions are kept).
    pub fn clear(&mut self) {
        self.delivered.clear();
    }
}

impl Delivery for RecordingDelivery {
    fn send(&mut self, conn: ConnectionId, event: &ServerEvent) {
        self.delivered.push((conn, event.clone()));
    }

    fn broadcast(&mut self, room: &RoomKey, event: &ServerEvent) {
        let Some(members) = self.topics.get(room) else {
            return;
        };
        let mut members: Vec<ConnectionId> = members.iter().copied().collect();
        // Stable order keeps assertions deterministic.
        members.sort_by_key(|conn| conn.to_string());
        for conn in members {
            self.delivered.push((conn, event.clone()));
        }
    }

    fn subscribe(&mut self, conn: ConnectionId, room: &RoomKey) {
        self.topics.entry(room.clone()).or_default().insert(conn);
    }

    fn unsubscribe(&mut self, conn: ConnectionId, room: &RoomKey) {
        if let Some(members) = self.topics.get_mut(room) {
            members.remove(&conn);
        }
    }
}

// ── Event constructors ──────────────────────────────────────────────

pub fn join(game: GameKind, room: &str, identity: &str) -> ClientEvent {
    ClientEvent::Join {
        game,
        room: room.into(),
        identity: identity.into(),
    }
}

pub fn cell_move(room: &str, identity: &str, index: usize) -> ClientEvent {
    ClientEvent::Move {
        game: GameKind::Tictactoe,
        room: room.into(),
        identity: identity.into(),
        input: MoveInput::Cell { index },
    }
}

pub fn column_move(room: &str, identity: &str, column: usize) -> ClientEvent {
    ClientEvent::Move {
        game: GameKind::ConnectFour,
        room: room.into(),
        identity: identity.into(),
        input: MoveInput::Column { column },
    }
}

pub fn rematch(game: GameKind, room: &str, identity: &str) -> ClientEvent {
    ClientEvent::Rematch {
        game,
        room: room.into(),
        identity: identity.into(),
    }
}

/// Bind a fresh connection for an identity.
pub fn connect(router: &mut EventRouter, identity: &str) -> ConnectionId {
    let conn = ConnectionId::new();
    router.on_connect(conn, identity.into());
    conn
}
