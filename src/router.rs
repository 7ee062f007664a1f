//! Inbound event routing.
//!
//! The [`EventRouter`] owns the identity and room registries and drives the
//! whole engine. Handlers run to completion one at a time; the router has no
//! interior locking and expects single-threaded dispatch (the front-end
//! funnels everything through one task).
//!
//! Rejections are reported only to the offending connection and never mutate
//! state. Broadcasts carry one shared fact per room; clients derive their own
//! view (e.g., whether they won) from it.

use crate::error::Rejection;
use crate::error_codes::ErrorCode;
use crate::identity::{ConnectionId, IdentityRegistry};
use crate::protocol::{
    ClientEvent, GameOutcome, Identity, MoveInput, PlayerStatus, RematchPhase, ServerEvent,
};
use crate::room::{RoomKey, RoomRegistry};
use crate::session::{self, RematchOutcome};
use crate::transport::Delivery;

/// The coordination engine: registries plus event dispatch.
#[derive(Debug, Default)]
pub struct EventRouter {
    identities: IdentityRegistry,
    rooms: RoomRegistry,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identities(&self) -> &IdentityRegistry {
        &self.identities
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Bind a new connection to the identity from its handshake.
    pub fn on_connect(&mut self, conn: ConnectionId, identity: Identity) {
        tracing::info!(%conn, %identity, "connection bound");
        self.identities.bind(conn, identity);
    }

    /// Route one inbound event from a connection.
    pub fn on_event(&mut self, conn: ConnectionId, event: ClientEvent, delivery: &mut impl Delivery) {
        let Some(bound) = self.identities.resolve(conn).cloned() else {
            Self::reject(delivery, conn, ErrorCode::IdentityUnresolved.into());
            return;
        };
        let (game, room, identity) = match &event {
            ClientEvent::Join { game, room, identity }
            | ClientEvent::Move { game, room, identity, .. }
            | ClientEvent::Rematch { game, room, identity } => (*game, room.clone(), identity.clone()),
        };
        if identity != bound {
            tracing::warn!(%conn, claimed = %identity, %bound, "payload identity mismatch");
            Self::reject(delivery, conn, ErrorCode::IdentityMismatch.into());
            return;
        }
        let key = RoomKey::new(game, room);
        match event {
            ClientEvent::Join { .. } => self.handle_join(conn, key, bound, delivery),
            ClientEvent::Move { input, .. } => self.handle_move(conn, key, &bound, input, delivery),
            ClientEvent::Rematch { .. } => self.handle_rematch(conn, key, &bound, delivery),
        }
    }

    /// Tear down a disconnected connection.
    ///
    /// Fixed order: resolve the identity, clear its room membership (which
    /// also clears any open rematch request), notify a survivor or delete the
    /// empty room, and only then unbind the handle — earlier steps still need
    /// it to resolve.
    pub fn on_disconnect(&mut self, conn: ConnectionId, delivery: &mut impl Delivery) {
        let Some(identity) = self.identities.resolve(conn).cloned() else {
            // Already displaced by a newer connection for the same identity,
            // or never bound. Nothing to tear down.
            tracing::debug!(%conn, "disconnect from unbound connection");
            return;
        };
        if let Some(departure) = self.rooms.remove_member(&identity) {
            delivery.unsubscribe(conn, &departure.key);
            if departure.survivor.is_some() {
                tracing::info!(room = %departure.key, %identity, "member disconnected, game abandoned");
                if let Some(room) = self.rooms.get(&departure.key) {
                    delivery.broadcast(
                        &departure.key,
                        &ServerEvent::MembershipUpdate {
                            roster: room.roster(),
                            count: room.member_count(),
                        },
                    );
                    delivery.broadcast(
                        &departure.key,
                        &ServerEvent::StatusUpdate {
                            status: PlayerStatus::GameOver,
                            result: Some(GameOutcome::Abandoned),
                        },
                    );
                }
            }
        }
        self.identities.unbind(conn);
        tracing::debug!(%conn, %identity, "connection unbound");
    }

    fn handle_join(
        &mut self,
        conn: ConnectionId,
        key: RoomKey,
        identity: Identity,
        delivery: &mut impl Delivery,
    ) {
        let outcome = match self.rooms.join(key.clone(), identity.clone()) {
            Ok(outcome) => outcome,
            Err(rejection) => {
                Self::reject(delivery, conn, rejection);
                return;
            }
        };
        tracing::info!(room = %key, %identity, slot = ?outcome.slot, "player joined");
        delivery.subscribe(conn, &key);

        let Some(room) = self.rooms.get(&key) else {
            return;
        };
        delivery.broadcast(
            &key,
            &ServerEvent::MembershipUpdate {
                roster: room.roster(),
                count: room.member_count(),
            },
        );
        if outcome.started {
            let Some(current_mover) = room.current_mover().cloned() else {
                return;
            };
            delivery.broadcast(
                &key,
                &ServerEvent::BoardUpdate {
                    board: room.board().cells().to_vec(),
                    current_mover,
                },
            );
            delivery.broadcast(
                &key,
                &ServerEvent::StatusUpdate {
                    status: PlayerStatus::Playing,
                    result: None,
                },
            );
        } else {
            delivery.send(
                conn,
                &ServerEvent::StatusUpdate {
                    status: PlayerStatus::Waiting,
                    result: None,
                },
            );
        }
    }

    fn handle_move(
        &mut self,
        conn: ConnectionId,
        key: RoomKey,
        identity: &str,
        input: MoveInput,
        delivery: &mut impl Delivery,
    ) {
        let Some(room) = self.rooms.get_mut(&key) else {
            Self::reject(delivery, conn, ErrorCode::RoomNotFound.into());
            return;
        };
        match session::apply_move(room, identity, input) {
            Ok(outcome) => {
                tracing::debug!(room = %key, identity, "move applied");
                delivery.broadcast(
                    &key,
                    &ServerEvent::BoardUpdate {
                        board: outcome.board,
                        current_mover: outcome.current_mover,
                    },
                );
                if let Some(result) = outcome.outcome {
                    tracing::info!(room = %key, ?result, "game over");
                    delivery.broadcast(
                        &key,
                        &ServerEvent::StatusUpdate {
                            status: PlayerStatus::GameOver,
                            result: Some(result),
                        },
                    );
                }
            }
            Err(rejection) => Self::reject(delivery, conn, rejection),
        }
    }

    fn handle_rematch(
        &mut self,
        conn: ConnectionId,
        key: RoomKey,
        identity: &str,
        delivery: &mut impl Delivery,
    ) {
        let Some(room) = self.rooms.get_mut(&key) else {
            Self::reject(delivery, conn, ErrorCode::RoomNotFound.into());
            return;
        };
        // Fair coin flip for who moves first if this request turns out to be
        // an acceptance; injected here so the negotiator stays deterministic.
        let swap_first = rand::random::<bool>();
        match session::request_rematch(room, identity, swap_first) {
            Ok(RematchOutcome::Requested {
                requested_by,
                pending,
            }) => {
                tracing::info!(room = %key, %requested_by, "rematch requested");
                // The phase differs per recipient, so each member gets an
                // individual event rather than a broadcast.
                if let Some(requester_conn) = self.identities.connection_of(&requested_by) {
                    delivery.send(
                        requester_conn,
                        &ServerEvent::RematchStatus {
                            phase: RematchPhase::Waiting,
                            requested_by: requested_by.clone(),
                        },
                    );
                }
                if let Some(pending_conn) = self.identities.connection_of(&pending) {
                    delivery.send(
                        pending_conn,
                        &ServerEvent::RematchStatus {
                            phase: RematchPhase::Pending,
                            requested_by,
                        },
                    );
                }
            }
            Ok(RematchOutcome::NoOp) => {}
            Ok(RematchOutcome::Accepted {
                board,
                current_mover,
            }) => {
                tracing::info!(room = %key, "rematch accepted, game restarted");
                delivery.broadcast(
                    &key,
                    &ServerEvent::BoardUpdate {
                        board,
                        current_mover,
                    },
                );
                delivery.broadcast(
                    &key,
                    &ServerEvent::StatusUpdate {
                        status: PlayerStatus::Playing,
                        result: None,
                    },
                );
            }
            Err(rejection) => Self::reject(delivery, conn, rejection),
        }
    }

    fn reject(delivery: &mut impl Delivery, conn: ConnectionId, rejection: Rejection) {
        tracing::debug!(%conn, code = ?rejection.code, "operation rejected");
        delivery.send(
            conn,
            &ServerEvent::Error {
                code: rejection.code,
                reason: rejection.reason.to_owned(),
            },
        );
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
    use crate::protocol::GameKind;

    /// Minimal delivery that records per-connection sends.
    #[derive(Default)]
    struct Sink {
        sent: Vec<(ConnectionId, ServerEvent)>,
    }

    impl Delivery for Sink {
        fn send(&mut self, conn: ConnectionId, event: &ServerEvent) {
            self.sent.push((conn, event.clone()));
        }
        fn broadcast(&mut self, _room: &RoomKey, _event: &ServerEvent) {}
        fn subscribe(&mut self, _conn: ConnectionId, _room: &RoomKey) {}
        fn unsubscribe(&mut self, _conn: ConnectionId, _room: &RoomKey) {}
    }

    fn join(identity: &str) -> ClientEvent {
        ClientEvent::Join {
            game: GameKind::Tictactoe,
            room: "lobby".into(),
            identity: identity.into(),
        }
    }

    #[test]
    fn event_from_unbound_connection_is_rejected() {
        let mut router = EventRouter::new();
        let mut sink = Sink::default();
        let conn = ConnectionId::new();

        router.on_event(conn, join("alice"), &mut sink);

        let (target, event) = &sink.sent[0];
        assert_eq!(*target, conn);
        assert!(matches!(
            event,
            ServerEvent::Error {
                code: ErrorCode::IdentityUnresolved,
                ..
            }
        ));
        assert!(router.rooms().is_empty());
    }

    #[test]
    fn payload_identity_must_match_the_bound_identity() {
        let mut router = EventRouter::new();
        let mut sink = Sink::default();
        let conn = ConnectionId::new();
        router.on_connect(conn, "alice".into());

        router.on_event(conn, join("mallory"), &mut sink);

        assert!(matches!(
            sink.sent[0].1,
            ServerEvent::Error {
                code: ErrorCode::IdentityMismatch,
                ..
            }
        ));
        assert!(router.rooms().is_empty());
    }

    #[test]
    fn move_in_a_nonexistent_room_is_rejected() {
        let mut router = EventRouter::new();
        let mut sink = Sink::default();
        let conn = ConnectionId::new();
        router.on_connect(conn, "alice".into());

        router.on_event(
            conn,
            ClientEvent::Move {
                game: GameKind::Tictactoe,
                room: "nowhere".into(),
                identity: "alice".into(),
                input: MoveInput::Cell { index: 0 },
            },
            &mut sink,
        );

        assert!(matches!(
            sink.sent[0].1,
            ServerEvent::Error {
                code: ErrorCode::RoomNotFound,
                ..
            }
        ));
    }

    #[test]
    fn disconnect_of_an_unbound_connection_is_a_no_op() {
        let mut router = EventRouter::new();
        let mut sink = Sink::default();
        router.on_disconnect(ConnectionId::new(), &mut sink);
        assert!(sink.sent.is_empty());
    }
}
