//! Wire types for the grid-duel coordination protocol.
//!
//! Every inbound and outbound event is one JSON text message. Events use
//! adjacent tagging (`{"type": ..., "data": ...}`); enum vocabulary matches
//! the original deployment's wire format: slots serialize as
//! `"player1"`/`"player2"`, game kinds as `"tictactoe"`/`"connect-four"`,
//! player statuses in camelCase.

use serde::{Deserialize, Serialize};

use crate::error_codes::ErrorCode;

// ── Type aliases ────────────────────────────────────────────────────

/// Durable client-chosen identity, stable across reconnects.
///
/// Opaque to the engine; the front-end takes it from the connection
/// handshake. Distinct from the ephemeral connection handle
/// ([`ConnectionId`](crate::identity::ConnectionId)).
pub type Identity = String;

/// Caller-supplied room name. The same name under two different game kinds
/// refers to two distinct rooms.
pub type RoomName = String;

// ── Enums ───────────────────────────────────────────────────────────

/// The game kinds the engine can coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameKind {
    /// 3×3 grid, win length 3, direct cell placement.
    Tictactoe,
    /// 7×6 grid, win length 4, gravity placement.
    ConnectFour,
}

/// The two player slots in a room.
///
/// Slots are the board vocabulary: cells hold a slot, win detection reports a
/// slot. The roster maps slots back to identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerSlot {
    #[serde(rename = "player1")]
    Slot1,
    #[serde(rename = "player2")]
    Slot2,
}

impl GameKind {
    /// The wire name of this game kind, for logging.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tictactoe => "tictactoe",
            Self::ConnectFour => "connect-four",
        }
    }
}

impl PlayerSlot {
    /// The other slot.
    pub fn complement(self) -> Self {
        match self {
            Self::Slot1 => Self::Slot2,
            Self::Slot2 => Self::Slot1,
        }
    }
}

/// What a member is currently permitted to do, as reported in `statusUpdate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayerStatus {
    /// Alone in the room, waiting for an opponent.
    Waiting,
    /// Game in progress.
    Playing,
    /// Game finished (win, draw, or abandonment).
    GameOver,
    /// Requested a rematch, waiting for the opponent's answer.
    RematchWaiting,
    /// The opponent requested a rematch; an answer is pending.
    RematchPending,
}

/// One cell of a board: empty, or occupied by a slot.
pub type Cell = Option<PlayerSlot>;

/// A move as submitted by a client.
///
/// The shape must match the game's placement rule: direct-placement games
/// take a cell index, gravity games take a column number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MoveInput {
    /// Place directly into a cell (row-major index).
    Cell { index: usize },
    /// Drop into a column; the token settles in the lowest empty row.
    Column { column: usize },
}

/// How a finished game ended. Broadcast once, identically, to both members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum GameOutcome {
    /// The named identity completed a winning line.
    Win { winner: Identity },
    /// The board filled with no winning line.
    Draw,
    /// The opponent disconnected mid-session.
    Abandoned,
}

/// Which side of a rematch negotiation the recipient is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RematchPhase {
    /// You requested the rematch and are waiting for an answer.
    Waiting,
    /// Your opponent requested a rematch; your answer is pending.
    Pending,
}

// ── Structs ─────────────────────────────────────────────────────────

/// One entry in a room's membership roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub identity: Identity,
    pub slot: PlayerSlot,
}

// ── Events ──────────────────────────────────────────────────────────

/// Events sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Join (lazily creating) the named room for a game.
    Join {
        game: GameKind,
        room: RoomName,
        identity: Identity,
    },
    /// Submit a move in a room.
    #[serde(rename = "move")]
    Move {
        game: GameKind,
        room: RoomName,
        identity: Identity,
        input: MoveInput,
    },
    /// Request (or accept) a rematch in a finished game.
    Rematch {
        game: GameKind,
        room: RoomName,
        identity: Identity,
    },
}

/// Events sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Room membership changed.
    MembershipUpdate {
        roster: Vec<RosterEntry>,
        count: usize,
    },
    /// The recipient's session status changed.
    StatusUpdate {
        status: PlayerStatus,
        /// Present exactly when `status` is `gameOver`.
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<GameOutcome>,
    },
    /// The board changed; `current_mover` is whose turn it now is.
    #[serde(rename_all = "camelCase")]
    BoardUpdate {
        board: Vec<Cell>,
        current_mover: Identity,
    },
    /// Rematch negotiation state, delivered individually to each member.
    #[serde(rename_all = "camelCase")]
    RematchStatus {
        phase: RematchPhase,
        requested_by: Identity,
    },
    /// An operation was rejected. Sent only to the offending connection.
    Error { code: ErrorCode, reason: String },
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
    fn game_kind_wire_format() {
        assert_eq!(
            serde_json::to_string(&GameKind::Tictactoe).unwrap(),
            "\"tictactoe\""
        );
        assert_eq!(
            serde_json::to_string(&GameKind::ConnectFour).unwrap(),
            "\"connect-four\""
        );
    }

    #[test]
    fn player_slot_wire_format() {
        assert_eq!(
            serde_json::to_string(&PlayerSlot::Slot1).unwrap(),
            "\"player1\""
        );
        assert_eq!(
            serde_json::to_string(&PlayerSlot::Slot2).unwrap(),
            "\"player2\""
        );
    }

    #[test]
    fn slot_complement_is_an_involution() {
        assert_eq!(PlayerSlot::Slot1.complement(), PlayerSlot::Slot2);
        assert_eq!(PlayerSlot::Slot2.complement(), PlayerSlot::Slot1);
        assert_eq!(PlayerSlot::Slot1.complement().complement(), PlayerSlot::Slot1);
    }

    #[test]
    fn empty_cell_serializes_as_null() {
        let board: Vec<Cell> = vec![None, Some(PlayerSlot::Slot1), None];
        let json = serde_json::to_string(&board).unwrap();
        assert_eq!(json, "[null,\"player1\",null]");
    }

    #[test]
    fn client_event_uses_adjacent_tagging() {
        let event = ClientEvent::Join {
            game: GameKind::Tictactoe,
            room: "lobby-1".into(),
            identity: "alice".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "join");
        assert_eq!(value["data"]["game"], "tictactoe");
        assert_eq!(value["data"]["room"], "lobby-1");
        assert_eq!(value["data"]["identity"], "alice");
    }

    #[test]
    fn move_event_round_trips() {
        let event = ClientEvent::Move {
            game: GameKind::ConnectFour,
            room: "pit".into(),
            identity: "bob".into(),
            input: MoveInput::Column { column: 3 },
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: ClientEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "move");
        assert_eq!(value["data"]["input"]["type"], "column");
        assert_eq!(value["data"]["input"]["column"], 3);
    }

    #[test]
    fn status_update_omits_absent_result() {
        let event = ServerEvent::StatusUpdate {
            status: PlayerStatus::Waiting,
            result: None,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "statusUpdate");
        assert_eq!(value["data"]["status"], "waiting");
        assert!(value["data"].get("result").is_none());
    }

    #[test]
    fn terminal_outcome_wire_format() {
        let event = ServerEvent::StatusUpdate {
            status: PlayerStatus::GameOver,
            result: Some(GameOutcome::Win {
                winner: "alice".into(),
            }),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["data"]["status"], "gameOver");
        assert_eq!(value["data"]["result"]["kind"], "win");
        assert_eq!(value["data"]["result"]["winner"], "alice");

        let abandoned = ServerEvent::StatusUpdate {
            status: PlayerStatus::GameOver,
            result: Some(GameOutcome::Abandoned),
        };
        let value = serde_json::to_value(&abandoned).unwrap();
        assert_eq!(value["data"]["result"]["kind"], "abandoned");
    }

    #[test]
    fn board_update_uses_camel_case_field_names() {
        let event = ServerEvent::BoardUpdate {
            board: vec![None; 9],
            current_mover: "alice".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "boardUpdate");
        assert_eq!(value["data"]["currentMover"], "alice");
        assert_eq!(value["data"]["board"].as_array().unwrap().len(), 9);
    }

    #[test]
    fn unknown_game_kind_fails_to_parse() {
        let raw = r#"{"type":"join","data":{"game":"checkers","room":"r","identity":"a"}}"#;
        assert!(serde_json::from_str::<ClientEvent>(raw).is_err());
    }
}
