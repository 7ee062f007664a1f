//! Structured error codes reported to clients.
//!
//! Codes serialize as `SCREAMING_SNAKE_CASE` strings (e.g., `"ROOM_FULL"`) so
//! client SDKs can branch on them programmatically. Use
//! [`description()`](ErrorCode::description) for a human-readable explanation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured error codes attached to outbound `error` events.
///
/// Every rejected operation carries exactly one of these. Rejections are
/// reported only to the offending connection and never mutate room state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Identity errors
    IdentityUnresolved,
    IdentityMismatch,

    // Capacity errors
    RoomFull,
    AlreadyJoined,

    // Turn and move errors
    NotYourTurn,
    CellOccupied,
    ColumnFull,
    MoveOutOfRange,
    GameNotOver,

    // Not-found errors
    RoomNotFound,
    NotAMember,
}

impl ErrorCode {
    /// Returns a human-readable description of this error code.
    pub fn description(&self) -> &'static str {
        match self {
            // Identity errors
            Self::IdentityUnresolved => {
                "No identity is bound to this connection. Reconnect with an identity in the handshake."
            }
            Self::IdentityMismatch => {
                "The identity in the event payload does not match the identity bound to this connection."
            }

            // Capacity errors
            Self::RoomFull => {
                "The room already has two players. Join a different room."
            }
            Self::AlreadyJoined => {
                "You are already a member of this room."
            }

            // Turn and move errors
            Self::NotYourTurn => {
                "It is not your turn to move. Wait for the game to start and for your opponent to move."
            }
            Self::CellOccupied => {
                "The target cell is already occupied. Pick an empty cell."
            }
            Self::ColumnFull => {
                "The target column is full. Pick a column with an empty cell."
            }
            Self::MoveOutOfRange => {
                "The move does not fit the board. Check the cell index or column number against the game's grid."
            }
            Self::GameNotOver => {
                "A rematch can only be requested after the current game has ended."
            }

            // Not-found errors
            Self::RoomNotFound => {
                "The named room does not exist for this game."
            }
            Self::NotAMember => {
                "You are not a member of this room. Join the room before playing in it."
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
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
    fn serializes_as_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::RoomFull).unwrap();
        assert_eq!(json, "\"ROOM_FULL\"");

        let json = serde_json::to_string(&ErrorCode::NotYourTurn).unwrap();
        assert_eq!(json, "\"NOT_YOUR_TURN\"");

        let json = serde_json::to_string(&ErrorCode::IdentityUnresolved).unwrap();
        assert_eq!(json, "\"IDENTITY_UNRESOLVED\"");
    }

    #[test]
    fn deserializes_from_wire_format() {
        let code: ErrorCode = serde_json::from_str("\"ALREADY_JOINED\"").unwrap();
        assert_eq!(code, ErrorCode::AlreadyJoined);

        let code: ErrorCode = serde_json::from_str("\"COLUMN_FULL\"").unwrap();
        assert_eq!(code, ErrorCode::ColumnFull);
    }

    #[test]
    fn every_code_has_a_nonempty_description() {
        let codes = [
            ErrorCode::IdentityUnresolved,
            ErrorCode::IdentityMismatch,
            ErrorCode::RoomFull,
            ErrorCode::AlreadyJoined,
            ErrorCode::NotYourTurn,
            ErrorCode::CellOccupied,
            ErrorCode::ColumnFull,
            ErrorCode::MoveOutOfRange,
            ErrorCode::GameNotOver,
            ErrorCode::RoomNotFound,
            ErrorCode::NotAMember,
        ];
        for code in codes {
            assert!(!code.description().is_empty(), "{code:?}");
            assert_eq!(code.to_string(), code.description());
        }
    }
}
