//! Turn state machine and rematch negotiation.
//!
//! Operations here mutate a single [`Room`] and report what the caller must
//! deliver. They never touch the transport themselves, and a rejected
//! operation leaves the room exactly as it was.

use crate::board::Terminal;
use crate::error::Rejection;
use crate::error_codes::ErrorCode;
use crate::protocol::{Cell, GameOutcome, Identity, MoveInput};
use crate::room::{RematchRequest, Room, RoomPhase};

/// Result of a successfully applied move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    /// Board after the move, row-major.
    pub board: Vec<Cell>,
    /// Whose turn it now is (broadcast even when the game just ended).
    pub current_mover: Identity,
    /// Present when the move ended the game.
    pub outcome: Option<GameOutcome>,
}

/// Result of a rematch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RematchOutcome {
    /// First request in a finished game: negotiation is now open.
    Requested {
        requested_by: Identity,
        /// The member whose answer is pending.
        pending: Identity,
    },
    /// Nothing changed: a repeated request from the same member, or no
    /// opponent is present to answer.
    NoOp,
    /// The other member answered: the game restarted.
    Accepted {
        board: Vec<Cell>,
        current_mover: Identity,
    },
}

/// Apply one move to a room.
///
/// Validation order, first failure wins: membership (`NOT_A_MEMBER`), turn —
/// the room must be in the playing phase and the sender must be the current
/// mover (`NOT_YOUR_TURN`; this also covers moves sent while the room is
/// still waiting or already over) — then structural validity and occupancy
/// (delegated to the board).
///
/// On success the mover's slot is written, the turn flips to the other
/// member, and the board is checked for a terminal state.
///
/// # Errors
///
/// Returns a [`Rejection`]; the room is unchanged in that case.
pub fn apply_move(
    room: &mut Room,
    identity: &str,
    input: MoveInput,
) -> Result<MoveOutcome, Rejection> {
    let slot = room
        .slot_of(identity)
        .ok_or(Rejection::new(ErrorCode::NotAMember))?;
    if room.phase != RoomPhase::Playing || room.current_player.as_deref() != Some(identity) {
        return Err(ErrorCode::NotYourTurn.into());
    }
    // Playing phase implies two members, so the opponent exists.
    let Some(next) = room.other_member(identity).cloned() else {
        return Err(ErrorCode::NotYourTurn.into());
    };

    room.board.apply(input, slot)?;
    room.current_player = Some(next.clone());

    // Only the move just made can have completed a line, so a win always
    // belongs to the mover.
    let outcome = room.board.check_terminal().map(|terminal| match terminal {
        Terminal::Win(_) => GameOutcome::Win {
            winner: identity.to_owned(),
        },
        Terminal::Draw => GameOutcome::Draw,
    });
    if outcome.is_some() {
        room.phase = RoomPhase::GameOver;
    }

    Ok(MoveOutcome {
        board: room.board.cells().to_vec(),
        current_mover: next,
        outcome,
    })
}

/// Request (or accept) a rematch in a finished game.
///
/// Two-phase: the first request opens negotiation; a request from the other
/// member is acceptance and restarts the game. `swap_first` injects the coin
/// flip that decides whether the first mover changes on acceptance, keeping
/// this function deterministic.
///
/// # Errors
///
/// Rejects non-members (`NOT_A_MEMBER`) and requests while a game is still
/// waiting or in progress (`GAME_NOT_OVER`).
pub fn request_rematch(
    room: &mut Room,
    identity: &str,
    swap_first: bool,
) -> Result<RematchOutcome, Rejection> {
    if !room.contains(identity) {
        return Err(ErrorCode::NotAMember.into());
    }
    if room.phase != RoomPhase::GameOver {
        return Err(ErrorCode::GameNotOver.into());
    }

    match &room.rematch {
        None => {
            // With no opponent present (abandoned room) there is nobody to
            // answer, so the request cannot open a negotiation.
            let Some(pending) = room.other_member(identity).cloned() else {
                tracing::debug!(identity, "rematch request with no opponent ignored");
                return Ok(RematchOutcome::NoOp);
            };
            room.rematch = Some(RematchRequest {
                requested_by: identity.to_owned(),
            });
            Ok(RematchOutcome::Requested {
                requested_by: identity.to_owned(),
                pending,
            })
        }
        Some(request) if request.requested_by == identity => {
            tracing::debug!(identity, "duplicate rematch request ignored");
            Ok(RematchOutcome::NoOp)
        }
        Some(_) => {
            if swap_first {
                if let Some(first) = room.first_player.clone() {
                    room.first_player = room.other_member(&first).cloned();
                }
            }
            room.start();
            let Some(current_mover) = room.current_player.clone() else {
                return Err(ErrorCode::GameNotOver.into());
            };
            Ok(RematchOutcome::Accepted {
                board: room.board.cells().to_vec(),
                current_mover,
            })
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
    use crate::protocol::{GameKind, PlayerSlot, PlayerStatus};
    use crate::room::{RoomKey, RoomRegistry};

    /// A tictactoe room with alice (slot-1, first mover) and bob (slot-2).
    fn playing_room(registry: &mut RoomRegistry) -> RoomKey {
        let key = RoomKey::new(GameKind::Tictactoe, "lobby");
        registry.join(key.clone(), "alice".into()).unwrap();
        registry.join(key.clone(), "bob".into()).unwrap();
        key
    }

    fn cell(index: usize) -> MoveInput {
        MoveInput::Cell { index }
    }

    #[test]
    fn moves_alternate_and_flip_the_current_mover() {
        let mut registry = RoomRegistry::new();
        let key = playing_room(&mut registry);
        let room = registry.get_mut(&key).unwrap();

        let outcome = apply_move(room, "alice", cell(0)).unwrap();
        assert_eq!(outcome.current_mover, "bob");
        assert_eq!(outcome.board[0], Some(PlayerSlot::Slot1));
        assert_eq!(outcome.outcome, None);

        let outcome = apply_move(room, "bob", cell(4)).unwrap();
        assert_eq!(outcome.current_mover, "alice");
        assert_eq!(outcome.board[4], Some(PlayerSlot::Slot2));
    }

    #[test]
    fn out_of_turn_move_is_rejected() {
        let mut registry = RoomRegistry::new();
        let key = playing_room(&mut registry);
        let room = registry.get_mut(&key).unwrap();

        let err = apply_move(room, "bob", cell(0)).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotYourTurn);
        assert!(room.board().cells().iter().all(Option::is_none));
    }

    #[test]
    fn move_while_waiting_for_an_opponent_is_rejected() {
        let mut registry = RoomRegistry::new();
        let key = RoomKey::new(GameKind::Tictactoe, "solo");
        registry.join(key.clone(), "alice".into()).unwrap();
        let room = registry.get_mut(&key).unwrap();

        // Alice is the current player, but the room is still waiting.
        let err = apply_move(room, "alice", cell(0)).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotYourTurn);
    }

    #[test]
    fn non_member_move_is_rejected() {
        let mut registry = RoomRegistry::new();
        let key = playing_room(&mut registry);
        let room = registry.get_mut(&key).unwrap();

        let err = apply_move(room, "mallory", cell(0)).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotAMember);
    }

    #[test]
    fn winning_move_ends_the_game_with_the_movers_identity() {
        let mut registry = RoomRegistry::new();
        let key = playing_room(&mut registry);
        let room = registry.get_mut(&key).unwrap();

        // Alice: 0, 1, 2 (top row). Bob: 3, 4.
        apply_move(room, "alice", cell(0)).unwrap();
        apply_move(room, "bob", cell(3)).unwrap();
        apply_move(room, "alice", cell(1)).unwrap();
        apply_move(room, "bob", cell(4)).unwrap();
        let outcome = apply_move(room, "alice", cell(2)).unwrap();

        assert_eq!(
            outcome.outcome,
            Some(GameOutcome::Win {
                winner: "alice".into()
            })
        );
        assert_eq!(room.phase(), RoomPhase::GameOver);
        assert_eq!(room.status_of("alice"), PlayerStatus::GameOver);

        // No further moves once the game is over.
        let err = apply_move(room, "bob", cell(5)).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotYourTurn);
    }

    #[test]
    fn filling_the_board_without_a_line_is_a_draw() {
        let mut registry = RoomRegistry::new();
        let key = playing_room(&mut registry);
        let room = registry.get_mut(&key).unwrap();

        // Ends as: X O X / X O O / O X X with no three-in-a-row.
        let moves = [
            ("alice", 0),
            ("bob", 1),
            ("alice", 2),
            ("bob", 4),
            ("alice", 3),
            ("bob", 5),
            ("alice", 7),
            ("bob", 6),
        ];
        for (who, index) in moves {
            let outcome = apply_move(room, who, cell(index)).unwrap();
            assert_eq!(outcome.outcome, None);
        }
        let outcome = apply_move(room, "alice", cell(8)).unwrap();
        assert_eq!(outcome.outcome, Some(GameOutcome::Draw));
        assert_eq!(room.phase(), RoomPhase::GameOver);
    }

    #[test]
    fn rejected_move_leaves_the_turn_unchanged() {
        let mut registry = RoomRegistry::new();
        let key = playing_room(&mut registry);
        let room = registry.get_mut(&key).unwrap();

        apply_move(room, "alice", cell(0)).unwrap();
        let err = apply_move(room, "bob", cell(0)).unwrap_err();
        assert_eq!(err.code, ErrorCode::CellOccupied);

        // Still bob's turn; a legal move goes through.
        apply_move(room, "bob", cell(1)).unwrap();
    }

    fn finished_room(registry: &mut RoomRegistry) -> RoomKey {
        let key = playing_room(registry);
        let room = registry.get_mut(&key).unwrap();
        apply_move(room, "alice", cell(0)).unwrap();
        apply_move(room, "bob", cell(3)).unwrap();
        apply_move(room, "alice", cell(1)).unwrap();
        apply_move(room, "bob", cell(4)).unwrap();
        apply_move(room, "alice", cell(2)).unwrap();
        key
    }

    #[test]
    fn rematch_during_a_live_game_is_rejected() {
        let mut registry = RoomRegistry::new();
        let key = playing_room(&mut registry);
        let room = registry.get_mut(&key).unwrap();

        let err = request_rematch(room, "alice", false).unwrap_err();
        assert_eq!(err.code, ErrorCode::GameNotOver);
    }

    #[test]
    fn first_rematch_request_opens_negotiation() {
        let mut registry = RoomRegistry::new();
        let key = finished_room(&mut registry);
        let room = registry.get_mut(&key).unwrap();

        let outcome = request_rematch(room, "bob", false).unwrap();
        assert_eq!(
            outcome,
            RematchOutcome::Requested {
                requested_by: "bob".into(),
                pending: "alice".into(),
            }
        );
        assert_eq!(room.status_of("bob"), PlayerStatus::RematchWaiting);
        assert_eq!(room.status_of("alice"), PlayerStatus::RematchPending);
    }

    #[test]
    fn repeated_request_from_the_same_member_is_a_no_op() {
        let mut registry = RoomRegistry::new();
        let key = finished_room(&mut registry);
        let room = registry.get_mut(&key).unwrap();

        request_rematch(room, "bob", false).unwrap();
        let outcome = request_rematch(room, "bob", false).unwrap();
        assert_eq!(outcome, RematchOutcome::NoOp);
        assert_eq!(room.status_of("alice"), PlayerStatus::RematchPending);
    }

    #[test]
    fn counter_request_accepts_and_restarts_without_swap() {
        let mut registry = RoomRegistry::new();
        let key = finished_room(&mut registry);
        let room = registry.get_mut(&key).unwrap();

        request_rematch(room, "bob", false).unwrap();
        let outcome = request_rematch(room, "alice", false).unwrap();

        let RematchOutcome::Accepted {
            board,
            current_mover,
        } = outcome
        else {
            panic!("expected acceptance, got {outcome:?}");
        };
        assert!(board.iter().all(Option::is_none));
        assert_eq!(current_mover, "alice");
        assert_eq!(room.phase(), RoomPhase::Playing);
        assert!(room.rematch().is_none());
    }

    #[test]
    fn acceptance_with_swap_hands_the_first_move_to_the_other_member() {
        let mut registry = RoomRegistry::new();
        let key = finished_room(&mut registry);
        let room = registry.get_mut(&key).unwrap();

        request_rematch(room, "alice", true).unwrap();
        let outcome = request_rematch(room, "bob", true).unwrap();

        let RematchOutcome::Accepted { current_mover, .. } = outcome else {
            panic!("expected acceptance, got {outcome:?}");
        };
        assert_eq!(current_mover, "bob");
        assert_eq!(room.status_of("bob"), PlayerStatus::Playing);
    }

    #[test]
    fn rematch_with_no_opponent_is_a_no_op() {
        let mut registry = RoomRegistry::new();
        let key = finished_room(&mut registry);
        registry.remove_member("bob").unwrap();
        let room = registry.get_mut(&key).unwrap();

        let outcome = request_rematch(room, "alice", false).unwrap();
        assert_eq!(outcome, RematchOutcome::NoOp);
        assert!(room.rematch().is_none());
    }

    #[test]
    fn non_member_rematch_is_rejected() {
        let mut registry = RoomRegistry::new();
        let key = finished_room(&mut registry);
        let room = registry.get_mut(&key).unwrap();

        let err = request_rematch(room, "mallory", false).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotAMember);
    }
}
