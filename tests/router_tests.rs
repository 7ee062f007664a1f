#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! End-to-end scenarios driven through the [`EventRouter`] against a
//! recording delivery, covering joins, full games, rejections, rematch
//! negotiation, and disconnects.

mod common;

use common::{cell_move, column_move, connect, join, rematch, RecordingDelivery};
use grid_duel::identity::ConnectionId;
use grid_duel::protocol::{
    GameKind, GameOutcome, PlayerSlot, PlayerStatus, RematchPhase, ServerEvent,
};
use grid_duel::room::RoomPhase;
use grid_duel::{ErrorCode, EventRouter};

// ═══════════════════════════════════════════════════════════════════
// Joining and slots
// ═══════════════════════════════════════════════════════════════════

#[test]
fn first_joiner_waits_and_second_joiner_starts_the_game() {
    let mut router = EventRouter::new();
    let mut delivery = RecordingDelivery::new();
    let alice = connect(&mut router, "alice");
    let bob = connect(&mut router, "bob");

    router.on_event(alice, join(GameKind::Tictactoe, "lobby", "alice"), &mut delivery);

    let events = delivery.events_for(alice);
    let ServerEvent::MembershipUpdate { roster, count } = events[0] else {
        panic!("expected membershipUpdate, got {:?}", events[0]);
    };
    assert_eq!(*count, 1);
    assert_eq!(roster[0].identity, "alice");
    assert_eq!(roster[0].slot, PlayerSlot::Slot1);
    assert_eq!(
        events[1],
        &ServerEvent::StatusUpdate {
            status: PlayerStatus::Waiting,
            result: None,
        }
    );

    delivery.clear();
    router.on_event(bob, join(GameKind::Tictactoe, "lobby", "bob"), &mut delivery);

    for conn in [alice, bob] {
        let events = delivery.events_for(conn);
        let ServerEvent::MembershipUpdate { roster, count } = events[0] else {
            panic!("expected membershipUpdate, got {:?}", events[0]);
        };
        assert_eq!(*count, 2);
        assert_eq!(roster[1].identity, "bob");
        assert_eq!(roster[1].slot, PlayerSlot::Slot2);

        let ServerEvent::BoardUpdate {
            board,
            current_mover,
        } = events[1]
        else {
            panic!("expected boardUpdate, got {:?}", events[1]);
        };
        assert_eq!(board.len(), 9);
        assert!(board.iter().all(Option::is_none));
        assert_eq!(current_mover, "alice");

        assert_eq!(
            events[2],
            &ServerEvent::StatusUpdate {
                status: PlayerStatus::Playing,
                result: None,
            }
        );
    }
}

#[test]
fn third_joiner_is_rejected_without_disturbing_the_members() {
    let mut router = EventRouter::new();
    let mut delivery = RecordingDelivery::new();
    let alice = connect(&mut router, "alice");
    let bob = connect(&mut router, "bob");
    let carol = connect(&mut router, "carol");

    router.on_event(alice, join(GameKind::Tictactoe, "lobby", "alice"), &mut delivery);
    router.on_event(bob, join(GameKind::Tictactoe, "lobby", "bob"), &mut delivery);
    delivery.clear();

    router.on_event(carol, join(GameKind::Tictactoe, "lobby", "carol"), &mut delivery);

    assert_eq!(delivery.errors_for(carol), vec![ErrorCode::RoomFull]);
    assert!(delivery.events_for(alice).is_empty());
    assert!(delivery.events_for(bob).is_empty());
}

#[test]
fn repeat_join_is_rejected() {
    let mut router = EventRouter::new();
    let mut delivery = RecordingDelivery::new();
    let alice = connect(&mut router, "alice");

    router.on_event(alice, join(GameKind::Tictactoe, "lobby", "alice"), &mut delivery);
    delivery.clear();
    router.on_event(alice, join(GameKind::Tictactoe, "lobby", "alice"), &mut delivery);

    assert_eq!(delivery.errors_for(alice), vec![ErrorCode::AlreadyJoined]);
}

#[test]
fn same_room_name_under_two_game_kinds_is_two_rooms() {
    let mut router = EventRouter::new();
    let mut delivery = RecordingDelivery::new();
    let alice = connect(&mut router, "alice");
    let bob = connect(&mut router, "bob");

    router.on_event(alice, join(GameKind::Tictactoe, "shared", "alice"), &mut delivery);
    router.on_event(bob, join(GameKind::ConnectFour, "shared", "bob"), &mut delivery);

    assert_eq!(router.rooms().len(), 2);
    assert!(delivery.errors_for(alice).is_empty());
    assert!(delivery.errors_for(bob).is_empty());
}

// ═══════════════════════════════════════════════════════════════════
// Full tic-tac-toe game
// ═══════════════════════════════════════════════════════════════════

struct Duel {
    router: EventRouter,
    delivery: RecordingDelivery,
    alice: ConnectionId,
    bob: ConnectionId,
}

/// Alice and bob joined a tictactoe room named "lobby"; alice moves first.
fn tictactoe_duel() -> Duel {
    let mut router = EventRouter::new();
    let mut delivery = RecordingDelivery::new();
    let alice = connect(&mut router, "alice");
    let bob = connect(&mut router, "bob");
    router.on_event(alice, join(GameKind::Tictactoe, "lobby", "alice"), &mut delivery);
    router.on_event(bob, join(GameKind::Tictactoe, "lobby", "bob"), &mut delivery);
    delivery.clear();
    Duel {
        router,
        delivery,
        alice,
        bob,
    }
}

#[test]
fn a_full_tictactoe_game_broadcasts_boards_and_one_shared_result() {
    let mut duel = tictactoe_duel();

    // Alice takes the top row while bob answers in the middle row.
    let script = [
        ("alice", 0usize, "bob"),
        ("bob", 3, "alice"),
        ("alice", 1, "bob"),
        ("bob", 4, "alice"),
        ("alice", 2, "bob"),
    ];
    for (mover, index, next) in script {
        let conn = if mover == "alice" { duel.alice } else { duel.bob };
        duel.delivery.clear();
        duel.router
            .on_event(conn, cell_move("lobby", mover, index), &mut duel.delivery);

        // Both members see the same board with the flipped mover.
        for member in [duel.alice, duel.bob] {
            let events = duel.delivery.events_for(member);
            let ServerEvent::BoardUpdate {
                board,
                current_mover,
            } = events[0]
            else {
                panic!("expected boardUpdate, got {:?}", events[0]);
            };
            assert_eq!(current_mover, next);
            let expected_slot = if mover == "alice" {
                PlayerSlot::Slot1
            } else {
                PlayerSlot::Slot2
            };
            assert_eq!(board[index], Some(expected_slot));
        }
    }

    // The winning move also produced one shared terminal fact.
    for member in [duel.alice, duel.bob] {
        let events = duel.delivery.events_for(member);
        assert_eq!(
            events[1],
            &ServerEvent::StatusUpdate {
                status: PlayerStatus::GameOver,
                result: Some(GameOutcome::Win {
                    winner: "alice".into()
                }),
            }
        );
    }

    // No moves once the game is over.
    duel.delivery.clear();
    duel.router
        .on_event(duel.bob, cell_move("lobby", "bob", 5), &mut duel.delivery);
    assert_eq!(duel.delivery.errors_for(duel.bob), vec![ErrorCode::NotYourTurn]);
}

#[test]
fn out_of_turn_and_occupied_moves_only_reach_the_offender() {
    let mut duel = tictactoe_duel();

    // Bob tries to move first.
    duel.router
        .on_event(duel.bob, cell_move("lobby", "bob", 0), &mut duel.delivery);
    assert_eq!(duel.delivery.errors_for(duel.bob), vec![ErrorCode::NotYourTurn]);
    assert!(duel.delivery.events_for(duel.alice).is_empty());

    // Alice moves; bob aims at the same cell.
    duel.delivery.clear();
    duel.router
        .on_event(duel.alice, cell_move("lobby", "alice", 4), &mut duel.delivery);
    duel.router
        .on_event(duel.bob, cell_move("lobby", "bob", 4), &mut duel.delivery);
    assert_eq!(duel.delivery.errors_for(duel.bob), vec![ErrorCode::CellOccupied]);

    // It is still bob's turn; a legal move succeeds.
    duel.delivery.clear();
    duel.router
        .on_event(duel.bob, cell_move("lobby", "bob", 0), &mut duel.delivery);
    assert!(duel.delivery.errors_for(duel.bob).is_empty());
}

#[test]
fn a_drawn_game_broadcasts_a_draw() {
    let mut duel = tictactoe_duel();

    // Ends as X O X / X O O / O X X with no three-in-a-row.
    let script = [
        ("alice", 0usize),
        ("bob", 1),
        ("alice", 2),
        ("bob", 4),
        ("alice", 3),
        ("bob", 5),
        ("alice", 7),
        ("bob", 6),
        ("alice", 8),
    ];
    for (mover, index) in script {
        let conn = if mover == "alice" { duel.alice } else { duel.bob };
        duel.router
            .on_event(conn, cell_move("lobby", mover, index), &mut duel.delivery);
    }

    for member in [duel.alice, duel.bob] {
        let last = duel.delivery.events_for(member).pop().cloned().unwrap();
        assert_eq!(
            last,
            ServerEvent::StatusUpdate {
                status: PlayerStatus::GameOver,
                result: Some(GameOutcome::Draw),
            }
        );
    }
}

// ═══════════════════════════════════════════════════════════════════
// Connect-four
// ═══════════════════════════════════════════════════════════════════

#[test]
fn filling_a_column_rejects_the_next_drop_and_keeps_the_turn() {
    let mut router = EventRouter::new();
    let mut delivery = RecordingDelivery::new();
    let alice = connect(&mut router, "alice");
    let bob = connect(&mut router, "bob");
    router.on_event(alice, join(GameKind::ConnectFour, "pit", "alice"), &mut delivery);
    router.on_event(bob, join(GameKind::ConnectFour, "pit", "bob"), &mut delivery);

    // Six alternating drops fill column 0 without a win.
    for turn in 0..6 {
        let (mover, conn) = if turn % 2 == 0 {
            ("alice", alice)
        } else {
            ("bob", bob)
        };
        router.on_event(conn, column_move("pit", mover, 0), &mut delivery);
    }
    assert!(delivery.errors_for(alice).is_empty());
    assert!(delivery.errors_for(bob).is_empty());
    delivery.clear();

    // The seventh drop into column 0 is rejected; only alice hears about it.
    router.on_event(alice, column_move("pit", "alice", 0), &mut delivery);
    assert_eq!(delivery.errors_for(alice), vec![ErrorCode::ColumnFull]);
    assert!(delivery.events_for(bob).is_empty());

    // Still alice's turn; a drop into column 1 goes through.
    delivery.clear();
    router.on_event(alice, column_move("pit", "alice", 1), &mut delivery);
    let events = delivery.events_for(bob);
    let ServerEvent::BoardUpdate { current_mover, .. } = events[0] else {
        panic!("expected boardUpdate, got {:?}", events[0]);
    };
    assert_eq!(current_mover, "bob");
}

#[test]
fn connect_four_vertical_win_ends_the_game() {
    let mut router = EventRouter::new();
    let mut delivery = RecordingDelivery::new();
    let alice = connect(&mut router, "alice");
    let bob = connect(&mut router, "bob");
    router.on_event(alice, join(GameKind::ConnectFour, "pit", "alice"), &mut delivery);
    router.on_event(bob, join(GameKind::ConnectFour, "pit", "bob"), &mut delivery);

    // Alice stacks column 0; bob wastes moves in column 6.
    for _ in 0..3 {
        router.on_event(alice, column_move("pit", "alice", 0), &mut delivery);
        router.on_event(bob, column_move("pit", "bob", 6), &mut delivery);
    }
    delivery.clear();
    router.on_event(alice, column_move("pit", "alice", 0), &mut delivery);

    for member in [alice, bob] {
        let last = delivery.events_for(member).pop().cloned().unwrap();
        assert_eq!(
            last,
            ServerEvent::StatusUpdate {
                status: PlayerStatus::GameOver,
                result: Some(GameOutcome::Win {
                    winner: "alice".into()
                }),
            }
        );
    }
}

// ═══════════════════════════════════════════════════════════════════
// Rematch negotiation
// ═══════════════════════════════════════════════════════════════════

/// Play the quick top-row win so the lobby room is in the game-over phase.
fn finish_game(duel: &mut Duel) {
    let script = [("alice", 0usize), ("bob", 3), ("alice", 1), ("bob", 4), ("alice", 2)];
    for (mover, index) in script {
        let conn = if mover == "alice" { duel.alice } else { duel.bob };
        duel.router
            .on_event(conn, cell_move("lobby", mover, index), &mut duel.delivery);
    }
    duel.delivery.clear();
}

#[test]
fn rematch_negotiation_notifies_each_member_individually() {
    let mut duel = tictactoe_duel();
    finish_game(&mut duel);

    duel.router.on_event(
        duel.bob,
        rematch(GameKind::Tictactoe, "lobby", "bob"),
        &mut duel.delivery,
    );

    assert_eq!(
        duel.delivery.events_for(duel.bob),
        vec![&ServerEvent::RematchStatus {
            phase: RematchPhase::Waiting,
            requested_by: "bob".into(),
        }]
    );
    assert_eq!(
        duel.delivery.events_for(duel.alice),
        vec![&ServerEvent::RematchStatus {
            phase: RematchPhase::Pending,
            requested_by: "bob".into(),
        }]
    );
}

#[test]
fn duplicate_rematch_request_changes_nothing() {
    let mut duel = tictactoe_duel();
    finish_game(&mut duel);

    duel.router.on_event(
        duel.bob,
        rematch(GameKind::Tictactoe, "lobby", "bob"),
        &mut duel.delivery,
    );
    duel.delivery.clear();
    duel.router.on_event(
        duel.bob,
        rematch(GameKind::Tictactoe, "lobby", "bob"),
        &mut duel.delivery,
    );

    assert!(duel.delivery.events_for(duel.alice).is_empty());
    assert!(duel.delivery.events_for(duel.bob).is_empty());
}

#[test]
fn counter_request_restarts_the_game_with_a_fresh_board() {
    let mut duel = tictactoe_duel();
    finish_game(&mut duel);

    duel.router.on_event(
        duel.bob,
        rematch(GameKind::Tictactoe, "lobby", "bob"),
        &mut duel.delivery,
    );
    duel.delivery.clear();
    duel.router.on_event(
        duel.alice,
        rematch(GameKind::Tictactoe, "lobby", "alice"),
        &mut duel.delivery,
    );

    let mut movers = Vec::new();
    for member in [duel.alice, duel.bob] {
        let events = duel.delivery.events_for(member);
        let ServerEvent::BoardUpdate {
            board,
            current_mover,
        } = events[0]
        else {
            panic!("expected boardUpdate, got {:?}", events[0]);
        };
        assert!(board.iter().all(Option::is_none));
        movers.push(current_mover.clone());
        assert_eq!(
            events[1],
            &ServerEvent::StatusUpdate {
                status: PlayerStatus::Playing,
                result: None,
            }
        );
    }
    // The coin flip picks one of the two members, consistently for both.
    assert_eq!(movers[0], movers[1]);
    assert!(movers[0] == "alice" || movers[0] == "bob");

    // The new first mover can move; the other cannot.
    let (first, other, other_name) = if movers[0] == "alice" {
        (duel.alice, duel.bob, "bob")
    } else {
        (duel.bob, duel.alice, "alice")
    };
    duel.delivery.clear();
    duel.router
        .on_event(other, cell_move("lobby", other_name, 0), &mut duel.delivery);
    assert_eq!(duel.delivery.errors_for(other), vec![ErrorCode::NotYourTurn]);

    let first_name = if movers[0] == "alice" { "alice" } else { "bob" };
    duel.delivery.clear();
    duel.router
        .on_event(first, cell_move("lobby", first_name, 0), &mut duel.delivery);
    assert!(duel.delivery.errors_for(first).is_empty());
}

#[test]
fn rematch_during_a_live_game_is_rejected() {
    let mut duel = tictactoe_duel();

    duel.router.on_event(
        duel.alice,
        rematch(GameKind::Tictactoe, "lobby", "alice"),
        &mut duel.delivery,
    );
    assert_eq!(duel.delivery.errors_for(duel.alice), vec![ErrorCode::GameNotOver]);
}

// ═══════════════════════════════════════════════════════════════════
// Disconnects
// ═══════════════════════════════════════════════════════════════════

#[test]
fn disconnect_mid_game_notifies_the_survivor_with_abandonment() {
    let mut duel = tictactoe_duel();
    duel.router
        .on_event(duel.alice, cell_move("lobby", "alice", 0), &mut duel.delivery);
    duel.delivery.clear();

    duel.router.on_disconnect(duel.alice, &mut duel.delivery);

    let events = duel.delivery.events_for(duel.bob);
    let ServerEvent::MembershipUpdate { roster, count } = events[0] else {
        panic!("expected membershipUpdate, got {:?}", events[0]);
    };
    assert_eq!(*count, 1);
    assert_eq!(roster[0].identity, "bob");
    assert_eq!(
        events[1],
        &ServerEvent::StatusUpdate {
            status: PlayerStatus::GameOver,
            result: Some(GameOutcome::Abandoned),
        }
    );

    // The departed connection heard nothing and is unbound.
    assert!(duel.delivery.events_for(duel.alice).is_empty());
    assert!(duel.router.identities().resolve(duel.alice).is_none());
}

#[test]
fn disconnect_clears_a_pending_rematch_request() {
    let mut duel = tictactoe_duel();
    finish_game(&mut duel);

    duel.router.on_event(
        duel.bob,
        rematch(GameKind::Tictactoe, "lobby", "bob"),
        &mut duel.delivery,
    );
    duel.router.on_disconnect(duel.bob, &mut duel.delivery);

    let key = grid_duel::room::RoomKey::new(GameKind::Tictactoe, "lobby");
    let room = duel.router.rooms().get(&key).unwrap();
    assert!(room.rematch().is_none());
    assert_eq!(room.phase(), RoomPhase::GameOver);
}

#[test]
fn disconnect_of_the_last_member_deletes_the_room() {
    let mut router = EventRouter::new();
    let mut delivery = RecordingDelivery::new();
    let alice = connect(&mut router, "alice");
    router.on_event(alice, join(GameKind::Tictactoe, "lobby", "alice"), &mut delivery);

    router.on_disconnect(alice, &mut delivery);

    assert!(router.rooms().is_empty());
    assert!(router.identities().is_empty());
}

#[test]
fn a_new_opponent_can_join_an_abandoned_room_and_restart() {
    let mut duel = tictactoe_duel();
    duel.router
        .on_event(duel.alice, cell_move("lobby", "alice", 0), &mut duel.delivery);
    duel.router.on_disconnect(duel.alice, &mut duel.delivery);
    duel.delivery.clear();

    let carol = connect(&mut duel.router, "carol");
    duel.router.on_event(
        carol,
        join(GameKind::Tictactoe, "lobby", "carol"),
        &mut duel.delivery,
    );

    // Bob kept slot-2, carol filled slot-1, and the board restarted fresh
    // with the survivor moving first.
    let events = duel.delivery.events_for(carol);
    let ServerEvent::MembershipUpdate { roster, count } = events[0] else {
        panic!("expected membershipUpdate, got {:?}", events[0]);
    };
    assert_eq!(*count, 2);
    let carol_entry = roster.iter().find(|e| e.identity == "carol").unwrap();
    assert_eq!(carol_entry.slot, PlayerSlot::Slot1);
    let bob_entry = roster.iter().find(|e| e.identity == "bob").unwrap();
    assert_eq!(bob_entry.slot, PlayerSlot::Slot2);

    let ServerEvent::BoardUpdate {
        board,
        current_mover,
    } = events[1]
    else {
        panic!("expected boardUpdate, got {:?}", events[1]);
    };
    assert!(board.iter().all(Option::is_none));
    assert_eq!(current_mover, "bob");
}

// ═══════════════════════════════════════════════════════════════════
// Identity handling
// ═══════════════════════════════════════════════════════════════════

#[test]
fn a_reconnecting_identity_displaces_its_old_connection() {
    let mut duel = tictactoe_duel();

    // Alice reconnects from a new tab; the old connection goes stale.
    let alice_again = connect(&mut duel.router, "alice");

    duel.delivery.clear();
    duel.router
        .on_event(duel.alice, cell_move("lobby", "alice", 0), &mut duel.delivery);
    assert_eq!(
        duel.delivery.errors_for(duel.alice),
        vec![ErrorCode::IdentityUnresolved]
    );

    // The stale connection closing must not evict alice from the room.
    duel.router.on_disconnect(duel.alice, &mut duel.delivery);
    let key = grid_duel::room::RoomKey::new(GameKind::Tictactoe, "lobby");
    assert!(duel.router.rooms().get(&key).unwrap().contains("alice"));
    assert!(duel.router.identities().resolve(alice_again).is_some());
}

#[test]
fn move_in_an_unknown_room_is_rejected_with_room_not_found() {
    let mut router = EventRouter::new();
    let mut delivery = RecordingDelivery::new();
    let alice = connect(&mut router, "alice");

    router.on_event(alice, cell_move("nowhere", "alice", 0), &mut delivery);
    assert_eq!(delivery.errors_for(alice), vec![ErrorCode::RoomNotFound]);
}
