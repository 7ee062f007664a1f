//! Rooms and the room registry.
//!
//! Rooms are keyed by `(game kind, room name)` and created lazily on first
//! join. A room holds at most two members; a room with zero members is
//! deleted immediately, so empty rooms never dangle.

use std::collections::HashMap;
use std::fmt;

use crate::board::{Board, Geometry};
use crate::error::Rejection;
use crate::error_codes::ErrorCode;
use crate::protocol::{GameKind, Identity, PlayerSlot, PlayerStatus, RoomName, RosterEntry};

// ── Room key ────────────────────────────────────────────────────────

/// Registry key: the same room name under two game kinds is two rooms.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomKey {
    pub game: GameKind,
    pub name: RoomName,
}

impl RoomKey {
    pub fn new(game: GameKind, name: impl Into<RoomName>) -> Self {
        Self {
            game,
            name: name.into(),
        }
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.game.as_str(), self.name)
    }
}

// ── Room ────────────────────────────────────────────────────────────

/// Lifecycle phase of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    /// One member, waiting for an opponent.
    Waiting,
    /// Two members, game in progress.
    Playing,
    /// Game finished (win, draw, or abandonment).
    GameOver,
}

/// An open rematch request awaiting the other member's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RematchRequest {
    pub requested_by: Identity,
}

/// One room: its members, board, and turn state.
#[derive(Debug)]
pub struct Room {
    game: GameKind,
    /// Members in join order, at most two.
    members: Vec<(Identity, PlayerSlot)>,
    pub(crate) board: Board,
    pub(crate) phase: RoomPhase,
    pub(crate) first_player: Option<Identity>,
    pub(crate) current_player: Option<Identity>,
    pub(crate) rematch: Option<RematchRequest>,
}

impl Room {
    fn new(game: GameKind) -> Self {
        Self {
            game,
            members: Vec::with_capacity(2),
            board: Board::new(Geometry::of(game)),
            phase: RoomPhase::Waiting,
            first_player: None,
            current_player: None,
            rematch: None,
        }
    }

    pub fn game(&self) -> GameKind {
        self.game
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn phase(&self) -> RoomPhase {
        self.phase
    }

    pub fn rematch(&self) -> Option<&RematchRequest> {
        self.rematch.as_ref()
    }

    /// Whose turn it is, when a game is in progress.
    pub fn current_mover(&self) -> Option<&Identity> {
        self.current_player.as_ref()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= 2
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.members.iter().any(|(member, _)| member == identity)
    }

    /// The slot held by a member.
    pub fn slot_of(&self, identity: &str) -> Option<PlayerSlot> {
        self.members
            .iter()
            .find(|(member, _)| member == identity)
            .map(|(_, slot)| *slot)
    }

    /// The identity holding a slot.
    pub fn identity_with_slot(&self, slot: PlayerSlot) -> Option<&Identity> {
        self.members
            .iter()
            .find(|(_, held)| *held == slot)
            .map(|(member, _)| member)
    }

    /// The member that is not `identity`.
    pub fn other_member(&self, identity: &str) -> Option<&Identity> {
        self.members
            .iter()
            .find(|(member, _)| member != identity)
            .map(|(member, _)| member)
    }

    /// Current membership roster, in join order.
    pub fn roster(&self) -> Vec<RosterEntry> {
        self.members
            .iter()
            .map(|(identity, slot)| RosterEntry {
                identity: identity.clone(),
                slot: *slot,
            })
            .collect()
    }

    /// What a member is currently permitted to do, derived from the room
    /// phase and any open rematch request.
    pub fn status_of(&self, identity: &str) -> PlayerStatus {
        match self.phase {
            RoomPhase::Waiting => PlayerStatus::Waiting,
            RoomPhase::Playing => PlayerStatus::Playing,
            RoomPhase::GameOver => match &self.rematch {
                Some(request) if request.requested_by == identity => PlayerStatus::RematchWaiting,
                Some(_) => PlayerStatus::RematchPending,
                None => PlayerStatus::GameOver,
            },
        }
    }

    /// Add a member and assign its slot.
    ///
    /// The first member of a fresh room takes slot-1 and becomes both
    /// `first_player` and `current_player`. The second member always takes
    /// the complement of whatever slot the first member holds, so a survivor
    /// of an abandonment keeps their original slot.
    fn add_member(&mut self, identity: Identity) -> Result<PlayerSlot, Rejection> {
        if self.contains(&identity) {
            return Err(ErrorCode::AlreadyJoined.into());
        }
        if self.is_full() {
            return Err(ErrorCode::RoomFull.into());
        }
        let slot = match self.members.first() {
            Some((_, held)) => held.complement(),
            None => PlayerSlot::Slot1,
        };
        if self.members.is_empty() {
            self.first_player = Some(identity.clone());
            self.current_player = Some(identity.clone());
        }
        self.members.push((identity, slot));
        Ok(slot)
    }

    /// Start (or restart) the game: fresh board, first player to move.
    pub(crate) fn start(&mut self) {
        self.board.reset();
        self.phase = RoomPhase::Playing;
        self.current_player = self.first_player.clone();
        self.rematch = None;
    }

    /// Remove a member, clearing any open rematch request.
    ///
    /// A survivor becomes the room's first (and current) player so a later
    /// joiner slots in as their opponent; the room moves to the game-over
    /// phase until then.
    fn remove_member(&mut self, identity: &str) -> Option<PlayerSlot> {
        let position = self
            .members
            .iter()
            .position(|(member, _)| member == identity)?;
        let (_, slot) = self.members.remove(position);
        self.rematch = None;
        if let Some((survivor, _)) = self.members.first() {
            self.first_player = Some(survivor.clone());
            self.current_player = Some(survivor.clone());
            self.phase = RoomPhase::GameOver;
        }
        Some(slot)
    }
}

// ── Registry ────────────────────────────────────────────────────────

/// Result of a successful join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    /// Slot assigned to the joiner.
    pub slot: PlayerSlot,
    /// Whether this join filled the room and started a game.
    pub started: bool,
}

/// Result of removing a member from whichever room held them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub key: RoomKey,
    /// The member left behind, when the room survived.
    pub survivor: Option<Identity>,
}

/// All live rooms, keyed by `(game kind, room name)`.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<RoomKey, Room>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &RoomKey) -> Option<&Room> {
        self.rooms.get(key)
    }

    pub fn get_mut(&mut self, key: &RoomKey) -> Option<&mut Room> {
        self.rooms.get_mut(key)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// The key of the room an identity is a member of, if any.
    pub fn room_of(&self, identity: &str) -> Option<&RoomKey> {
        self.rooms
            .iter()
            .find(|(_, room)| room.contains(identity))
            .map(|(key, _)| key)
    }

    /// Join a room, creating it if it does not exist.
    ///
    /// # Errors
    ///
    /// Rejects a member of this or any other room (`ALREADY_JOINED`) and a
    /// third joiner (`ROOM_FULL`). Rejections leave the registry unchanged.
    pub fn join(&mut self, key: RoomKey, identity: Identity) -> Result<JoinOutcome, Rejection> {
        // One room per identity; checked before lazy creation so a rejected
        // join never leaves a fresh empty room behind.
        if self.room_of(&identity).is_some() {
            return Err(ErrorCode::AlreadyJoined.into());
        }
        let game = key.game;
        let room = self
            .rooms
            .entry(key.clone())
            .or_insert_with(|| {
                tracing::info!(room = %key, "room created");
                Room::new(game)
            });
        let slot = room.add_member(identity)?;
        let started = room.is_full();
        if started {
            room.start();
        }
        Ok(JoinOutcome { slot, started })
    }

    /// Remove an identity from whichever room holds it, deleting the room
    /// if it is now empty.
    pub fn remove_member(&mut self, identity: &str) -> Option<Departure> {
        let key = self.room_of(identity)?.clone();
        let room = self.rooms.get_mut(&key)?;
        room.remove_member(identity)?;
        let survivor = room
            .roster()
            .first()
            .map(|entry| entry.identity.clone());
        if survivor.is_none() {
            self.rooms.remove(&key);
            tracing::info!(room = %key, "empty room deleted");
        }
        Some(Departure { key, survivor })
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

    fn key(name: &str) -> RoomKey {
        RoomKey::new(GameKind::Tictactoe, name)
    }

    #[test]
    fn join_creates_the_room_lazily() {
        let mut registry = RoomRegistry::new();
        assert!(registry.is_empty());

        let outcome = registry.join(key("lobby"), "alice".into()).unwrap();
        assert_eq!(outcome.slot, PlayerSlot::Slot1);
        assert!(!outcome.started);
        assert_eq!(registry.len(), 1);

        let room = registry.get(&key("lobby")).unwrap();
        assert_eq!(room.phase(), RoomPhase::Waiting);
        assert_eq!(room.status_of("alice"), PlayerStatus::Waiting);
    }

    #[test]
    fn second_join_gets_the_complement_slot_and_starts_the_game() {
        let mut registry = RoomRegistry::new();
        registry.join(key("lobby"), "alice".into()).unwrap();
        let outcome = registry.join(key("lobby"), "bob".into()).unwrap();

        assert_eq!(outcome.slot, PlayerSlot::Slot2);
        assert!(outcome.started);

        let room = registry.get(&key("lobby")).unwrap();
        assert_eq!(room.phase(), RoomPhase::Playing);
        assert_eq!(room.current_player.as_deref(), Some("alice"));
        assert!(room.board().cells().iter().all(Option::is_none));
    }

    #[test]
    fn third_join_is_rejected() {
        let mut registry = RoomRegistry::new();
        registry.join(key("lobby"), "alice".into()).unwrap();
        registry.join(key("lobby"), "bob".into()).unwrap();

        let err = registry.join(key("lobby"), "carol".into()).unwrap_err();
        assert_eq!(err.code, ErrorCode::RoomFull);
        assert_eq!(registry.get(&key("lobby")).unwrap().member_count(), 2);
    }

    #[test]
    fn repeat_join_is_rejected() {
        let mut registry = RoomRegistry::new();
        registry.join(key("lobby"), "alice".into()).unwrap();

        let err = registry.join(key("lobby"), "alice".into()).unwrap_err();
        assert_eq!(err.code, ErrorCode::AlreadyJoined);
    }

    #[test]
    fn an_identity_belongs_to_at_most_one_room() {
        let mut registry = RoomRegistry::new();
        registry.join(key("first"), "alice".into()).unwrap();

        let err = registry.join(key("second"), "alice".into()).unwrap_err();
        assert_eq!(err.code, ErrorCode::AlreadyJoined);
        // The rejected join must not have created the second room.
        assert!(registry.get(&key("second")).is_none());
    }

    #[test]
    fn same_name_under_two_game_kinds_is_two_rooms() {
        let mut registry = RoomRegistry::new();
        registry
            .join(RoomKey::new(GameKind::Tictactoe, "shared"), "alice".into())
            .unwrap();
        registry
            .join(RoomKey::new(GameKind::ConnectFour, "shared"), "bob".into())
            .unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn removing_the_last_member_deletes_the_room() {
        let mut registry = RoomRegistry::new();
        registry.join(key("lobby"), "alice".into()).unwrap();

        let departure = registry.remove_member("alice").unwrap();
        assert_eq!(departure.key, key("lobby"));
        assert_eq!(departure.survivor, None);
        assert!(registry.is_empty());
    }

    #[test]
    fn survivor_keeps_their_slot_and_newcomer_takes_the_complement() {
        let mut registry = RoomRegistry::new();
        registry.join(key("lobby"), "alice".into()).unwrap();
        registry.join(key("lobby"), "bob".into()).unwrap();

        // Alice (slot-1) leaves; Bob survives with slot-2.
        let departure = registry.remove_member("alice").unwrap();
        assert_eq!(departure.survivor.as_deref(), Some("bob"));

        let room = registry.get(&key("lobby")).unwrap();
        assert_eq!(room.phase(), RoomPhase::GameOver);
        assert_eq!(room.slot_of("bob"), Some(PlayerSlot::Slot2));
        assert_eq!(room.first_player.as_deref(), Some("bob"));

        // A newcomer fills the complement of the survivor's slot.
        let outcome = registry.join(key("lobby"), "carol".into()).unwrap();
        assert_eq!(outcome.slot, PlayerSlot::Slot1);
        assert!(outcome.started);

        let room = registry.get(&key("lobby")).unwrap();
        assert_eq!(room.phase(), RoomPhase::Playing);
        assert_eq!(room.current_player.as_deref(), Some("bob"));
    }

    #[test]
    fn removing_a_member_clears_a_pending_rematch() {
        let mut registry = RoomRegistry::new();
        registry.join(key("lobby"), "alice".into()).unwrap();
        registry.join(key("lobby"), "bob".into()).unwrap();

        let room = registry.get_mut(&key("lobby")).unwrap();
        room.phase = RoomPhase::GameOver;
        room.rematch = Some(RematchRequest {
            requested_by: "alice".into(),
        });

        registry.remove_member("alice").unwrap();
        assert!(registry.get(&key("lobby")).unwrap().rematch().is_none());
    }

    #[test]
    fn removing_an_unknown_identity_is_a_no_op() {
        let mut registry = RoomRegistry::new();
        registry.join(key("lobby"), "alice".into()).unwrap();
        assert!(registry.remove_member("ghost").is_none());
        assert_eq!(registry.len(), 1);
    }
}
