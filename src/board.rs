//! Pure board engine: move resolution and terminal detection.
//!
//! Everything here is deterministic and side-effect free — no I/O, no clock,
//! no randomness. Boards are flat row-major vectors with row 0 at the top, so
//! gravity settles tokens toward row `rows - 1`.

use crate::error::Rejection;
use crate::error_codes::ErrorCode;
use crate::protocol::{Cell, GameKind, MoveInput, PlayerSlot};

// ── Geometry ────────────────────────────────────────────────────────

/// How a move names its target cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Moves name a cell index directly.
    Direct,
    /// Moves name a column; the token settles in the lowest empty row.
    Gravity,
}

/// Grid shape and win rule for one game kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub columns: usize,
    pub rows: usize,
    pub win_length: usize,
    pub placement: Placement,
}

impl Geometry {
    /// The geometry for a game kind.
    pub fn of(kind: GameKind) -> Self {
        match kind {
            GameKind::Tictactoe => Self {
                columns: 3,
                rows: 3,
                win_length: 3,
                placement: Placement::Direct,
            },
            GameKind::ConnectFour => Self {
                columns: 7,
                rows: 6,
                win_length: 4,
                placement: Placement::Gravity,
            },
        }
    }

    /// Total number of cells on the board.
    pub fn cell_count(&self) -> usize {
        self.columns * self.rows
    }

    fn index(&self, column: usize, row: usize) -> usize {
        row * self.columns + column
    }
}

// ── Board ───────────────────────────────────────────────────────────

/// A terminal board state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    /// The slot completed a line of `win_length`.
    Win(PlayerSlot),
    /// The board is full with no winning line.
    Draw,
}

/// Line directions checked for wins: horizontal, vertical, both diagonals.
const DIRECTIONS: [(isize, isize); 4] = [(1, 0), (0, 1), (1, 1), (1, -1)];

/// One game board with its geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    geometry: Geometry,
    cells: Vec<Cell>,
}

impl Board {
    /// Create an empty board for the given geometry.
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            cells: vec![None; geometry.cell_count()],
        }
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// The raw cells, row-major.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Clear every cell.
    pub fn reset(&mut self) {
        self.cells.fill(None);
    }

    /// Whether every cell is occupied.
    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// Resolve a move input to the cell index it would occupy.
    ///
    /// Validation order: shape and range first (`MOVE_OUT_OF_RANGE`), then
    /// occupancy (`CELL_OCCUPIED` for direct placement, `COLUMN_FULL` for
    /// gravity). Does not mutate the board.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejection`] when the move is structurally invalid or the
    /// target is unavailable.
    pub fn resolve_move(&self, input: MoveInput) -> Result<usize, Rejection> {
        match (self.geometry.placement, input) {
            (Placement::Direct, MoveInput::Cell { index }) => {
                if index >= self.geometry.cell_count() {
                    return Err(ErrorCode::MoveOutOfRange.into());
                }
                match self.cells.get(index) {
                    Some(None) => Ok(index),
                    _ => Err(ErrorCode::CellOccupied.into()),
                }
            }
            (Placement::Gravity, MoveInput::Column { column }) => {
                if column >= self.geometry.columns {
                    return Err(ErrorCode::MoveOutOfRange.into());
                }
                (0..self.geometry.rows)
                    .rev()
                    .map(|row| self.geometry.index(column, row))
                    .find(|&index| matches!(self.cells.get(index), Some(None)))
                    .ok_or_else(|| ErrorCode::ColumnFull.into())
            }
            // Move shape does not match the placement rule.
            _ => Err(ErrorCode::MoveOutOfRange.into()),
        }
    }

    /// Resolve a move and write the slot into the resolved cell.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejection`] when [`resolve_move`](Board::resolve_move)
    /// rejects the input; the board is unchanged in that case.
    pub fn apply(&mut self, input: MoveInput, slot: PlayerSlot) -> Result<usize, Rejection> {
        let index = self.resolve_move(input)?;
        if let Some(cell) = self.cells.get_mut(index) {
            *cell = Some(slot);
        }
        Ok(index)
    }

    /// Check whether the board is terminal.
    ///
    /// Enumerates every line of `win_length` in the four directions. A win
    /// takes precedence over a draw; a full board with no win is a draw.
    pub fn check_terminal(&self) -> Option<Terminal> {
        for row in 0..self.geometry.rows {
            for column in 0..self.geometry.columns {
                let Some(slot) = self.cell(column, row) else {
                    continue;
                };
                for (dc, dr) in DIRECTIONS {
                    if self.line_complete(column, row, dc, dr, slot) {
                        return Some(Terminal::Win(slot));
                    }
                }
            }
        }
        if self.is_full() {
            Some(Terminal::Draw)
        } else {
            None
        }
    }

    /// The occupant of (column, row), or `None` when empty or out of bounds.
    fn cell(&self, column: usize, row: usize) -> Option<PlayerSlot> {
        if column >= self.geometry.columns || row >= self.geometry.rows {
            return None;
        }
        self.cells.get(self.geometry.index(column, row)).copied().flatten()
    }

    /// Whether `win_length` cells starting at (column, row) along (dc, dr)
    /// are all held by `slot`.
    fn line_complete(
        &self,
        column: usize,
        row: usize,
        dc: isize,
        dr: isize,
        slot: PlayerSlot,
    ) -> bool {
        (1..self.geometry.win_length).all(|step| {
            let Some(step) = isize::try_from(step).ok() else {
                return false;
            };
            let c = column as isize + dc * step;
            let r = row as isize + dr * step;
            if c < 0 || r < 0 {
                return false;
            }
            self.cell(c as usize, r as usize) == Some(slot)
        })
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

    fn tictactoe() -> Board {
        Board::new(Geometry::of(GameKind::Tictactoe))
    }

    fn connect_four() -> Board {
        Board::new(Geometry::of(GameKind::ConnectFour))
    }

    /// Fill a tictactoe board from a 9-char pattern: 'X' = Slot1, 'O' = Slot2,
    /// anything else empty.
    fn pattern(s: &str) -> Board {
        let mut board = tictactoe();
        for (index, ch) in s.chars().enumerate() {
            let slot = match ch {
                'X' => Some(PlayerSlot::Slot1),
                'O' => Some(PlayerSlot::Slot2),
                _ => None,
            };
            if let Some(slot) = slot {
                board.cells[index] = Some(slot);
            }
        }
        board
    }

    #[test]
    fn geometries_match_the_game_kinds() {
        let ttt = Geometry::of(GameKind::Tictactoe);
        assert_eq!((ttt.columns, ttt.rows, ttt.win_length), (3, 3, 3));
        assert_eq!(ttt.placement, Placement::Direct);
        assert_eq!(ttt.cell_count(), 9);

        let c4 = Geometry::of(GameKind::ConnectFour);
        assert_eq!((c4.columns, c4.rows, c4.win_length), (7, 6, 4));
        assert_eq!(c4.placement, Placement::Gravity);
        assert_eq!(c4.cell_count(), 42);
    }

    #[test]
    fn new_board_is_empty_and_not_terminal() {
        let board = tictactoe();
        assert!(board.cells().iter().all(Option::is_none));
        assert_eq!(board.check_terminal(), None);
    }

    #[test]
    fn direct_move_occupies_the_named_cell() {
        let mut board = tictactoe();
        let index = board
            .apply(MoveInput::Cell { index: 4 }, PlayerSlot::Slot1)
            .unwrap();
        assert_eq!(index, 4);
        assert_eq!(board.cells()[4], Some(PlayerSlot::Slot1));
    }

    #[test]
    fn direct_move_rejects_occupied_cell() {
        let mut board = tictactoe();
        board.apply(MoveInput::Cell { index: 4 }, PlayerSlot::Slot1).unwrap();
        let err = board
            .apply(MoveInput::Cell { index: 4 }, PlayerSlot::Slot2)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::CellOccupied);
        // Losing move attempt left the board untouched.
        assert_eq!(board.cells()[4], Some(PlayerSlot::Slot1));
    }

    #[test]
    fn direct_move_rejects_out_of_range_index() {
        let board = tictactoe();
        let err = board.resolve_move(MoveInput::Cell { index: 9 }).unwrap_err();
        assert_eq!(err.code, ErrorCode::MoveOutOfRange);
    }

    #[test]
    fn move_shape_must_match_placement() {
        let ttt = tictactoe();
        let err = ttt.resolve_move(MoveInput::Column { column: 0 }).unwrap_err();
        assert_eq!(err.code, ErrorCode::MoveOutOfRange);

        let c4 = connect_four();
        let err = c4.resolve_move(MoveInput::Cell { index: 0 }).unwrap_err();
        assert_eq!(err.code, ErrorCode::MoveOutOfRange);
    }

    #[test]
    fn gravity_moves_stack_from_the_bottom() {
        let mut board = connect_four();
        let first = board
            .apply(MoveInput::Column { column: 2 }, PlayerSlot::Slot1)
            .unwrap();
        let second = board
            .apply(MoveInput::Column { column: 2 }, PlayerSlot::Slot2)
            .unwrap();
        // Bottom row is row 5; the next token lands one row above.
        assert_eq!(first, 5 * 7 + 2);
        assert_eq!(second, 4 * 7 + 2);
    }

    #[test]
    fn full_column_is_rejected_and_unchanged() {
        let mut board = connect_four();
        for turn in 0..6 {
            let slot = if turn % 2 == 0 {
                PlayerSlot::Slot1
            } else {
                PlayerSlot::Slot2
            };
            board.apply(MoveInput::Column { column: 0 }, slot).unwrap();
        }
        let before = board.clone();
        let err = board
            .apply(MoveInput::Column { column: 0 }, PlayerSlot::Slot1)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ColumnFull);
        assert_eq!(board, before);
    }

    #[test]
    fn gravity_move_rejects_out_of_range_column() {
        let board = connect_four();
        let err = board.resolve_move(MoveInput::Column { column: 7 }).unwrap_err();
        assert_eq!(err.code, ErrorCode::MoveOutOfRange);
    }

    #[test]
    fn detects_tictactoe_row_win() {
        let board = pattern("XXXOO....");
        assert_eq!(board.check_terminal(), Some(Terminal::Win(PlayerSlot::Slot1)));
    }

    #[test]
    fn detects_tictactoe_column_win() {
        let board = pattern("OX.OX.O..");
        assert_eq!(board.check_terminal(), Some(Terminal::Win(PlayerSlot::Slot2)));
    }

    #[test]
    fn detects_tictactoe_diagonal_wins() {
        let down_right = pattern("XO..XO..X");
        assert_eq!(
            down_right.check_terminal(),
            Some(Terminal::Win(PlayerSlot::Slot1))
        );

        let up_right = pattern("OOX.X.X..");
        assert_eq!(
            up_right.check_terminal(),
            Some(Terminal::Win(PlayerSlot::Slot1))
        );
    }

    #[test]
    fn detects_tictactoe_draw() {
        let board = pattern("XOXXOOOXX");
        assert_eq!(board.check_terminal(), Some(Terminal::Draw));
    }

    #[test]
    fn in_progress_board_is_not_terminal() {
        let board = pattern("XOX......");
        assert_eq!(board.check_terminal(), None);
    }

    #[test]
    fn detects_connect_four_vertical_win() {
        let mut board = connect_four();
        for _ in 0..4 {
            board.apply(MoveInput::Column { column: 3 }, PlayerSlot::Slot1).unwrap();
        }
        assert_eq!(board.check_terminal(), Some(Terminal::Win(PlayerSlot::Slot1)));
    }

    #[test]
    fn detects_connect_four_horizontal_win() {
        let mut board = connect_four();
        for column in 0..4 {
            board.apply(MoveInput::Column { column }, PlayerSlot::Slot2).unwrap();
        }
        assert_eq!(board.check_terminal(), Some(Terminal::Win(PlayerSlot::Slot2)));
    }

    #[test]
    fn detects_connect_four_diagonal_win() {
        let mut board = connect_four();
        // Build a staircase for Slot1 at columns 0-3 with Slot2 filler below.
        let filler = PlayerSlot::Slot2;
        let winner = PlayerSlot::Slot1;
        for (column, height) in [(1, 1), (2, 2), (3, 3)] {
            for _ in 0..height {
                board.apply(MoveInput::Column { column }, filler).unwrap();
            }
        }
        for column in 0..4 {
            board.apply(MoveInput::Column { column }, winner).unwrap();
        }
        assert_eq!(board.check_terminal(), Some(Terminal::Win(winner)));
    }

    #[test]
    fn three_in_a_row_is_not_a_connect_four_win() {
        let mut board = connect_four();
        for column in 0..3 {
            board.apply(MoveInput::Column { column }, PlayerSlot::Slot1).unwrap();
        }
        assert_eq!(board.check_terminal(), None);
    }

    #[test]
    fn reset_clears_every_cell() {
        let mut board = tictactoe();
        board.apply(MoveInput::Cell { index: 0 }, PlayerSlot::Slot1).unwrap();
        board.reset();
        assert!(board.cells().iter().all(Option::is_none));
    }
}
