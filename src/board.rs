//! Immutable board snapshot for the 6×7 grid.
//!
//! The server is authoritative for all game state. The client never mutates a
//! board cell-by-cell — every `board`/`reconnected` payload is validated with
//! [`Board::from_wire`] and replaces the previous snapshot wholesale.

use thiserror::Error;

/// Number of rows on the board.
pub const ROWS: usize = 6;

/// Number of columns on the board.
pub const COLS: usize = 7;

/// One of the two players. Encoded as `1` / `2` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Player {
    /// Player 1, who always moves first.
    One,
    /// Player 2.
    Two,
}

impl Player {
    /// The wire encoding of this player (`1` or `2`).
    pub fn number(self) -> u8 {
        match self {
            Player::One => 1,
            Player::Two => 2,
        }
    }

    /// Parse a wire player number. Returns `None` for anything but `1` or `2`.
    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Player::One),
            2 => Some(Player::Two),
            _ => None,
        }
    }

    /// The opposing player.
    pub fn other(self) -> Self {
        match self {
            Player::One => Player::Two,
            Player::Two => Player::One,
        }
    }
}

impl std::fmt::Display for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// State of a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cell {
    /// No disc has been dropped here.
    #[default]
    Empty,
    /// A disc belonging to the given player.
    Disc(Player),
}

impl Cell {
    fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(Cell::Empty),
            n => Player::from_number(n).map(Cell::Disc),
        }
    }
}

/// A board payload failed shape validation.
///
/// Malformed boards are dropped; the last valid snapshot is retained.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MalformedBoard {
    /// The grid did not have exactly 6 rows.
    #[error("expected 6 rows, got {0}")]
    RowCount(usize),

    /// A row did not have exactly 7 columns.
    #[error("row {row} has {len} columns, expected 7")]
    ColumnCount { row: usize, len: usize },

    /// A cell held a value outside {0, 1, 2}.
    #[error("cell ({row}, {col}) holds invalid value {value}")]
    CellValue { row: usize, col: usize, value: u8 },

    /// The current-player field was not 1 or 2.
    #[error("current player must be 1 or 2, got {0}")]
    Turn(u8),
}

/// Immutable snapshot of the grid plus whose turn it is.
///
/// Row 0 is the top of the board; discs stack from row 5 upward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    cells: [[Cell; COLS]; ROWS],
    turn: Player,
}

impl Board {
    /// An empty board with player 1 to move, the state of every fresh game.
    pub fn empty() -> Self {
        Self {
            cells: [[Cell::Empty; COLS]; ROWS],
            turn: Player::One,
        }
    }

    /// Validate a raw server grid and build a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedBoard`] when the grid is not 6×7, a cell is outside
    /// {0, 1, 2}, or `current_player` is not 1 or 2.
    pub fn from_wire(grid: &[Vec<u8>], current_player: u8) -> Result<Self, MalformedBoard> {
        let turn = Player::from_number(current_player).ok_or(MalformedBoard::Turn(current_player))?;

        if grid.len() != ROWS {
            return Err(MalformedBoard::RowCount(grid.len()));
        }

        let mut cells = [[Cell::Empty; COLS]; ROWS];
        for (row, (raw_row, out_row)) in grid.iter().zip(cells.iter_mut()).enumerate() {
            if raw_row.len() != COLS {
                return Err(MalformedBoard::ColumnCount {
                    row,
                    len: raw_row.len(),
                });
            }
            for (col, (&value, out)) in raw_row.iter().zip(out_row.iter_mut()).enumerate() {
                *out = Cell::from_wire(value)
                    .ok_or(MalformedBoard::CellValue { row, col, value })?;
            }
        }

        Ok(Self { cells, turn })
    }

    /// The player whose turn it is.
    pub fn turn(&self) -> Player {
        self.turn
    }

    /// The full grid, row-major from the top of the board.
    pub fn cells(&self) -> &[[Cell; COLS]; ROWS] {
        &self.cells
    }

    /// The cell at `(row, col)`, or `None` if out of bounds.
    pub fn cell(&self, row: usize, col: usize) -> Option<Cell> {
        self.cells.get(row).and_then(|r| r.get(col)).copied()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn wire_grid() -> Vec<Vec<u8>> {
        let mut grid = vec![vec![0u8; COLS]; ROWS];
        grid[5][3] = 1;
        grid[4][3] = 2;
        grid
    }

    #[test]
    fn empty_board_has_no_discs_and_player_one_to_move() {
        let board = Board::empty();
        assert_eq!(board.turn(), Player::One);
        assert!(board
            .cells()
            .iter()
            .flatten()
            .all(|&c| c == Cell::Empty));
    }

    #[test]
    fn from_wire_builds_matching_snapshot() {
        let board = Board::from_wire(&wire_grid(), 2).unwrap();
        assert_eq!(board.turn(), Player::Two);
        assert_eq!(board.cell(5, 3), Some(Cell::Disc(Player::One)));
        assert_eq!(board.cell(4, 3), Some(Cell::Disc(Player::Two)));
        assert_eq!(board.cell(0, 0), Some(Cell::Empty));
    }

    #[test]
    fn from_wire_rejects_wrong_row_count() {
        let grid = vec![vec![0u8; COLS]; 5];
        assert_eq!(
            Board::from_wire(&grid, 1).unwrap_err(),
            MalformedBoard::RowCount(5)
        );
    }

    #[test]
    fn from_wire_rejects_wrong_column_count() {
        let mut grid = vec![vec![0u8; COLS]; ROWS];
        grid[2] = vec![0u8; 8];
        assert_eq!(
            Board::from_wire(&grid, 1).unwrap_err(),
            MalformedBoard::ColumnCount { row: 2, len: 8 }
        );
    }

    #[test]
    fn from_wire_rejects_invalid_cell_value() {
        let mut grid = vec![vec![0u8; COLS]; ROWS];
        grid[1][6] = 3;
        assert_eq!(
            Board::from_wire(&grid, 1).unwrap_err(),
            MalformedBoard::CellValue {
                row: 1,
                col: 6,
                value: 3
            }
        );
    }

    #[test]
    fn from_wire_rejects_invalid_turn() {
        let grid = vec![vec![0u8; COLS]; ROWS];
        assert_eq!(
            Board::from_wire(&grid, 0).unwrap_err(),
            MalformedBoard::Turn(0)
        );
        assert_eq!(
            Board::from_wire(&grid, 9).unwrap_err(),
            MalformedBoard::Turn(9)
        );
    }

    #[test]
    fn out_of_bounds_cell_is_none() {
        let board = Board::empty();
        assert_eq!(board.cell(6, 0), None);
        assert_eq!(board.cell(0, 7), None);
    }

    #[test]
    fn player_wire_numbers_round_trip() {
        assert_eq!(Player::from_number(1), Some(Player::One));
        assert_eq!(Player::from_number(2), Some(Player::Two));
        assert_eq!(Player::from_number(0), None);
        assert_eq!(Player::One.other(), Player::Two);
        assert_eq!(Player::Two.number(), 2);
    }
}
