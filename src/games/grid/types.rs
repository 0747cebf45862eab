//! Core domain types for grid games.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::GameConfig;

/// Player in the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum Player {
    /// Player X (goes first).
    X,
    /// Player O (goes second).
    O,
}

impl Player {
    /// Returns the opponent player.
    pub fn opponent(self) -> Self {
        match self {
            Player::X => Player::O,
            Player::O => Player::X,
        }
    }

    /// Returns the player whose turn it is after `move_count` moves.
    pub fn for_move_count(move_count: usize) -> Self {
        if move_count % 2 == 0 {
            Player::X
        } else {
            Player::O
        }
    }

    /// Seat index in a room: X sits at 0, O at 1.
    pub fn seat(self) -> usize {
        match self {
            Player::X => 0,
            Player::O => 1,
        }
    }
}

/// A cell on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cell {
    /// Empty cell.
    Empty,
    /// Cell occupied by a player.
    Occupied(Player),
}

/// A board coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coord {
    /// Zero-based row.
    pub row: usize,
    /// Zero-based column.
    pub col: usize,
}

impl Coord {
    /// Creates a new coordinate.
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl std::fmt::Display for Coord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Square N×N board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    size: usize,
    /// Cells in row-major order.
    cells: Vec<Cell>,
}

impl Board {
    /// Creates a new empty board of the given width.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![Cell::Empty; size * size],
        }
    }

    /// Board width (and height).
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns true if the coordinate lies on the board.
    pub fn in_bounds(&self, row: usize, col: usize) -> bool {
        row < self.size && col < self.size
    }

    /// Gets the cell at the given coordinate.
    pub fn get(&self, row: usize, col: usize) -> Option<Cell> {
        if !self.in_bounds(row, col) {
            return None;
        }
        self.cells.get(row * self.size + col).copied()
    }

    /// Sets the cell at the given coordinate.
    pub fn set(&mut self, row: usize, col: usize, cell: Cell) -> Result<(), &'static str> {
        if !self.in_bounds(row, col) {
            return Err("Coordinate out of bounds");
        }
        self.cells[row * self.size + col] = cell;
        Ok(())
    }

    /// Checks if a cell is empty. Out-of-bounds cells are never empty.
    pub fn is_empty(&self, row: usize, col: usize) -> bool {
        matches!(self.get(row, col), Some(Cell::Empty))
    }

    /// Checks if every cell is occupied.
    pub fn is_full(&self) -> bool {
        self.cells.iter().all(|c| *c != Cell::Empty)
    }

    /// All empty coordinates in row-major order.
    pub fn empty_cells(&self) -> Vec<Coord> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == Cell::Empty)
            .map(|(i, _)| Coord::new(i / self.size, i % self.size))
            .collect()
    }

    /// Counts cells held by a player.
    pub fn count(&self, player: Player) -> usize {
        self.cells
            .iter()
            .filter(|c| **c == Cell::Occupied(player))
            .count()
    }

    /// Returns all cells as a slice in row-major order.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Formats the board as a human-readable string.
    pub fn display(&self) -> String {
        let mut result = String::new();
        for row in 0..self.size {
            for col in 0..self.size {
                let symbol = match self.cells[row * self.size + col] {
                    Cell::Empty => '.',
                    Cell::Occupied(Player::X) => 'X',
                    Cell::Occupied(Player::O) => 'O',
                };
                result.push(symbol);
            }
            if row + 1 < self.size {
                result.push('\n');
            }
        }
        result
    }
}

/// A recorded move. Immutable once appended to the history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    /// Row played.
    pub row: usize,
    /// Column played.
    pub col: usize,
    /// Player who moved.
    pub player: Player,
    /// When the move was accepted.
    pub timestamp: DateTime<Utc>,
}

/// A live piece in placement order, used by rolling mode to find the oldest piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementRecord {
    /// Owner of the piece.
    pub player: Player,
    /// Row of the piece.
    pub row: usize,
    /// Column of the piece.
    pub col: usize,
}

/// Current status of the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameStatus {
    /// Game is ongoing.
    Playing,
    /// Game ended in a win.
    Won(Player),
    /// Game ended in a draw.
    Draw,
}

impl GameStatus {
    /// Returns true once the game can accept no more moves.
    pub fn is_over(&self) -> bool {
        !matches!(self, GameStatus::Playing)
    }
}

/// Pieces each player currently has on the board.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedCounts {
    /// Pieces held by X.
    pub x: usize,
    /// Pieces held by O.
    pub o: usize,
}

impl PlacedCounts {
    /// Count for one player.
    pub fn get(&self, player: Player) -> usize {
        match player {
            Player::X => self.x,
            Player::O => self.o,
        }
    }

    pub(super) fn increment(&mut self, player: Player) {
        match player {
            Player::X => self.x += 1,
            Player::O => self.o += 1,
        }
    }

    pub(super) fn decrement(&mut self, player: Player) {
        match player {
            Player::X => self.x = self.x.saturating_sub(1),
            Player::O => self.o = self.o.saturating_sub(1),
        }
    }
}

/// Owned, read-only copy of an engine's state.
///
/// Mutating a snapshot never affects the engine it was taken from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    /// Rules the game is played under.
    pub config: GameConfig,
    /// Board copy.
    pub board: Board,
    /// Player to move.
    pub current_player: Player,
    /// Game status.
    pub status: GameStatus,
    /// Winner, if any.
    pub winner: Option<Player>,
    /// Winning line, `win_condition` long, empty unless won.
    pub winning_line: Vec<Coord>,
    /// Full move history.
    pub moves: Vec<Move>,
    /// Live pieces in placement order.
    pub placements: Vec<PlacementRecord>,
    /// Pieces each player has on the board.
    pub placed: PlacedCounts,
}

impl GameSnapshot {
    /// Whether the parts of the snapshot agree with each other.
    ///
    /// Client-supplied snapshots must pass this before they are searched:
    /// the board matches the configured size, every live placement sits on
    /// a cell its owner holds, no other cell is occupied, and rolling
    /// players stay within their cap.
    pub fn is_consistent(&self) -> bool {
        let size = self.board.size();
        if size == 0 || size != self.config.board_size || self.board.cells().len() != size * size {
            return false;
        }
        if self.config.win_condition == 0 || self.config.win_condition > size {
            return false;
        }
        let placed_correctly = self
            .placements
            .iter()
            .all(|p| self.board.get(p.row, p.col) == Some(Cell::Occupied(p.player)));
        let occupied = self.board.cells().iter().filter(|c| **c != Cell::Empty).count();
        if !placed_correctly || occupied != self.placements.len() {
            return false;
        }
        if self.config.rolling_mode {
            let cap = self.config.rolling_cap();
            let over_cap = |player: Player| self.placements.iter().filter(|p| p.player == player).count() > cap;
            if over_cap(Player::X) || over_cap(Player::O) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::grid::{BoardEngine, GameMode};

    #[test]
    fn test_engine_snapshots_are_consistent() {
        let mut engine = BoardEngine::new(GameMode::Training.config());
        for (i, (r, c)) in [(0, 0), (1, 1), (0, 1), (2, 2), (1, 0), (0, 2), (2, 1)].into_iter().enumerate() {
            engine.apply_move(r, c, Player::for_move_count(i)).unwrap();
            assert!(engine.snapshot().is_consistent());
        }
    }

    #[test]
    fn test_mismatched_parts_are_inconsistent() {
        let engine = BoardEngine::new(GameMode::Training.config());

        let mut short_board = engine.snapshot();
        short_board.board = Board {
            size: 3,
            cells: vec![Cell::Empty],
        };
        assert!(!short_board.is_consistent());

        let mut wrong_size = engine.snapshot();
        wrong_size.board = Board::new(4);
        assert!(!wrong_size.is_consistent());

        let mut stray_piece = engine.snapshot();
        stray_piece.board.set(1, 1, Cell::Occupied(Player::O)).unwrap();
        assert!(!stray_piece.is_consistent());

        let mut off_board = engine.snapshot();
        off_board.placements.push(PlacementRecord {
            player: Player::X,
            row: 5,
            col: 0,
        });
        assert!(!off_board.is_consistent());
    }
}
