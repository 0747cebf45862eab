//! Authoritative per-room game engine.

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use super::rules::{find_winner, is_draw};
use super::types::{
    Board, Cell, Coord, GameSnapshot, GameStatus, Move, PlacedCounts, PlacementRecord, Player,
};
use super::GameConfig;

/// Error that can occur when applying a move.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum MoveError {
    /// The coordinate is outside the board.
    #[display("Cell ({}, {}) is off the board", _0, _1)]
    OutOfBounds(usize, usize),

    /// It's not this player's turn.
    #[display("It's not {}'s turn", _0)]
    WrongPlayer(Player),

    /// The target cell already holds a piece.
    #[display("Cell {} is already occupied", _0)]
    CellOccupied(Coord),

    /// The game is already over.
    #[display("Game is already over")]
    GameOver,
}

impl std::error::Error for MoveError {}

/// Grid game engine.
///
/// The player to move is derived from move-count parity: X moves when the
/// history length is even, O otherwise.
#[derive(Debug, Clone)]
pub struct BoardEngine {
    config: GameConfig,
    board: Board,
    moves: Vec<Move>,
    placements: Vec<PlacementRecord>,
    placed: PlacedCounts,
    status: GameStatus,
    winning_line: Vec<Coord>,
}

impl BoardEngine {
    /// Creates an engine with an empty board.
    #[instrument]
    pub fn new(config: GameConfig) -> Self {
        Self {
            config,
            board: Board::new(config.board_size),
            moves: Vec::new(),
            placements: Vec::new(),
            placed: PlacedCounts::default(),
            status: GameStatus::Playing,
            winning_line: Vec::new(),
        }
    }

    /// Returns the rules this engine plays under.
    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Returns the player to move.
    pub fn current_player(&self) -> Player {
        Player::for_move_count(self.moves.len())
    }

    /// Returns the game status.
    pub fn status(&self) -> GameStatus {
        self.status
    }

    /// Number of moves played.
    pub fn move_count(&self) -> usize {
        self.moves.len()
    }

    /// Applies a move for `player` at (`row`, `col`).
    ///
    /// In rolling mode a player already holding the cap loses their oldest
    /// surviving piece before the new one is placed. The destination must be
    /// empty in every mode.
    ///
    /// # Errors
    ///
    /// Returns [`MoveError`] for off-board coordinates, out-of-turn moves,
    /// occupied cells, or a finished game.
    #[instrument(skip(self), fields(mode = %self.config.mode, moves = self.moves.len()))]
    pub fn apply_move(&mut self, row: usize, col: usize, player: Player) -> Result<(), MoveError> {
        if self.status.is_over() {
            warn!("Move after game end");
            return Err(MoveError::GameOver);
        }
        if !self.board.in_bounds(row, col) {
            return Err(MoveError::OutOfBounds(row, col));
        }
        if player != self.current_player() {
            debug!(expected = %self.current_player(), "Out-of-turn move");
            return Err(MoveError::WrongPlayer(player));
        }
        if !self.board.is_empty(row, col) {
            return Err(MoveError::CellOccupied(Coord::new(row, col)));
        }

        if self.config.rolling_mode && self.placed.get(player) >= self.config.rolling_cap() {
            self.evict_oldest(player);
        }

        self.board
            .set(row, col, Cell::Occupied(player))
            .map_err(|_| MoveError::OutOfBounds(row, col))?;
        self.placements.push(PlacementRecord { player, row, col });
        self.placed.increment(player);
        self.moves.push(Move {
            row,
            col,
            player,
            timestamp: Utc::now(),
        });

        self.update_status();
        debug!(status = ?self.status, "Move applied");
        Ok(())
    }

    fn evict_oldest(&mut self, player: Player) {
        let Some(index) = self.placements.iter().position(|p| p.player == player) else {
            return;
        };
        let oldest = self.placements.remove(index);
        if let Err(e) = self.board.set(oldest.row, oldest.col, Cell::Empty) {
            warn!(error = e, row = oldest.row, col = oldest.col, "Evicted piece was off the board");
        }
        self.placed.decrement(player);
        debug!(%player, row = oldest.row, col = oldest.col, "Evicted oldest piece");
    }

    fn update_status(&mut self) {
        if let Some((winner, line)) = find_winner(&self.board, self.config.win_condition) {
            info!(%winner, "Game won");
            self.status = GameStatus::Won(winner);
            self.winning_line = line;
        } else if is_draw(&self.board, &self.config) {
            info!("Game drawn");
            self.status = GameStatus::Draw;
            self.winning_line.clear();
        } else {
            self.status = GameStatus::Playing;
            self.winning_line.clear();
        }
    }

    /// Returns a deep copy of the engine state.
    #[instrument(skip(self))]
    pub fn snapshot(&self) -> GameSnapshot {
        let winner = match self.status {
            GameStatus::Won(p) => Some(p),
            _ => None,
        };
        GameSnapshot {
            config: self.config,
            board: self.board.clone(),
            current_player: self.current_player(),
            status: self.status,
            winner,
            winning_line: self.winning_line.clone(),
            moves: self.moves.clone(),
            placements: self.placements.clone(),
            placed: self.placed,
        }
    }

    /// Takes back the last move.
    ///
    /// Pieces evicted by that move are not restored. Returns `false` when
    /// there is nothing to undo.
    #[instrument(skip(self))]
    pub fn undo(&mut self) -> bool {
        let Some(last) = self.moves.pop() else {
            return false;
        };
        if let Err(e) = self.board.set(last.row, last.col, Cell::Empty) {
            warn!(error = e, row = last.row, col = last.col, "Undone move was off the board");
        }
        self.placed.decrement(last.player);
        if let Some(index) = self
            .placements
            .iter()
            .rposition(|p| p.player == last.player && p.row == last.row && p.col == last.col)
        {
            self.placements.remove(index);
        }
        self.update_status();
        debug!(row = last.row, col = last.col, "Move undone");
        true
    }

    /// Restores the post-construction state with the same rules.
    #[instrument(skip(self))]
    pub fn reset(&mut self) {
        *self = Self::new(self.config);
    }
}
