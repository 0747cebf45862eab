//! Generalized N-in-a-row on square boards, with an optional rolling variant.

mod config;
mod engine;
mod rules;
mod types;

pub use config::{GameConfig, GameMode};
pub use engine::{BoardEngine, MoveError};
pub use rules::{DIRECTIONS, find_winner, is_draw};
pub use types::{
    Board, Cell, Coord, GameSnapshot, GameStatus, Move, PlacedCounts, PlacementRecord, Player,
};
