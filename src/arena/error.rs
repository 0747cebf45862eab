//! Orchestrator error types.

use crate::db::DbError;
use crate::games::grid::MoveError;

/// Failure of a room, queue or move operation.
///
/// Every variant is recoverable; the transport layer turns them into
/// client-visible error events.
#[derive(Debug, Clone, derive_more::Display, derive_more::From)]
pub enum ArenaError {
    /// The engine rejected the move.
    #[display("Invalid move: {}", _0)]
    #[from]
    InvalidMove(MoveError),

    /// No room with this id exists.
    #[display("Room {} not found", _0)]
    #[from(ignore)]
    RoomNotFound(String),

    /// The room already has two players.
    #[display("Room {} is full", _0)]
    #[from(ignore)]
    RoomFull(String),

    /// The room has no running game.
    #[display("Room {} has no active game", _0)]
    #[from(ignore)]
    GameNotActive(String),

    /// The player holds no seat in the room.
    #[display("Player {} is not in this room", _0)]
    #[from(ignore)]
    NotInRoom(String),

    /// The room could not be stored.
    #[display("Persistence failed: {}", _0)]
    #[from]
    Persistence(DbError),
}

impl std::error::Error for ArenaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ArenaError::InvalidMove(e) => Some(e),
            ArenaError::Persistence(e) => Some(e),
            _ => None,
        }
    }
}
