//! Storage boundary required by the match orchestrator.

use crate::db::{DbError, GameOutcome, NewGameRecord, NewRoom, User};

/// Durable storage for users, rooms and finished games.
///
/// Implementations must be safe to call from any thread; the orchestrator
/// never holds room state locks while calling into the store.
pub trait GameStore: Send + Sync + std::fmt::Debug {
    /// Returns the user with this identity, creating a fresh profile if needed.
    fn find_or_create_user(&self, identity: &str) -> Result<User, DbError>;

    /// Persists a newly created room.
    fn create_room(&self, room: NewRoom) -> Result<(), DbError>;

    /// Records the second player of a room.
    fn join_room(&self, room_id: &str, player_o: &str) -> Result<(), DbError>;

    /// Updates a room's lifecycle status.
    fn update_room_status(&self, room_id: &str, status: &str) -> Result<(), DbError>;

    /// Appends an immutable finished-game record.
    fn append_game_record(&self, record: NewGameRecord) -> Result<(), DbError>;

    /// Applies one game outcome to a user's cumulative stats and rating.
    fn update_user_stats(&self, identity: &str, outcome: GameOutcome) -> Result<User, DbError>;
}
