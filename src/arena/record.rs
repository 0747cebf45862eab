//! Finished-game records handed to persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{DbError, NewGameRecord};
use crate::games::grid::{GameMode, Move};

use super::room::{PlayerId, RoomId};

/// Immutable summary of one finished game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRecord {
    /// Room the game was played in.
    pub room_id: RoomId,
    /// Mode played.
    pub mode: GameMode,
    /// Identity that played X.
    pub player_x: PlayerId,
    /// Identity that played O.
    pub player_o: PlayerId,
    /// Winning identity; `None` for a draw or abandoned game.
    pub winner: Option<PlayerId>,
    /// Full move history.
    pub moves: Vec<Move>,
    /// Entry fee per player in lamports, zero for free modes.
    pub stake_lamports: u64,
    /// When the room became active.
    pub started_at: DateTime<Utc>,
    /// When the game ended.
    pub finished_at: DateTime<Utc>,
}

impl GameRecord {
    /// Converts to the insertable row, encoding moves as JSON.
    pub fn to_row(&self) -> Result<NewGameRecord, DbError> {
        let moves = serde_json::to_string(&self.moves)
            .map_err(|e| DbError::new(format!("Failed to encode moves: {}", e)))?;
        Ok(NewGameRecord::new(
            self.room_id.clone(),
            self.mode.to_string(),
            self.player_x.clone(),
            self.player_o.clone(),
            self.winner.clone(),
            moves,
            i64::try_from(self.stake_lamports).unwrap_or(i64::MAX),
            self.started_at.naive_utc(),
            self.finished_at.naive_utc(),
        ))
    }
}
