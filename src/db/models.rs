//! Database models and domain types.

use chrono::NaiveDateTime;
use derive_getters::Getters;
use derive_new::new;
use diesel::prelude::*;
use tracing::instrument;

use crate::db::{DbError, schema};

/// Rating a newly created user starts with.
pub const STARTING_RATING: i32 = 1000;

/// Fixed rating change per decided game.
pub const RATING_DELTA: i32 = 20;

/// User profile database model, keyed by wallet identity.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Getters)]
#[diesel(table_name = schema::users)]
pub struct User {
    id: i32,
    identity: String,
    rating: i32,
    games_played: i32,
    wins: i32,
    losses: i32,
    draws: i32,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

/// Insertable user model for creating new users.
#[derive(Debug, Clone, Insertable, new)]
#[diesel(table_name = schema::users)]
pub struct NewUser {
    identity: String,
}

/// Persisted room.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Getters)]
#[diesel(table_name = schema::rooms)]
pub struct RoomRow {
    id: String,
    mode: String,
    board_size: i32,
    win_condition: i32,
    rolling_mode: bool,
    player_x: String,
    player_o: Option<String>,
    status: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

/// Insertable room model.
#[derive(Debug, Clone, Insertable, new, Getters)]
#[diesel(table_name = schema::rooms)]
pub struct NewRoom {
    id: String,
    mode: String,
    board_size: i32,
    win_condition: i32,
    rolling_mode: bool,
    player_x: String,
    player_o: Option<String>,
    status: String,
}

/// Finished game record.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Getters)]
#[diesel(table_name = schema::games)]
pub struct GameRecordRow {
    id: i32,
    room_id: String,
    mode: String,
    player_x: String,
    player_o: String,
    winner: Option<String>,
    moves: String,
    stake_lamports: i64,
    started_at: NaiveDateTime,
    finished_at: NaiveDateTime,
}

/// Insertable game record. `moves` holds the JSON-encoded move history.
#[derive(Debug, Clone, Insertable, new, Getters)]
#[diesel(table_name = schema::games)]
pub struct NewGameRecord {
    room_id: String,
    mode: String,
    player_x: String,
    player_o: String,
    winner: Option<String>,
    moves: String,
    stake_lamports: i64,
    started_at: NaiveDateTime,
    finished_at: NaiveDateTime,
}

/// Game outcome from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameOutcome {
    /// User won the game.
    Win,
    /// User lost the game.
    Loss,
    /// Game ended in a draw.
    Draw,
}

impl GameOutcome {
    /// Converts outcome to the string stored in the database.
    #[instrument]
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Win => "win",
            Self::Loss => "loss",
            Self::Draw => "draw",
        }
    }

    /// Parses outcome from the string stored in the database.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the string is not a valid outcome value.
    #[instrument(skip(s), fields(s = %s))]
    pub fn from_db_string(s: &str) -> Result<Self, DbError> {
        match s {
            "win" => Ok(Self::Win),
            "loss" => Ok(Self::Loss),
            "draw" => Ok(Self::Draw),
            _ => Err(DbError::new(format!("Invalid outcome: '{}'", s))),
        }
    }

    /// Rating change applied for this outcome.
    pub fn rating_delta(&self) -> i32 {
        match self {
            Self::Win => RATING_DELTA,
            Self::Loss => -RATING_DELTA,
            Self::Draw => 0,
        }
    }
}
