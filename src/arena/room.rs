//! Room lifecycle types.

use chrono::{DateTime, Utc};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};

use crate::games::grid::{GameConfig, Player};
use crate::search::Difficulty;

/// Unique identifier for a room.
pub type RoomId = String;

/// Unique identifier for a player (wallet identity).
pub type PlayerId = String;

/// Identity the practice bot plays under.
pub const BOT_PLAYER_ID: &str = "bot";

/// Lifecycle of a room. Rooms are never reused once finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    /// One player seated, waiting for an opponent.
    Waiting,
    /// Both seats filled, game running.
    Active,
    /// Game over or abandoned.
    Finished,
}

/// Room state shared with clients and persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[serde(rename_all = "camelCase")]
pub struct RoomState {
    room_id: RoomId,
    config: GameConfig,
    /// Seat 0 plays X, seat 1 plays O.
    players: Vec<PlayerId>,
    status: RoomStatus,
    created_at: DateTime<Utc>,
    /// Bot strength when the O seat is the practice bot.
    bot: Option<Difficulty>,
}

impl RoomState {
    pub(crate) fn new(room_id: RoomId, config: GameConfig, first_player: PlayerId) -> Self {
        Self {
            room_id,
            config,
            players: vec![first_player],
            status: RoomStatus::Waiting,
            created_at: Utc::now(),
            bot: None,
        }
    }

    pub(crate) fn seat(&mut self, player: PlayerId) {
        if self.players.len() < 2 {
            self.players.push(player);
        }
    }

    pub(crate) fn set_status(&mut self, status: RoomStatus) {
        self.status = status;
    }

    pub(crate) fn set_bot(&mut self, difficulty: Difficulty) {
        self.bot = Some(difficulty);
    }

    /// Returns true once both seats are taken.
    pub fn is_full(&self) -> bool {
        self.players.len() >= 2
    }

    /// Returns true if the identity holds a seat.
    pub fn has_player(&self, player_id: &str) -> bool {
        self.players.iter().any(|p| p == player_id)
    }

    /// Symbol assigned to the identity, if seated.
    pub fn symbol_of(&self, player_id: &str) -> Option<Player> {
        match self.players.iter().position(|p| p == player_id) {
            Some(0) => Some(Player::X),
            Some(1) => Some(Player::O),
            _ => None,
        }
    }

    /// Identity seated as the given symbol.
    pub fn player_for(&self, symbol: Player) -> Option<&PlayerId> {
        self.players.get(symbol.seat())
    }

    /// The other seated identity.
    pub fn opponent_of(&self, player_id: &str) -> Option<&PlayerId> {
        self.players.iter().find(|p| p.as_str() != player_id)
    }

    /// Returns true for rooms whose O seat is the practice bot.
    pub fn is_practice(&self) -> bool {
        self.bot.is_some()
    }
}
