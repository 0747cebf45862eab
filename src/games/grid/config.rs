//! Game modes and the fixed mode → rules table.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, instrument};

/// A playable mode. Each mode maps to one fixed [`GameConfig`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum GameMode {
    /// Free 3×3 rolling practice.
    Training,
    /// Free 6×6 four-in-a-row against the bot.
    Bot,
    /// Staked 3×3 rolling.
    RankedLow,
    /// Staked 6×6 four-in-a-row.
    RankedMid,
    /// Staked 8×8 five-in-a-row.
    RankedHigh,
}

impl GameMode {
    /// Resolves a client-supplied mode name.
    ///
    /// Unknown names fall back to [`GameMode::Training`], the smallest free configuration.
    #[instrument]
    pub fn resolve(name: &str) -> Self {
        match GameMode::from_str(name) {
            Ok(mode) => mode,
            Err(_) => {
                debug!(name, "Unknown mode, falling back to training");
                GameMode::Training
            }
        }
    }

    /// Returns true if matches in this mode carry a stake.
    pub fn is_staked(self) -> bool {
        matches!(
            self,
            GameMode::RankedLow | GameMode::RankedMid | GameMode::RankedHigh
        )
    }

    /// Looks up the rules for this mode.
    pub fn config(self) -> GameConfig {
        let (board_size, win_condition, rolling_mode) = match self {
            GameMode::Training => (3, 3, true),
            GameMode::Bot => (6, 4, false),
            GameMode::RankedLow => (3, 3, true),
            GameMode::RankedMid => (6, 4, false),
            GameMode::RankedHigh => (8, 5, false),
        };
        GameConfig {
            mode: self,
            board_size,
            win_condition,
            rolling_mode,
        }
    }
}

/// Rules of a room, fixed at room creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameConfig {
    /// Mode the rules were derived from.
    pub mode: GameMode,
    /// Board width.
    pub board_size: usize,
    /// Pieces in a row needed to win.
    pub win_condition: usize,
    /// Whether each player's oldest piece expires past the cap.
    pub rolling_mode: bool,
}

impl GameConfig {
    /// Maximum simultaneous pieces per player under rolling mode.
    pub fn rolling_cap(&self) -> usize {
        if self.board_size == 3 { 3 } else { 4 }
    }
}

impl From<GameMode> for GameConfig {
    fn from(mode: GameMode) -> Self {
        mode.config()
    }
}
