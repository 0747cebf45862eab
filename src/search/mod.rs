//! Move search for computer-controlled players.
//!
//! 3×3 boards are solved exactly (alpha-beta for classic play, a solved
//! position table for rolling play); larger boards rank candidates with a
//! line-pattern heuristic. Difficulty mixes in random
//! play. Searches are pure functions of the snapshot they are given.

mod exact;
mod heuristic;

pub use exact::best_move as exact_best_move;
pub use heuristic::{ScoredMove, candidates, rank_moves, score_cell};

use crate::games::grid::{Coord, GameSnapshot, Player};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// Chance that a medium bot plays the exact-search move on a 3×3 board.
const MEDIUM_SEARCH_RATE: f64 = 0.7;

/// How strongly the bot plays.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Difficulty {
    /// Random moves (3×3) or the weaker half of ranked moves.
    Easy,
    /// Mostly best moves (3×3) or the stronger half of ranked moves.
    #[default]
    Medium,
    /// Always the best move found.
    Hard,
}

/// Recommends a move for `me` in the given position.
///
/// Returns `None` when the game is over, no legal move exists, or the
/// snapshot is not internally consistent.
#[instrument(skip(snapshot, rng), fields(size = snapshot.board.size(), moves = snapshot.moves.len()))]
pub fn recommend_move<R: Rng + ?Sized>(
    snapshot: &GameSnapshot,
    me: Player,
    difficulty: Difficulty,
    rng: &mut R,
) -> Option<Coord> {
    if !snapshot.is_consistent() {
        warn!("Inconsistent snapshot, no move to recommend");
        return None;
    }
    if snapshot.status.is_over() {
        debug!("Game over, no move to recommend");
        return None;
    }
    let legal = snapshot.board.empty_cells();
    if legal.is_empty() {
        return None;
    }

    let choice = if snapshot.board.size() == 3 {
        match difficulty {
            Difficulty::Easy => random_pick(&legal, rng),
            Difficulty::Medium => {
                if rng.random_bool(MEDIUM_SEARCH_RATE) {
                    exact::best_move(snapshot, me)
                } else {
                    random_pick(&legal, rng)
                }
            }
            Difficulty::Hard => exact::best_move(snapshot, me),
        }
    } else {
        let ranked = heuristic::rank_moves(snapshot, me);
        let half = ranked.len().div_ceil(2);
        let pool = match difficulty {
            Difficulty::Easy => &ranked[ranked.len() / 2..],
            Difficulty::Medium => &ranked[..half],
            Difficulty::Hard => &ranked[..ranked.len().min(1)],
        };
        if pool.is_empty() {
            None
        } else {
            Some(pool[rng.random_range(0..pool.len())].coord)
        }
    };

    debug!(?choice, %difficulty, "Move recommended");
    choice
}

fn random_pick<R: Rng + ?Sized>(cells: &[Coord], rng: &mut R) -> Option<Coord> {
    if cells.is_empty() {
        None
    } else {
        Some(cells[rng.random_range(0..cells.len())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::grid::{BoardEngine, GameMode};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_difficulty_parses() {
        assert_eq!("hard".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert_eq!(Difficulty::default(), Difficulty::Medium);
    }

    #[test]
    fn test_easy_on_large_board_picks_bottom_half() {
        let engine = BoardEngine::new(GameMode::Bot.config());
        let snapshot = engine.snapshot();
        let ranked = rank_moves(&snapshot, Player::X);
        let bottom: Vec<Coord> = ranked[ranked.len() / 2..].iter().map(|m| m.coord).collect();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let pick = recommend_move(&snapshot, Player::X, Difficulty::Easy, &mut rng).unwrap();
            assert!(bottom.contains(&pick));
        }
    }

    #[test]
    fn test_hard_on_large_board_takes_top_move() {
        let engine = BoardEngine::new(GameMode::RankedHigh.config());
        let snapshot = engine.snapshot();
        let top = rank_moves(&snapshot, Player::X)[0].coord;
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            recommend_move(&snapshot, Player::X, Difficulty::Hard, &mut rng),
            Some(top)
        );
    }
}
