//! Line-pattern scoring for boards too large to search exactly.

use crate::games::grid::{Cell, Coord, DIRECTIONS, GameSnapshot, Player};
use tracing::{debug, instrument};

/// Board width above which only the nearest candidates are scored.
const WIDEST_BOARD: usize = 8;
/// Candidates scored on the widest board.
const WIDEST_BOARD_CANDIDATES: usize = 30;

const DEFENSE_WEIGHT: f64 = 1.2;
const OFFENSE_COMPLETE: f64 = 1_000_000.0;
const DEFENSE_COMPLETE: f64 = 500_000.0;
const TWO_AWAY: f64 = 10_000.0;
const THREE_AWAY: f64 = 1_000.0;
const CENTER_BONUS: f64 = 20.0;

/// A candidate move with its heuristic score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredMove {
    /// Candidate cell.
    pub coord: Coord,
    /// Offense plus weighted defense over all four directions.
    pub score: f64,
}

/// Empty cells sorted by Manhattan distance to the center, nearest first.
pub fn candidates(snapshot: &GameSnapshot) -> Vec<Coord> {
    let center = snapshot.board.size() / 2;
    let mut cells = snapshot.board.empty_cells();
    cells.sort_by_key(|c| c.row.abs_diff(center) + c.col.abs_diff(center));
    cells
}

/// Scores candidate moves for `me` and returns them best first.
///
/// On the widest board only the nearest candidates are scored to bound
/// latency. Equal scores keep their center-distance order.
#[instrument(skip(snapshot), fields(size = snapshot.board.size()))]
pub fn rank_moves(snapshot: &GameSnapshot, me: Player) -> Vec<ScoredMove> {
    let mut cells = candidates(snapshot);
    if snapshot.board.size() >= WIDEST_BOARD {
        cells.truncate(WIDEST_BOARD_CANDIDATES);
    }

    let mut ranked: Vec<ScoredMove> = cells
        .into_iter()
        .map(|coord| ScoredMove {
            coord,
            score: score_cell(snapshot, coord, me),
        })
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

    debug!(
        candidates = ranked.len(),
        best = ranked.first().map(|m| m.score),
        "Ranked heuristic moves"
    );
    ranked
}

/// Sum over the four directions of offense plus 1.2× defense.
pub fn score_cell(snapshot: &GameSnapshot, coord: Coord, me: Player) -> f64 {
    DIRECTIONS
        .iter()
        .map(|&dir| {
            let offense = line_score(snapshot, coord, dir, me, true);
            let defense = line_score(snapshot, coord, dir, me.opponent(), false);
            offense + DEFENSE_WEIGHT * defense
        })
        .sum()
}

/// Counts in one direction from (but excluding) the candidate cell.
#[derive(Debug, Default, Clone, Copy)]
struct Run {
    own: usize,
    open: bool,
    blocked: bool,
}

fn walk(snapshot: &GameSnapshot, coord: Coord, (dr, dc): (isize, isize), player: Player) -> Run {
    let board = &snapshot.board;
    let mut run = Run::default();
    for step in 1..snapshot.config.win_condition as isize {
        let r = coord.row as isize + dr * step;
        let c = coord.col as isize + dc * step;
        if r < 0 || c < 0 {
            break;
        }
        match board.get(r as usize, c as usize) {
            Some(Cell::Occupied(p)) if p == player => run.own += 1,
            Some(Cell::Empty) => {
                run.open = true;
                break;
            }
            Some(Cell::Occupied(_)) => {
                run.blocked = true;
                break;
            }
            None => break,
        }
    }
    run
}

/// Scores the window of `win_condition` cells through `coord` along one axis.
fn line_score(
    snapshot: &GameSnapshot,
    coord: Coord,
    (dr, dc): (isize, isize),
    player: Player,
    offensive: bool,
) -> f64 {
    let win = snapshot.config.win_condition;
    let forward = walk(snapshot, coord, (dr, dc), player);
    let backward = walk(snapshot, coord, (-dr, -dc), player);
    let own = forward.own + backward.own;
    let has_empty = forward.open || backward.open;

    if own == 0 && (forward.blocked || backward.blocked) {
        return 0.0;
    }
    if own + 1 >= win {
        return if offensive { OFFENSE_COMPLETE } else { DEFENSE_COMPLETE };
    }
    if own + 2 == win {
        return TWO_AWAY;
    }
    if win > 3 && own + 3 == win {
        return THREE_AWAY;
    }

    let center = snapshot.board.size() / 2;
    let bonus = if coord.row == center && coord.col == center {
        CENTER_BONUS
    } else {
        0.0
    };
    own as f64 * 10.0 + if has_empty { 5.0 } else { 0.0 } + bonus
}
