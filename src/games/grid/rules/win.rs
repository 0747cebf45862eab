//! Win detection for N-in-a-row.

use super::super::{Board, Cell, Coord, Player};
use tracing::instrument;

/// Scan directions in tie-break order: →, ↓, ↘, ↙.
pub const DIRECTIONS: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

/// Finds the first winning line on the board.
///
/// Cells are scanned in row-major order and each occupied cell is tried as
/// the start of a line in every direction, so the first hit is deterministic.
/// Returns the winner and the `win_condition` coordinates of the line.
#[instrument(skip(board), fields(size = board.size()))]
pub fn find_winner(board: &Board, win_condition: usize) -> Option<(Player, Vec<Coord>)> {
    if win_condition == 0 {
        return None;
    }
    let size = board.size();
    for row in 0..size {
        for col in 0..size {
            let Some(Cell::Occupied(player)) = board.get(row, col) else {
                continue;
            };
            for (dr, dc) in DIRECTIONS {
                if let Some(line) = line_from(board, row, col, dr, dc, player, win_condition) {
                    return Some((player, line));
                }
            }
        }
    }
    None
}

fn line_from(
    board: &Board,
    row: usize,
    col: usize,
    dr: isize,
    dc: isize,
    player: Player,
    length: usize,
) -> Option<Vec<Coord>> {
    let mut line = Vec::with_capacity(length);
    for step in 0..length as isize {
        let r = row as isize + dr * step;
        let c = col as isize + dc * step;
        if r < 0 || c < 0 {
            return None;
        }
        let (r, c) = (r as usize, c as usize);
        if board.get(r, c) != Some(Cell::Occupied(player)) {
            return None;
        }
        line.push(Coord::new(r, c));
    }
    Some(line)
}
