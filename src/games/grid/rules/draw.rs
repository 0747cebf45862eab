//! Draw detection for grid games.

use super::super::{Board, GameConfig};
use tracing::instrument;

/// Checks whether a position without a winner is drawn.
///
/// Rolling boards never draw: a capped player always frees a cell by
/// evicting their oldest piece.
#[instrument(skip(board))]
pub fn is_draw(board: &Board, config: &GameConfig) -> bool {
    !config.rolling_mode && board.is_full()
}
