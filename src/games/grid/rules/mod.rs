//! Win and draw rules for grid games.

mod draw;
mod win;

pub use draw::is_draw;
pub use win::{DIRECTIONS, find_winner};
