//! Database persistence layer for users, rooms and finished games.

mod error;
mod models;
mod repository;
mod schema; // Diesel generated schema - internal use only
mod store;

pub use error::{DbError, DbErrorKind};
pub use models::{
    GameOutcome, GameRecordRow, NewGameRecord, NewRoom, NewUser, RATING_DELTA, RoomRow,
    STARTING_RATING, User,
};
pub use repository::GameRepository;
pub use store::GameStore;
