//! Database repository for users, rooms and finished games.

use diesel::prelude::*;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::{debug, info, instrument, warn};

use crate::db::{
    DbError, DbErrorKind, GameOutcome, GameRecordRow, GameStore, NewGameRecord, NewRoom, NewUser, RoomRow,
    User, schema,
};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// SQLite-backed repository. Opens one connection per operation.
#[derive(Debug, Clone)]
pub struct GameRepository {
    db_path: String,
}

impl GameRepository {
    /// Creates a new repository connected to the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the path is empty.
    #[instrument(skip(db_path), fields(db_path = %db_path))]
    pub fn new(db_path: String) -> Result<Self, DbError> {
        if db_path.trim().is_empty() {
            return Err(DbError::new("Database path must not be empty"));
        }
        info!(path = %db_path, "Creating GameRepository");
        Ok(Self { db_path })
    }

    /// Establishes a database connection.
    #[instrument(skip(self))]
    fn connection(&self) -> Result<SqliteConnection, DbError> {
        debug!(path = %self.db_path, "Establishing connection");
        SqliteConnection::establish(&self.db_path)
            .map_err(|e| {
                DbError::with_kind(
                    DbErrorKind::Connection,
                    format!("Failed to connect to '{}': {}", self.db_path, e),
                )
            })
    }

    /// Applies any migrations the database has not seen yet.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a migration fails.
    #[instrument(skip(self))]
    pub fn run_migrations(&self) -> Result<usize, DbError> {
        let mut conn = self.connection()?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| DbError::with_kind(DbErrorKind::Migration, format!("Migrations failed: {}", e)))?;
        info!(count = applied.len(), "Migrations applied");
        Ok(applied.len())
    }

    /// Gets a user by identity. Returns `None` if not found.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn get_user(&self, identity: &str) -> Result<Option<User>, DbError> {
        let mut conn = self.connection()?;
        let user = schema::users::table
            .filter(schema::users::identity.eq(identity))
            .select(User::as_select())
            .first(&mut conn)
            .optional()?;
        debug!(found = user.is_some(), "User lookup");
        Ok(user)
    }

    /// Gets a room by id. Returns `None` if not found.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn get_room(&self, room_id: &str) -> Result<Option<RoomRow>, DbError> {
        let mut conn = self.connection()?;
        let room = schema::rooms::table
            .find(room_id)
            .select(RoomRow::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(room)
    }

    /// Lists finished games for a room, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn games_for_room(&self, room_id: &str) -> Result<Vec<GameRecordRow>, DbError> {
        let mut conn = self.connection()?;
        let games = schema::games::table
            .filter(schema::games::room_id.eq(room_id))
            .order(schema::games::id.asc())
            .select(GameRecordRow::as_select())
            .load(&mut conn)?;
        debug!(count = games.len(), "Room games loaded");
        Ok(games)
    }
}

impl GameStore for GameRepository {
    #[instrument(skip(self))]
    fn find_or_create_user(&self, identity: &str) -> Result<User, DbError> {
        if let Some(user) = self.get_user(identity)? {
            return Ok(user);
        }

        let mut conn = self.connection()?;
        let created = diesel::insert_into(schema::users::table)
            .values(&NewUser::new(identity.to_string()))
            .returning(User::as_returning())
            .get_result(&mut conn);

        match created {
            Ok(user) => {
                info!(user_id = user.id(), "User created");
                Ok(user)
            }
            Err(e) => {
                // Another connection may have inserted the same identity first.
                warn!(error = %e, "User insert failed, retrying lookup");
                self.get_user(identity)?
                    .ok_or_else(|| DbError::new(format!("Failed to create user: {}", e)))
            }
        }
    }

    #[instrument(skip(self, room), fields(room_id = %room.id()))]
    fn create_room(&self, room: NewRoom) -> Result<(), DbError> {
        let mut conn = self.connection()?;
        diesel::insert_into(schema::rooms::table)
            .values(&room)
            .execute(&mut conn)?;
        info!("Room persisted");
        Ok(())
    }

    #[instrument(skip(self))]
    fn join_room(&self, room_id: &str, player_o: &str) -> Result<(), DbError> {
        let mut conn = self.connection()?;
        let updated = diesel::update(schema::rooms::table.find(room_id))
            .set((
                schema::rooms::player_o.eq(Some(player_o)),
                schema::rooms::updated_at.eq(diesel::dsl::now),
            ))
            .execute(&mut conn)?;
        if updated == 0 {
            return Err(DbError::not_found(format!("Room '{}' not found", room_id)));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    fn update_room_status(&self, room_id: &str, status: &str) -> Result<(), DbError> {
        let mut conn = self.connection()?;
        let updated = diesel::update(schema::rooms::table.find(room_id))
            .set((
                schema::rooms::status.eq(status),
                schema::rooms::updated_at.eq(diesel::dsl::now),
            ))
            .execute(&mut conn)?;
        if updated == 0 {
            return Err(DbError::not_found(format!("Room '{}' not found", room_id)));
        }
        debug!("Room status updated");
        Ok(())
    }

    #[instrument(skip(self, record), fields(room_id = %record.room_id()))]
    fn append_game_record(&self, record: NewGameRecord) -> Result<(), DbError> {
        let mut conn = self.connection()?;
        diesel::insert_into(schema::games::table)
            .values(&record)
            .execute(&mut conn)?;
        info!(winner = ?record.winner(), "Game record appended");
        Ok(())
    }

    #[instrument(skip(self))]
    fn update_user_stats(&self, identity: &str, outcome: GameOutcome) -> Result<User, DbError> {
        self.find_or_create_user(identity)?;
        let (wins, losses, draws) = match outcome {
            GameOutcome::Win => (1, 0, 0),
            GameOutcome::Loss => (0, 1, 0),
            GameOutcome::Draw => (0, 0, 1),
        };

        let mut conn = self.connection()?;
        let user = diesel::update(
            schema::users::table.filter(schema::users::identity.eq(identity)),
        )
        .set((
            schema::users::games_played.eq(schema::users::games_played + 1),
            schema::users::wins.eq(schema::users::wins + wins),
            schema::users::losses.eq(schema::users::losses + losses),
            schema::users::draws.eq(schema::users::draws + draws),
            schema::users::rating.eq(schema::users::rating + outcome.rating_delta()),
            schema::users::updated_at.eq(diesel::dsl::now),
        ))
        .returning(User::as_returning())
        .get_result(&mut conn)?;

        info!(
            outcome = outcome.to_db_string(),
            rating = user.rating(),
            games = user.games_played(),
            "User stats updated"
        );
        Ok(user)
    }
}
