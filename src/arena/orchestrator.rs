//! Room lifecycle, matchmaking and connection bindings.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::Rng;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::error::ArenaError;
use super::queue::{ConnectionId, MatchQueues, MatchTicket};
use super::record::GameRecord;
use super::room::{BOT_PLAYER_ID, PlayerId, RoomId, RoomState, RoomStatus};
use crate::config::FeeSchedule;
use crate::db::{GameOutcome, GameStore, NewRoom};
use crate::games::grid::{BoardEngine, Coord, GameMode, GameSnapshot, Player};
use crate::search::{Difficulty, recommend_move};

/// A room plus its live engine. The engine exists only while ACTIVE.
#[derive(Debug)]
struct Room {
    state: RoomState,
    engine: Option<BoardEngine>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl Room {
    fn waiting(state: RoomState) -> Self {
        Self {
            state,
            engine: None,
            started_at: None,
            finished_at: None,
        }
    }

    fn activate(&mut self) {
        self.state.set_status(RoomStatus::Active);
        self.engine = Some(BoardEngine::new(*self.state.config()));
        self.started_at = Some(Utc::now());
    }

    fn finish(&mut self) {
        self.state.set_status(RoomStatus::Finished);
        self.engine = None;
        self.finished_at = Some(Utc::now());
    }
}

/// Which identity and room a connection speaks for.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Binding {
    player_id: PlayerId,
    room_id: Option<RoomId>,
}

/// What a dropped connection left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectOutcome {
    /// Identity the connection was bound to.
    pub player_id: PlayerId,
    /// Room that was abandoned, if any.
    pub room_id: Option<RoomId>,
    /// Human opponent still seated in that room.
    pub opponent: Option<PlayerId>,
    /// Mode of the abandoned room.
    pub mode: Option<GameMode>,
}

/// Owns every room, queue and connection binding in the process.
///
/// Each table is a sharded map, so work on one room or mode never waits
/// on another. Map guards are dropped before the store is called.
#[derive(Debug)]
pub struct MatchOrchestrator {
    rooms: DashMap<RoomId, Room>,
    queues: MatchQueues,
    bindings: DashMap<ConnectionId, Binding>,
    connections: DashMap<PlayerId, ConnectionId>,
    store: Arc<dyn GameStore>,
    fees: FeeSchedule,
}

impl MatchOrchestrator {
    /// Creates an orchestrator persisting through `store`.
    #[instrument(skip(store))]
    pub fn new(store: Arc<dyn GameStore>, fees: FeeSchedule) -> Self {
        info!("Creating match orchestrator");
        Self {
            rooms: DashMap::new(),
            queues: MatchQueues::new(),
            bindings: DashMap::new(),
            connections: DashMap::new(),
            store,
            fees,
        }
    }

    /// Opens a WAITING room with `player_id` in the X seat.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::Persistence`] if the room cannot be stored.
    #[instrument(skip(self))]
    pub fn create_room(&self, player_id: &str, mode: GameMode) -> Result<RoomState, ArenaError> {
        let room_id = Uuid::new_v4().to_string();
        let state = RoomState::new(room_id.clone(), mode.config(), player_id.to_string());

        self.ensure_user(player_id);
        self.store.create_room(Self::room_row(&state))?;
        self.rooms.insert(room_id.clone(), Room::waiting(state.clone()));

        info!(room_id = %room_id, "Room created");
        Ok(state)
    }

    /// Seats a second player, activating the room.
    ///
    /// Joining a room the player already sits in is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::RoomNotFound`], [`ArenaError::RoomFull`], or
    /// [`ArenaError::GameNotActive`] for an abandoned room.
    #[instrument(skip(self))]
    pub fn join_room(&self, room_id: &str, player_id: &str) -> Result<RoomState, ArenaError> {
        let state = {
            let mut room = self
                .rooms
                .get_mut(room_id)
                .ok_or_else(|| ArenaError::RoomNotFound(room_id.to_string()))?;

            if room.state.has_player(player_id) {
                debug!("Player already seated");
                return Ok(room.state.clone());
            }
            if room.state.is_full() {
                warn!("Join rejected, room full");
                return Err(ArenaError::RoomFull(room_id.to_string()));
            }
            if *room.state.status() == RoomStatus::Finished {
                warn!("Join rejected, room finished");
                return Err(ArenaError::GameNotActive(room_id.to_string()));
            }

            room.state.seat(player_id.to_string());
            room.activate();
            room.state.clone()
        };

        info!("Room active");
        self.ensure_user(player_id);
        if let Err(e) = self
            .store
            .join_room(room_id, player_id)
            .and_then(|_| self.store.update_room_status(room_id, RoomStatus::Active.as_ref()))
        {
            warn!(error = %e, "Failed to persist join");
        }
        Ok(state)
    }

    /// Queues a ticket, replacing the player's existing ticket in that mode.
    #[instrument(skip(self))]
    pub fn enqueue(&self, player_id: &str, mode: GameMode, connection: ConnectionId) -> usize {
        self.queues.enqueue(player_id.to_string(), mode, connection)
    }

    /// Cancels a ticket. Returns true if one was removed.
    #[instrument(skip(self))]
    pub fn dequeue(&self, player_id: &str, mode: GameMode) -> bool {
        self.queues.dequeue(player_id, mode)
    }

    /// Pairs the requester with the first other waiting ticket.
    ///
    /// Returns `(requester, opponent)`; both tickets are gone from the
    /// queue once this returns.
    #[instrument(skip(self))]
    pub fn try_match(&self, player_id: &str, mode: GameMode) -> Option<(MatchTicket, MatchTicket)> {
        self.queues.try_match(player_id, mode)
    }

    /// Number of tickets waiting in a mode.
    pub fn queue_depth(&self, mode: GameMode) -> usize {
        self.queues.depth(mode)
    }

    /// Opens an ACTIVE room for a matched pair. The earlier ticket plays X.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::Persistence`] if the room cannot be stored.
    #[instrument(skip(self, a, b), fields(a = %a.player_id, b = %b.player_id))]
    pub fn create_matched_room(&self, a: &MatchTicket, b: &MatchTicket) -> Result<RoomState, ArenaError> {
        let (x, o) = if a.enqueued_at < b.enqueued_at { (a, b) } else { (b, a) };
        let room_id = Uuid::new_v4().to_string();
        let mut state = RoomState::new(room_id.clone(), a.mode.config(), x.player_id.clone());
        state.seat(o.player_id.clone());

        self.ensure_user(&x.player_id);
        self.ensure_user(&o.player_id);
        let mut room = Room::waiting(state);
        room.activate();
        let state = room.state.clone();
        self.store.create_room(Self::room_row(&state))?;
        self.rooms.insert(room_id.clone(), room);

        info!(room_id = %room_id, x = %x.player_id, o = %o.player_id, "Matched room created");
        Ok(state)
    }

    /// Opens an ACTIVE practice room with the bot in the O seat.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::Persistence`] if the room cannot be stored.
    #[instrument(skip(self))]
    pub fn create_practice_room(
        &self,
        player_id: &str,
        mode: GameMode,
        difficulty: Difficulty,
    ) -> Result<RoomState, ArenaError> {
        let room_id = Uuid::new_v4().to_string();
        let mut state = RoomState::new(room_id.clone(), mode.config(), player_id.to_string());
        state.seat(BOT_PLAYER_ID.to_string());
        state.set_bot(difficulty);

        self.ensure_user(player_id);
        let mut room = Room::waiting(state);
        room.activate();
        let state = room.state.clone();
        self.store.create_room(Self::room_row(&state))?;
        self.rooms.insert(room_id.clone(), room);

        info!(room_id = %room_id, "Practice room created");
        Ok(state)
    }

    /// Applies a move in an ACTIVE room and returns the new state.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::RoomNotFound`], [`ArenaError::GameNotActive`],
    /// or [`ArenaError::InvalidMove`] when the engine rejects the move.
    #[instrument(skip(self))]
    pub fn apply_move(
        &self,
        room_id: &str,
        row: usize,
        col: usize,
        player: Player,
    ) -> Result<GameSnapshot, ArenaError> {
        let mut room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| ArenaError::RoomNotFound(room_id.to_string()))?;
        if *room.state.status() != RoomStatus::Active {
            return Err(ArenaError::GameNotActive(room_id.to_string()));
        }
        let engine = room
            .engine
            .as_mut()
            .ok_or_else(|| ArenaError::GameNotActive(room_id.to_string()))?;

        engine.apply_move(row, col, player).map_err(|e| {
            warn!(error = %e, "Move rejected");
            ArenaError::InvalidMove(e)
        })?;
        debug!("Move applied");
        Ok(engine.snapshot())
    }

    /// Lets the practice bot answer if it is the bot's turn.
    ///
    /// Returns the bot's move and the resulting state, or `None` when the
    /// room has no bot, the game is over, or it is the human's turn.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::RoomNotFound`] or [`ArenaError::GameNotActive`].
    #[instrument(skip(self, rng))]
    pub fn play_bot_turn<R: Rng + ?Sized>(
        &self,
        room_id: &str,
        rng: &mut R,
    ) -> Result<Option<(Coord, GameSnapshot)>, ArenaError> {
        let mut room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| ArenaError::RoomNotFound(room_id.to_string()))?;
        let Some(difficulty) = *room.state.bot() else {
            return Ok(None);
        };
        let engine = room
            .engine
            .as_mut()
            .ok_or_else(|| ArenaError::GameNotActive(room_id.to_string()))?;
        if engine.status().is_over() || engine.current_player() != Player::O {
            return Ok(None);
        }

        let Some(coord) = recommend_move(&engine.snapshot(), Player::O, difficulty, rng) else {
            debug!("Bot has no move");
            return Ok(None);
        };
        engine.apply_move(coord.row, coord.col, Player::O)?;
        debug!(%coord, "Bot moved");
        Ok(Some((coord, engine.snapshot())))
    }

    /// Ends the game in a room, persists its record, and updates stats.
    ///
    /// The room becomes FINISHED and its engine is discarded even if
    /// persistence fails; such failures are logged.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::RoomNotFound`] or [`ArenaError::GameNotActive`]
    /// when there is no live game to finish.
    #[instrument(skip(self))]
    pub fn finish_game(&self, room_id: &str, winner: Option<Player>) -> Result<GameRecord, ArenaError> {
        let (state, engine, started_at) = {
            let mut room = self
                .rooms
                .get_mut(room_id)
                .ok_or_else(|| ArenaError::RoomNotFound(room_id.to_string()))?;
            let engine = room
                .engine
                .take()
                .ok_or_else(|| ArenaError::GameNotActive(room_id.to_string()))?;
            room.finish();
            (room.state.clone(), engine, room.started_at)
        };

        let player_x = state.player_for(Player::X).cloned().unwrap_or_default();
        let player_o = state.player_for(Player::O).cloned().unwrap_or_default();
        let winner_id = winner.and_then(|p| state.player_for(p).cloned());
        let stake_lamports = if state.is_practice() {
            0
        } else {
            self.fees.fee_for(state.config().mode)
        };
        let finished_at = Utc::now();
        let record = GameRecord {
            room_id: room_id.to_string(),
            mode: state.config().mode,
            player_x: player_x.clone(),
            player_o: player_o.clone(),
            winner: winner_id.clone(),
            moves: engine.snapshot().moves,
            stake_lamports,
            started_at: started_at.unwrap_or(finished_at),
            finished_at,
        };
        info!(winner = ?winner_id, moves = record.moves.len(), "Game finished");

        match record.to_row() {
            Ok(row) => {
                if let Err(e) = self.store.append_game_record(row) {
                    error!(error = %e, "Failed to persist game record");
                }
            }
            Err(e) => error!(error = %e, "Failed to encode game record"),
        }
        if let Err(e) = self.store.update_room_status(room_id, RoomStatus::Finished.as_ref()) {
            warn!(error = %e, "Failed to persist room status");
        }

        for (identity, symbol) in [(&player_x, Player::X), (&player_o, Player::O)] {
            if identity.is_empty() || identity == BOT_PLAYER_ID {
                continue;
            }
            let outcome = match winner {
                None => GameOutcome::Draw,
                Some(w) if w == symbol => GameOutcome::Win,
                Some(_) => GameOutcome::Loss,
            };
            if let Err(e) = self.store.update_user_stats(identity, outcome) {
                warn!(player = %identity, error = %e, "Failed to update stats");
            }
        }

        Ok(record)
    }

    /// Binds a connection to an identity and, optionally, a room.
    #[instrument(skip(self))]
    pub fn bind_connection(&self, connection: ConnectionId, player_id: &str, room_id: Option<&str>) {
        self.bindings.insert(
            connection,
            Binding {
                player_id: player_id.to_string(),
                room_id: room_id.map(str::to_string),
            },
        );
        self.connections.insert(player_id.to_string(), connection);
        debug!("Connection bound");
    }

    /// Identity a connection speaks for.
    pub fn player_of(&self, connection: ConnectionId) -> Option<PlayerId> {
        self.bindings.get(&connection).map(|b| b.player_id.clone())
    }

    /// Connection currently bound to an identity.
    pub fn connection_of(&self, player_id: &str) -> Option<ConnectionId> {
        self.connections.get(player_id).map(|c| *c)
    }

    /// Tears down everything a dropped connection owned.
    ///
    /// An ACTIVE or WAITING room the connection was bound to becomes
    /// FINISHED and loses its engine; no game record is written. Bindings
    /// and queued tickets for the connection are removed.
    #[instrument(skip(self))]
    pub fn handle_disconnect(&self, connection: ConnectionId) -> Option<DisconnectOutcome> {
        let removed_tickets = self.queues.remove_connection(connection);
        let (_, binding) = self.bindings.remove(&connection)?;
        self.connections
            .remove_if(&binding.player_id, |_, bound| *bound == connection);

        let mut outcome = DisconnectOutcome {
            player_id: binding.player_id.clone(),
            room_id: None,
            opponent: None,
            mode: None,
        };

        if let Some(room_id) = binding.room_id {
            let abandoned = self.rooms.get_mut(&room_id).and_then(|mut room| {
                if *room.state.status() == RoomStatus::Finished {
                    return None;
                }
                room.finish();
                let opponent = room
                    .state
                    .opponent_of(&binding.player_id)
                    .filter(|p| p.as_str() != BOT_PLAYER_ID)
                    .cloned();
                Some((opponent, room.state.config().mode))
            });

            if let Some((opponent, mode)) = abandoned {
                info!(room_id = %room_id, "Room abandoned");
                if let Err(e) = self.store.update_room_status(&room_id, RoomStatus::Finished.as_ref()) {
                    warn!(error = %e, "Failed to persist abandoned room");
                }
                outcome.room_id = Some(room_id);
                outcome.opponent = opponent;
                outcome.mode = Some(mode);
            }
        }

        info!(player = %outcome.player_id, removed_tickets, "Connection dropped");
        Some(outcome)
    }

    /// Drops FINISHED rooms that ended more than `retention` ago.
    /// Returns how many went.
    pub fn sweep_finished_rooms(&self, retention: Duration) -> usize {
        self.sweep_finished_rooms_at(Utc::now(), retention)
    }

    /// Like [`sweep_finished_rooms`](Self::sweep_finished_rooms) with an explicit clock.
    #[instrument(skip(self))]
    pub fn sweep_finished_rooms_at(&self, now: DateTime<Utc>, retention: Duration) -> usize {
        let mut removed = 0;
        self.rooms.retain(|_, room| {
            let keep = room.finished_at.is_none_or(|at| now - at <= retention);
            if !keep {
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            info!(removed, remaining = self.rooms.len(), "Finished rooms swept");
        }
        removed
    }

    /// Number of rooms held in memory.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Copy of a room's state.
    pub fn room(&self, room_id: &str) -> Option<RoomState> {
        self.rooms.get(room_id).map(|r| r.state.clone())
    }

    /// Snapshot of a room's live game.
    pub fn snapshot(&self, room_id: &str) -> Option<GameSnapshot> {
        self.rooms
            .get(room_id)
            .and_then(|r| r.engine.as_ref().map(BoardEngine::snapshot))
    }

    /// Symbol an identity plays in a room.
    pub fn symbol_for(&self, room_id: &str, player_id: &str) -> Option<Player> {
        self.rooms.get(room_id).and_then(|r| r.state.symbol_of(player_id))
    }

    /// Entry fee for a mode.
    pub fn fee_for(&self, mode: GameMode) -> u64 {
        self.fees.fee_for(mode)
    }

    fn ensure_user(&self, player_id: &str) {
        if let Err(e) = self.store.find_or_create_user(player_id) {
            warn!(player = %player_id, error = %e, "Failed to load user");
        }
    }

    fn room_row(state: &RoomState) -> NewRoom {
        let config = state.config();
        NewRoom::new(
            state.room_id().clone(),
            config.mode.to_string(),
            i32::try_from(config.board_size).unwrap_or(i32::MAX),
            i32::try_from(config.win_condition).unwrap_or(i32::MAX),
            config.rolling_mode,
            state.player_for(Player::X).cloned().unwrap_or_default(),
            state.player_for(Player::O).cloned(),
            state.status().as_ref().to_string(),
        )
    }
}
