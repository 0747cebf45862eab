//! Dispatches client intents to the orchestrator and escrow.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::events::{ClientIntent, ServerEvent};
use super::hub::Hub;
use crate::arena::{ConnectionId, MatchOrchestrator, RoomState};
use crate::escrow::{EscrowLedger, EscrowStatus};
use crate::games::grid::{GameMode, GameSnapshot, Player};
use crate::search::Difficulty;

/// Turns intents into orchestrator and escrow calls, and their results into events.
#[derive(Debug, Clone)]
pub struct Gateway {
    orchestrator: Arc<MatchOrchestrator>,
    escrow: Arc<EscrowLedger>,
    hub: Arc<Hub>,
}

impl Gateway {
    /// Creates a gateway over shared services.
    pub fn new(orchestrator: Arc<MatchOrchestrator>, escrow: Arc<EscrowLedger>, hub: Arc<Hub>) -> Self {
        Self {
            orchestrator,
            escrow,
            hub,
        }
    }

    /// Connection hub.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Match orchestrator.
    pub fn orchestrator(&self) -> &Arc<MatchOrchestrator> {
        &self.orchestrator
    }

    /// Escrow ledger.
    pub fn escrow(&self) -> &Arc<EscrowLedger> {
        &self.escrow
    }

    /// Handles one intent from a connection.
    #[instrument(skip(self, intent))]
    pub async fn handle_intent(&self, connection: ConnectionId, intent: ClientIntent) {
        match intent {
            ClientIntent::CreateRoom { player_id, mode } => self.create_room(connection, &player_id, &mode),
            ClientIntent::JoinRoom { room_id, player_id } => self.join_room(connection, &room_id, &player_id),
            ClientIntent::FindMatch { player_id, mode } => self.find_match(connection, &player_id, &mode),
            ClientIntent::CancelMatchmaking { player_id, mode } => {
                let mode = GameMode::resolve(&mode);
                self.orchestrator.dequeue(&player_id, mode);
                self.hub.send(
                    connection,
                    ServerEvent::MatchmakingCancelled {
                        mode: mode.to_string(),
                    },
                );
            }
            ClientIntent::MakeMove {
                room_id,
                row,
                col,
                player,
            } => self.make_move(connection, &room_id, row, col, player).await,
            ClientIntent::PaymentConfirmed {
                room_id,
                player_id,
                signature,
            } => self.payment_confirmed(connection, &room_id, &player_id, &signature).await,
            ClientIntent::StartPractice {
                player_id,
                mode,
                difficulty,
            } => self.start_practice(connection, &player_id, &mode, difficulty),
        }
    }

    /// Cleans up after a closed connection and tells the opponent.
    ///
    /// If the abandoned room had an escrow, the stake of the player who
    /// stayed is refunded.
    #[instrument(skip(self))]
    pub async fn handle_disconnect(&self, connection: ConnectionId) {
        self.hub.unregister(connection);
        let Some(outcome) = self.orchestrator.handle_disconnect(connection) else {
            debug!("Unbound connection closed");
            return;
        };
        let Some(room_id) = outcome.room_id else {
            return;
        };

        let refund_signature = if self.escrow.status(&room_id).await.is_some() {
            match self.escrow.refund_on_disconnect(&room_id, &outcome.player_id).await {
                Ok(signature) => signature,
                Err(e) => {
                    warn!(room_id = %room_id, error = %e, "Refund skipped");
                    None
                }
            }
        } else {
            None
        };

        let Some(conn) = outcome
            .opponent
            .and_then(|opponent| self.orchestrator.connection_of(&opponent))
        else {
            return;
        };
        self.hub.send(
            conn,
            ServerEvent::OpponentDisconnected {
                room_id,
                refund_signature,
            },
        );
    }

    fn create_room(&self, connection: ConnectionId, player_id: &str, mode: &str) {
        match self.orchestrator.create_room(player_id, GameMode::resolve(mode)) {
            Ok(room) => {
                self.orchestrator
                    .bind_connection(connection, player_id, Some(room.room_id().as_str()));
                self.hub.send(
                    connection,
                    ServerEvent::RoomCreated {
                        room_id: room.room_id().clone(),
                    },
                );
            }
            Err(e) => {
                self.hub.send(connection, ServerEvent::room_error(e));
            }
        }
    }

    fn join_room(&self, connection: ConnectionId, room_id: &str, player_id: &str) {
        let room = match self.orchestrator.join_room(room_id, player_id) {
            Ok(room) => room,
            Err(e) => {
                self.hub.send(connection, ServerEvent::room_error(e));
                return;
            }
        };
        self.orchestrator
            .bind_connection(connection, player_id, Some(room_id));

        let Some(assigned) = room.symbol_of(player_id) else {
            return;
        };
        let snapshot = self.orchestrator.snapshot(room_id);
        self.hub.send(
            connection,
            ServerEvent::RoomJoined {
                room_id: room_id.to_string(),
                game_state: snapshot.clone(),
                assigned_player: assigned,
            },
        );

        let Some(snapshot) = snapshot.filter(|_| room.is_full()) else {
            return;
        };
        self.open_escrow(&room);
        for symbol in [Player::X, Player::O] {
            self.send_to_seat(
                &room,
                symbol,
                ServerEvent::GameStarted {
                    room_id: room_id.to_string(),
                    game_state: snapshot.clone(),
                    assigned_player: symbol,
                },
            );
        }
    }

    fn find_match(&self, connection: ConnectionId, player_id: &str, mode: &str) {
        let mode = GameMode::resolve(mode);
        self.orchestrator.bind_connection(connection, player_id, None);
        self.orchestrator.enqueue(player_id, mode, connection);

        let Some((requester, opponent)) = self.orchestrator.try_match(player_id, mode) else {
            self.hub.send(
                connection,
                ServerEvent::MatchmakingStarted {
                    mode: mode.to_string(),
                },
            );
            return;
        };

        let room = match self.orchestrator.create_matched_room(&requester, &opponent) {
            Ok(room) => room,
            Err(e) => {
                warn!(error = %e, "Matched room failed");
                for ticket in [&requester, &opponent] {
                    self.hub.send(ticket.connection, ServerEvent::room_error(&e));
                }
                return;
            }
        };
        let Some(snapshot) = self.orchestrator.snapshot(room.room_id()) else {
            return;
        };
        self.open_escrow(&room);

        for (me, them) in [(&requester, &opponent), (&opponent, &requester)] {
            self.orchestrator
                .bind_connection(me.connection, &me.player_id, Some(room.room_id().as_str()));
            let Some(assigned) = room.symbol_of(&me.player_id) else {
                continue;
            };
            self.hub.send(
                me.connection,
                ServerEvent::MatchFound {
                    room_id: room.room_id().clone(),
                    opponent_id: them.player_id.clone(),
                    game_state: snapshot.clone(),
                    assigned_player: assigned,
                },
            );
        }
    }

    fn start_practice(&self, connection: ConnectionId, player_id: &str, mode: &str, difficulty: Difficulty) {
        match self
            .orchestrator
            .create_practice_room(player_id, GameMode::resolve(mode), difficulty)
        {
            Ok(room) => {
                self.orchestrator
                    .bind_connection(connection, player_id, Some(room.room_id().as_str()));
                if let Some(snapshot) = self.orchestrator.snapshot(room.room_id()) {
                    self.hub.send(
                        connection,
                        ServerEvent::GameStarted {
                            room_id: room.room_id().clone(),
                            game_state: snapshot,
                            assigned_player: Player::X,
                        },
                    );
                }
            }
            Err(e) => {
                self.hub.send(connection, ServerEvent::room_error(e));
            }
        }
    }

    #[instrument(skip(self))]
    async fn make_move(&self, connection: ConnectionId, room_id: &str, row: usize, col: usize, player: Player) {
        let Some(identity) = self.orchestrator.player_of(connection) else {
            self.hub
                .send(connection, ServerEvent::move_error("Connection is not bound to a player"));
            return;
        };
        let Some(room) = self.orchestrator.room(room_id) else {
            self.hub
                .send(connection, ServerEvent::move_error(format!("Room {} not found", room_id)));
            return;
        };
        if room.symbol_of(&identity) != Some(player) {
            warn!(identity = %identity, "Move for a symbol the connection does not own");
            self.hub
                .send(connection, ServerEvent::move_error(format!("You do not play {}", player)));
            return;
        }
        if self.is_staked(&room) && self.escrow.status(room_id).await != Some(EscrowStatus::Active) {
            self.hub
                .send(connection, ServerEvent::move_error("Waiting for both stakes"));
            return;
        }

        let snapshot = match self.orchestrator.apply_move(room_id, row, col, player) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.hub.send(connection, ServerEvent::move_error(e));
                return;
            }
        };
        self.broadcast(
            &room,
            ServerEvent::MoveMade {
                room_id: room_id.to_string(),
                row,
                col,
                player,
                game_state: snapshot.clone(),
            },
        );
        if snapshot.status.is_over() {
            self.finish(&room, snapshot).await;
            return;
        }

        if room.is_practice() {
            let reply = {
                let mut rng = rand::rng();
                self.orchestrator.play_bot_turn(room_id, &mut rng)
            };
            match reply {
                Ok(Some((coord, snapshot))) => {
                    self.broadcast(
                        &room,
                        ServerEvent::MoveMade {
                            room_id: room_id.to_string(),
                            row: coord.row,
                            col: coord.col,
                            player: Player::O,
                            game_state: snapshot.clone(),
                        },
                    );
                    if snapshot.status.is_over() {
                        self.finish(&room, snapshot).await;
                    }
                }
                Ok(None) => debug!("Bot passed"),
                Err(e) => warn!(error = %e, "Bot move failed"),
            }
        }
    }

    #[instrument(skip(self))]
    async fn payment_confirmed(&self, connection: ConnectionId, room_id: &str, player_id: &str, signature: &str) {
        if self.orchestrator.player_of(connection).as_deref() != Some(player_id) {
            self.hub
                .send(connection, ServerEvent::room_error("Connection is not bound to this player"));
            return;
        }
        let Some(room) = self.orchestrator.room(room_id) else {
            self.hub
                .send(connection, ServerEvent::room_error(format!("Room {} not found", room_id)));
            return;
        };

        let mode = room.config().mode;
        if let Err(e) = self.escrow.verify(signature, player_id, mode).await {
            warn!(error = %e, "Payment verification failed");
            self.hub.send(connection, ServerEvent::room_error(e));
            return;
        }
        match self.escrow.record_payment(room_id, player_id, signature).await {
            Ok(record) => {
                self.broadcast(
                    &room,
                    ServerEvent::PaymentRecorded {
                        room_id: room_id.to_string(),
                        player_id: player_id.to_string(),
                        escrow_status: *record.status(),
                    },
                );
            }
            Err(e) => {
                self.hub.send(connection, ServerEvent::room_error(e));
            }
        }
    }

    async fn finish(&self, room: &RoomState, snapshot: GameSnapshot) {
        let room_id = room.room_id();
        let winner = snapshot.winner;
        if let Err(e) = self.orchestrator.finish_game(room_id, winner) {
            warn!(room_id = %room_id, error = %e, "Finish failed");
        }
        self.broadcast(
            room,
            ServerEvent::GameFinished {
                room_id: room_id.clone(),
                winner,
                game_state: snapshot,
            },
        );

        if !self.is_staked(room) {
            return;
        }
        let winner_id = winner.and_then(|w| room.player_for(w)).cloned();
        match self.escrow.payout(room_id, winner_id.as_deref()).await {
            Ok(receipt) => {
                info!(room_id = %room_id, amount = receipt.amount(), "Payout settled");
                if let Some(symbol) = winner {
                    self.send_to_seat(
                        room,
                        symbol,
                        ServerEvent::Payout {
                            room_id: room_id.clone(),
                            amount: *receipt.amount(),
                            signature: receipt.signature().clone(),
                        },
                    );
                }
            }
            Err(e) => warn!(room_id = %room_id, error = %e, "Payout skipped"),
        }
    }

    fn open_escrow(&self, room: &RoomState) {
        if room.is_practice() {
            return;
        }
        let (Some(x), Some(o)) = (room.player_for(Player::X), room.player_for(Player::O)) else {
            return;
        };
        match self.escrow.create(room.room_id(), x, o, room.config().mode) {
            Ok(Some(_)) => info!(room_id = %room.room_id(), "Escrow opened"),
            Ok(None) => {}
            Err(e) => debug!(error = %e, "Escrow not opened"),
        }
    }

    fn is_staked(&self, room: &RoomState) -> bool {
        !room.is_practice() && self.escrow.fee_for(room.config().mode) > 0
    }

    fn send_to_seat(&self, room: &RoomState, symbol: Player, event: ServerEvent) {
        if let Some(conn) = room
            .player_for(symbol)
            .and_then(|p| self.orchestrator.connection_of(p))
        {
            self.hub.send(conn, event);
        }
    }

    fn broadcast(&self, room: &RoomState, event: ServerEvent) {
        for player in room.players() {
            if let Some(conn) = self.orchestrator.connection_of(player) {
                self.hub.send(conn, event.clone());
            }
        }
    }
}
