//! Wire messages exchanged with clients.
//!
//! Every frame is one JSON object tagged by `type`, e.g.
//! `{"type": "make-move", "roomId": "...", "row": 1, "col": 1, "player": "X"}`.

use serde::{Deserialize, Serialize};

use crate::escrow::EscrowStatus;
use crate::games::grid::{GameSnapshot, Player};
use crate::search::Difficulty;

/// A request from a client.
///
/// Modes travel as strings; unknown names fall back to training.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientIntent {
    /// Open a room and wait for an opponent.
    CreateRoom {
        /// Requesting identity.
        player_id: String,
        /// Mode name.
        mode: String,
    },
    /// Take the second seat of a room.
    JoinRoom {
        /// Room to join.
        room_id: String,
        /// Requesting identity.
        player_id: String,
    },
    /// Queue for an opponent.
    FindMatch {
        /// Requesting identity.
        player_id: String,
        /// Mode name.
        mode: String,
    },
    /// Leave a queue.
    CancelMatchmaking {
        /// Requesting identity.
        player_id: String,
        /// Mode name.
        mode: String,
    },
    /// Place a piece.
    MakeMove {
        /// Room played in.
        room_id: String,
        /// Target row.
        row: usize,
        /// Target column.
        col: usize,
        /// Symbol the client plays.
        player: Player,
    },
    /// Report a signed stake transfer.
    PaymentConfirmed {
        /// Room the stake is for.
        room_id: String,
        /// Paying identity.
        player_id: String,
        /// Ledger signature of the transfer.
        signature: String,
    },
    /// Play against the built-in bot.
    StartPractice {
        /// Requesting identity.
        player_id: String,
        /// Mode name.
        mode: String,
        /// Bot strength.
        #[serde(default)]
        difficulty: Difficulty,
    },
}

/// A notification to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// A room was opened for the client.
    RoomCreated {
        /// New room.
        room_id: String,
    },
    /// The client holds a seat in the room.
    RoomJoined {
        /// Joined room.
        room_id: String,
        /// Live game, absent while the room is still waiting.
        game_state: Option<GameSnapshot>,
        /// Symbol the client plays.
        assigned_player: Player,
    },
    /// Both seats are filled and play begins.
    GameStarted {
        /// Room of the game.
        room_id: String,
        /// Initial state.
        game_state: GameSnapshot,
        /// Symbol the client plays.
        assigned_player: Player,
    },
    /// Matchmaking paired the client.
    MatchFound {
        /// Room created for the pair.
        room_id: String,
        /// The other identity.
        opponent_id: String,
        /// Initial state.
        game_state: GameSnapshot,
        /// Symbol the client plays.
        assigned_player: Player,
    },
    /// The client is waiting in a queue.
    MatchmakingStarted {
        /// Queue mode.
        mode: String,
    },
    /// The client left a queue.
    MatchmakingCancelled {
        /// Queue mode.
        mode: String,
    },
    /// A move was accepted.
    MoveMade {
        /// Room of the game.
        room_id: String,
        /// Row played.
        row: usize,
        /// Column played.
        col: usize,
        /// Who moved.
        player: Player,
        /// State after the move.
        game_state: GameSnapshot,
    },
    /// The game ended.
    GameFinished {
        /// Room of the game.
        room_id: String,
        /// Winning symbol, absent for a draw.
        winner: Option<Player>,
        /// Final state.
        game_state: GameSnapshot,
    },
    /// A move was rejected.
    MoveError {
        /// Reason.
        message: String,
    },
    /// A room, queue or payment request failed.
    RoomError {
        /// Reason.
        message: String,
    },
    /// The opponent left mid-room.
    OpponentDisconnected {
        /// Abandoned room.
        room_id: String,
        /// Signature of the stake returned to the client, if any.
        refund_signature: Option<String>,
    },
    /// A stake was recorded.
    PaymentRecorded {
        /// Room the stake is for.
        room_id: String,
        /// Paying identity.
        player_id: String,
        /// Escrow status after recording.
        escrow_status: EscrowStatus,
    },
    /// Winnings were sent.
    Payout {
        /// Room of the game.
        room_id: String,
        /// Lamports sent.
        amount: u64,
        /// Transfer signature; absent means the payout is pending or failed.
        signature: Option<String>,
    },
}

impl ServerEvent {
    /// Wraps a room-level failure.
    pub fn room_error(message: impl std::fmt::Display) -> Self {
        ServerEvent::RoomError {
            message: message.to_string(),
        }
    }

    /// Wraps a move-level failure.
    pub fn move_error(message: impl std::fmt::Display) -> Self {
        ServerEvent::MoveError {
            message: message.to_string(),
        }
    }
}
