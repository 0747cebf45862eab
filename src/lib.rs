//! Grid Arena library - authoritative server for staked grid games
//!
//! Two players meet in a room, play generalized tic-tac-toe/gomoku on a
//! server-adjudicated board, and optionally stake lamports that the server
//! holds in escrow and pays out to the winner.
//!
//! # Architecture
//!
//! - **Games**: `BoardEngine`, the per-room rules engine with rolling mode
//! - **Search**: move recommendations for the practice bot
//! - **Arena**: rooms, matchmaking queues and connection bindings
//! - **Escrow**: stake verification, refunds and payouts over a `Ledger`
//! - **Db**: SQLite persistence for users, rooms and finished games
//! - **Transport/Server**: JSON events over WebSocket, plus HTTP endpoints
//!
//! # Example
//!
//! ```
//! use grid_arena::{BoardEngine, GameMode, Player};
//!
//! let mut engine = BoardEngine::new(GameMode::RankedLow.config());
//! engine.apply_move(1, 1, Player::X).unwrap();
//! assert_eq!(engine.current_player(), Player::O);
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod arena;
mod config;
mod db;
mod escrow;
mod games;
mod search;
mod server;
mod transport;

// Crate-level exports - Board engine and rules
pub use games::grid::{
    Board, BoardEngine, Cell, Coord, DIRECTIONS, GameConfig, GameMode, GameSnapshot, GameStatus, Move, MoveError,
    PlacedCounts, PlacementRecord, Player, find_winner, is_draw,
};

// Crate-level exports - Move search
pub use search::{Difficulty, ScoredMove, candidates, exact_best_move, rank_moves, recommend_move, score_cell};

// Crate-level exports - Match orchestration
pub use arena::{
    ArenaError, BOT_PLAYER_ID, ConnectionId, DisconnectOutcome, GameRecord, MatchOrchestrator, MatchQueues,
    MatchTicket, PlayerId, RoomId, RoomState, RoomStatus,
};

// Crate-level exports - Escrow
pub use escrow::{
    EscrowError, EscrowLedger, EscrowRecord, EscrowStatus, Ledger, LedgerError, LedgerTransaction,
    PLATFORM_FEE_PERCENT, PaymentSlot, PayoutReceipt, PayoutSplit, Pubkey, RpcLedger, SignedTransfer,
    build_transfer, decode_pubkey, encode_compact_u16, parse_transaction, transfer_message,
};

// Crate-level exports - Persistence
pub use db::{
    DbError, DbErrorKind, GameOutcome, GameRecordRow, GameRepository, GameStore, NewGameRecord, NewRoom, NewUser,
    RATING_DELTA, RoomRow, STARTING_RATING, User,
};

// Crate-level exports - Configuration
pub use config::{ConfigError, EscrowConfig, FeeSchedule, LedgerConfig, ServerConfig};

// Crate-level exports - Transport and HTTP
pub use server::{
    AiMoveRequest, AiMoveResponse, AppState, VerifyPaymentRequest, VerifyPaymentResponse, router,
    spawn_escrow_sweep, spawn_room_sweep,
};
pub use transport::{ClientIntent, Gateway, Hub, ServerEvent};
