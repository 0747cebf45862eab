//! Match orchestration: rooms, matchmaking queues and connection bindings.

mod error;
mod orchestrator;
mod queue;
mod record;
mod room;

pub use error::ArenaError;
pub use orchestrator::{DisconnectOutcome, MatchOrchestrator};
pub use queue::{ConnectionId, MatchQueues, MatchTicket};
pub use record::GameRecord;
pub use room::{BOT_PLAYER_ID, PlayerId, RoomId, RoomState, RoomStatus};
