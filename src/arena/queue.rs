//! Per-mode matchmaking queues.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::room::PlayerId;
use crate::games::grid::GameMode;

/// Identifier of one transport connection.
pub type ConnectionId = Uuid;

/// A waiting player in one mode's queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchTicket {
    /// Waiting identity.
    pub player_id: PlayerId,
    /// Mode queued for.
    pub mode: GameMode,
    /// Connection that owns the ticket.
    pub connection: ConnectionId,
    /// When the ticket was queued.
    pub enqueued_at: DateTime<Utc>,
}

/// FIFO queues keyed by mode.
///
/// Each mode's list is guarded by its map shard, so pairing and ticket
/// removal happen atomically per mode.
#[derive(Debug, Default)]
pub struct MatchQueues {
    queues: DashMap<GameMode, Vec<MatchTicket>>,
}

impl MatchQueues {
    /// Creates empty queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a ticket, replacing any ticket the player already holds in that mode.
    #[instrument(skip(self))]
    pub fn enqueue(&self, player_id: PlayerId, mode: GameMode, connection: ConnectionId) -> usize {
        let mut queue = self.queues.entry(mode).or_default();
        queue.retain(|t| t.player_id != player_id);
        queue.push(MatchTicket {
            player_id,
            mode,
            connection,
            enqueued_at: Utc::now(),
        });
        info!(depth = queue.len(), "Ticket queued");
        queue.len()
    }

    /// Removes a player's ticket. Returns true if one was removed.
    #[instrument(skip(self))]
    pub fn dequeue(&self, player_id: &str, mode: GameMode) -> bool {
        let Some(mut queue) = self.queues.get_mut(&mode) else {
            return false;
        };
        let before = queue.len();
        queue.retain(|t| t.player_id != player_id);
        let removed = queue.len() < before;
        debug!(removed, "Dequeue");
        removed
    }

    /// Pairs the requester with the first other ticket in the mode's queue.
    ///
    /// Both tickets leave the queue before the guard is released, so a
    /// matched ticket can never be matched again. Returns the requester's
    /// ticket and the opponent's ticket.
    #[instrument(skip(self))]
    pub fn try_match(&self, player_id: &str, mode: GameMode) -> Option<(MatchTicket, MatchTicket)> {
        let mut queue = self.queues.get_mut(&mode)?;
        if queue.len() < 2 {
            return None;
        }
        let mine = queue.iter().position(|t| t.player_id == player_id)?;
        let theirs = queue.iter().position(|t| t.player_id != player_id)?;

        // Remove the higher index first so the lower one stays valid.
        let (first, second) = if mine > theirs { (mine, theirs) } else { (theirs, mine) };
        let a = queue.remove(first);
        let b = queue.remove(second);
        let (requester, opponent) = if a.player_id == player_id { (a, b) } else { (b, a) };

        info!(opponent = %opponent.player_id, remaining = queue.len(), "Tickets paired");
        Some((requester, opponent))
    }

    /// Drops every ticket owned by a connection, across all modes.
    #[instrument(skip(self))]
    pub fn remove_connection(&self, connection: ConnectionId) -> usize {
        let mut removed = 0;
        for mut queue in self.queues.iter_mut() {
            let before = queue.len();
            queue.retain(|t| t.connection != connection);
            removed += before - queue.len();
        }
        debug!(removed, "Connection tickets removed");
        removed
    }

    /// Number of tickets waiting in a mode.
    pub fn depth(&self, mode: GameMode) -> usize {
        self.queues.get(&mode).map(|q| q.len()).unwrap_or(0)
    }

    /// Returns true if the player holds a ticket in the mode.
    pub fn contains(&self, player_id: &str, mode: GameMode) -> bool {
        self.queues
            .get(&mode)
            .is_some_and(|q| q.iter().any(|t| t.player_id == player_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_replaces_existing_ticket() {
        let queues = MatchQueues::new();
        let conn = Uuid::new_v4();
        queues.enqueue("alice".into(), GameMode::RankedLow, conn);
        queues.enqueue("alice".into(), GameMode::RankedLow, conn);
        assert_eq!(queues.depth(GameMode::RankedLow), 1);
    }

    #[test]
    fn test_try_match_needs_two() {
        let queues = MatchQueues::new();
        queues.enqueue("alice".into(), GameMode::Bot, Uuid::new_v4());
        assert!(queues.try_match("alice", GameMode::Bot).is_none());
        assert!(queues.try_match("nobody", GameMode::Training).is_none());
    }

    #[test]
    fn test_try_match_pairs_first_other_ticket() {
        let queues = MatchQueues::new();
        queues.enqueue("alice".into(), GameMode::RankedMid, Uuid::new_v4());
        queues.enqueue("bob".into(), GameMode::RankedMid, Uuid::new_v4());
        queues.enqueue("carol".into(), GameMode::RankedMid, Uuid::new_v4());

        let (me, opponent) = queues.try_match("carol", GameMode::RankedMid).unwrap();
        assert_eq!(me.player_id, "carol");
        assert_eq!(opponent.player_id, "alice");
        assert_eq!(queues.depth(GameMode::RankedMid), 1);
        assert!(queues.contains("bob", GameMode::RankedMid));
        assert!(queues.try_match("alice", GameMode::RankedMid).is_none());
    }

    #[test]
    fn test_requester_must_hold_ticket() {
        let queues = MatchQueues::new();
        queues.enqueue("alice".into(), GameMode::RankedMid, Uuid::new_v4());
        queues.enqueue("bob".into(), GameMode::RankedMid, Uuid::new_v4());
        assert!(queues.try_match("mallory", GameMode::RankedMid).is_none());
        assert_eq!(queues.depth(GameMode::RankedMid), 2);
    }

    #[test]
    fn test_remove_connection_spans_modes() {
        let queues = MatchQueues::new();
        let conn = Uuid::new_v4();
        queues.enqueue("alice".into(), GameMode::RankedMid, conn);
        queues.enqueue("alice".into(), GameMode::RankedHigh, conn);
        queues.enqueue("bob".into(), GameMode::RankedHigh, Uuid::new_v4());
        assert_eq!(queues.remove_connection(conn), 2);
        assert_eq!(queues.depth(GameMode::RankedHigh), 1);
    }
}
