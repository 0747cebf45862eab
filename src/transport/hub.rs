//! Outbound channels, one per live connection.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use super::events::ServerEvent;
use crate::arena::ConnectionId;

/// Routes events to connections.
#[derive(Debug, Default)]
pub struct Hub {
    senders: DashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>,
}

impl Hub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the outbound channel for a connection.
    #[instrument(skip(self))]
    pub fn register(&self, connection: ConnectionId) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.insert(connection, tx);
        debug!(connections = self.senders.len(), "Connection registered");
        rx
    }

    /// Closes a connection's channel.
    #[instrument(skip(self))]
    pub fn unregister(&self, connection: ConnectionId) {
        self.senders.remove(&connection);
    }

    /// Sends an event. Returns false if the connection is gone.
    #[instrument(skip(self, event))]
    pub fn send(&self, connection: ConnectionId, event: ServerEvent) -> bool {
        let Some(sender) = self.senders.get(&connection) else {
            debug!("No channel for connection");
            return false;
        };
        if sender.send(event).is_err() {
            warn!("Connection channel closed");
            return false;
        }
        true
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.senders.len()
    }

    /// Returns true when no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}
