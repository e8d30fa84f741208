//! # Pool Events
//!
//! Typed events re-emitted by the pool. Each lifecycle event is tagged with
//! the id of the connection it came from; pub/sub deliveries carry the
//! decoded payload.

use crate::codec::Payload;
use crate::id::ConnectionId;

/// A message delivered on a subscribed pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubSubMessage {
    /// Connection the message arrived on (the designated subscriber).
    pub connection_id: ConnectionId,
    /// Pattern that matched, for pattern subscriptions.
    pub pattern: Option<String>,
    /// Channel the message was published to.
    pub topic: String,
    /// Decoded message body.
    pub data: Payload,
}

/// Events emitted by the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    /// Link established its transport.
    Connect { id: ConnectionId },
    /// Link is ready for commands.
    Ready { id: ConnectionId },
    /// Link lost its transport.
    Disconnect { id: ConnectionId },
    /// Link is retrying its transport.
    Reconnecting { id: ConnectionId, attempt: usize },
    /// Link failed; the pool removes and replaces it.
    Error { id: ConnectionId, error: String },
    /// Pub/sub delivery.
    Message(PubSubMessage),
}

impl PoolEvent {
    /// Returns the connection the event belongs to.
    pub fn connection_id(&self) -> ConnectionId {
        match self {
            PoolEvent::Connect { id }
            | PoolEvent::Ready { id }
            | PoolEvent::Disconnect { id }
            | PoolEvent::Reconnecting { id, .. }
            | PoolEvent::Error { id, .. } => *id,
            PoolEvent::Message(message) => message.connection_id,
        }
    }
}
