//! Delivered-message events handed to the embedding application.

use peerlink_protocol::Metadata;
use peerlink_transport::{ConnectionId, PeerId, StreamId};
use tokio::sync::mpsc;

/// Read-only description of the stream a message arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub id: StreamId,
    pub protocol: String,
}

/// Read-only description of the connection a message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub remote_peer: PeerId,
}

/// A direct message this node accepted and acknowledged with OK.
///
/// Emitted once per successful inbound exchange, after the response was
/// written. The stream itself stays with the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredMessage {
    pub content: String,
    pub r#type: String,
    pub metadata: Option<Metadata>,
    /// The sender.
    pub peer: PeerId,
    pub stream: StreamInfo,
    pub connection: ConnectionInfo,
}

/// Receiving end for [`DeliveredMessage`]s, returned by
/// [`DirectMessageBuilder::build`](crate::DirectMessageBuilder::build).
///
/// Dropping it is allowed: later messages are still acknowledged, and
/// their events are discarded.
#[derive(Debug)]
pub struct DeliveredMessages {
    receiver: mpsc::UnboundedReceiver<DeliveredMessage>,
}

impl DeliveredMessages {
    pub(crate) fn new(receiver: mpsc::UnboundedReceiver<DeliveredMessage>) -> Self {
        Self { receiver }
    }

    /// Waits for the next delivered message. Returns `None` once the
    /// service has shut down and every pending event was received.
    pub async fn recv(&mut self) -> Option<DeliveredMessage> {
        self.receiver.recv().await
    }

    /// Returns a pending message without waiting.
    pub fn try_recv(&mut self) -> Option<DeliveredMessage> {
        self.receiver.try_recv().ok()
    }
}
