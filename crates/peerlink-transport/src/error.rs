use crate::PeerId;

/// Errors that can occur in the substrate layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No connection to the peer could be established.
    #[error("dial to {peer} failed: {reason}")]
    DialFailed { peer: PeerId, reason: String },

    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// The remote peer does not handle the requested protocol.
    #[error("peer {peer} does not support protocol {protocol}")]
    ProtocolNotSupported { peer: PeerId, protocol: String },

    /// A handler for this protocol is already installed on the host.
    #[error("protocol {0} already has a handler")]
    ProtocolAlreadyHandled(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// The stream was already closed locally.
    #[error("stream closed")]
    StreamClosed,

    /// The stream was aborted and can no longer be used.
    #[error("stream aborted: {0}")]
    StreamAborted(String),
}
