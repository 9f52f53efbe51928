//! Error taxonomy for direct-message exchanges.

use std::fmt;
use std::time::Duration;

use peerlink_protocol::{ProtocolError, Status};
use peerlink_transport::{PeerId, TransportError};

/// The bounded suspension points of one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Connect,
    OpenStream,
    Write,
    Read,
    Close,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::OpenStream => "open stream",
            Self::Write => "write",
            Self::Read => "read",
            Self::Close => "close",
        };
        f.write_str(name)
    }
}

/// Everything that can end a direct-message exchange, on either side.
///
/// Lower-layer errors convert with `?`: [`ProtocolError`] becomes
/// [`Decode`](Self::Decode), [`TransportError`] becomes
/// [`Transport`](Self::Transport), [`ConfigError`] becomes
/// [`Config`](Self::Config).
#[derive(Debug, thiserror::Error)]
pub enum DirectMessageError {
    /// `send` was called with empty content. No I/O was attempted.
    #[error("message content is empty")]
    EmptyMessage,

    /// The connection to the peer could not be obtained. `source` is either
    /// the substrate failure or a [`Timeout`](Self::Timeout) for
    /// [`Step::Connect`].
    #[error("no connection to {peer}: {source}")]
    NoConnection {
        peer: PeerId,
        source: Box<DirectMessageError>,
    },

    /// A stream for the protocol could not be opened on the connection.
    #[error("no {protocol} stream to {peer}: {source}")]
    NoStream {
        peer: PeerId,
        protocol: String,
        source: Box<DirectMessageError>,
    },

    /// A bounded step exceeded its budget.
    #[error("{step} timed out after {budget:?}")]
    Timeout { step: Step, budget: Duration },

    /// The stream ended before any response byte arrived.
    #[error("stream ended before a response")]
    NoResponse,

    /// The stream ended before any request byte arrived (responder side).
    #[error("stream ended before a request")]
    NoRequest,

    /// The response carried no metadata.
    #[error("response has no metadata")]
    MissingMetadata,

    /// The remote peer answered with a status other than OK.
    #[error("peer answered {status}{}", describe_text(.status_text))]
    NonOkStatus {
        status: Status,
        status_text: Option<String>,
    },

    /// The bytes on the stream did not form a valid message.
    #[error("invalid message: {0}")]
    Decode(#[from] ProtocolError),

    /// Reading or writing the stream failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Graceful close failed after an otherwise successful exchange.
    #[error("close failed: {0}")]
    Close(#[source] TransportError),

    /// The service configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl DirectMessageError {
    /// The step that failed, where it is known.
    pub fn step(&self) -> Option<Step> {
        match self {
            Self::NoConnection { .. } => Some(Step::Connect),
            Self::NoStream { .. } => Some(Step::OpenStream),
            Self::Timeout { step, .. } => Some(*step),
            Self::NoResponse
            | Self::NoRequest
            | Self::MissingMetadata
            | Self::NonOkStatus { .. }
            | Self::Decode(_) => Some(Step::Read),
            Self::Close(_) => Some(Step::Close),
            Self::EmptyMessage | Self::Transport(_) | Self::Config(_) => None,
        }
    }

    /// Whether a higher layer may reasonably try the same send again.
    ///
    /// Nothing in this crate retries on its own. A close timeout is not
    /// retryable: the response had already been accepted.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { step, .. } => *step != Step::Close,
            Self::NoConnection { .. } | Self::NoStream { .. } | Self::Transport(_) => true,
            _ => false,
        }
    }

    /// Whether the failure was a budget running out, including a timed-out
    /// dial or stream open.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::NoConnection { source, .. } | Self::NoStream { source, .. } => {
                source.is_timeout()
            }
            _ => false,
        }
    }
}

fn describe_text(text: &Option<String>) -> String {
    text.as_deref().map(|t| format!(": {t}")).unwrap_or_default()
}

/// Rejected configuration values.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("protocol id must not be empty")]
    EmptyProtocolId,

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("read_chunk_size {read_chunk_size} exceeds max_message_size {max_message_size}")]
    ReadChunkTooLarge {
        read_chunk_size: usize,
        max_message_size: usize,
    },

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}
