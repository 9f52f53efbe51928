//! Error types for the protocol layer.
//!
//! A `ProtocolError` always means the bytes themselves were the problem:
//! a frame that could not be parsed, or one that was too large to accept.
//! Networking failures live in `peerlink-transport`, and semantic problems
//! with a well-formed response (wrong status, missing metadata) are reported
//! by the exchange engine in `peerlink`.

/// Errors that can occur while encoding or decoding wire messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The input ended in the middle of a length prefix or a frame body.
    #[error("unexpected end of buffer")]
    Truncated,

    /// A length prefix ran past 10 bytes without terminating.
    #[error("length prefix overflows 64 bits")]
    VarintOverflow,

    /// A frame body was not a valid message: bad field key, wrong wire
    /// type, invalid UTF-8, or a nested length running past the frame.
    #[error("malformed message: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("failed to encode message: {0}")]
    Encode(#[from] prost::EncodeError),

    /// A frame (or an encoded message) exceeds the configured maximum.
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Bytes were left over after a single length-delimited message.
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),
}
