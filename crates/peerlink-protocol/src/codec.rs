//! Codec trait and the protobuf implementation used on direct-message
//! streams.
//!
//! The exchange engine and inbound handler only talk to the [`Codec`]
//! trait, so the framing policy (currently: length-delimited protobuf with
//! a size cap) lives in one place.

use bytes::{Bytes, BytesMut};
use prost::Message;

use crate::ProtocolError;
use crate::framing::{DEFAULT_MAX_MESSAGE_SIZE, FrameDecoder};

/// Converts wire messages to and from length-delimited frames.
pub trait Codec: Send + Sync + 'static {
    /// Encodes a message including its length prefix.
    ///
    /// # Errors
    /// Returns [`ProtocolError::MessageTooLarge`] if the body exceeds the
    /// codec's limit; a peer would refuse the frame anyway.
    fn encode<M: Message>(&self, message: &M) -> Result<Bytes, ProtocolError>;

    /// Decodes exactly one length-delimited message.
    ///
    /// # Errors
    /// Fails on malformed framing, an oversized frame, or trailing bytes.
    fn decode<M: Message + Default>(&self, data: &[u8]) -> Result<M, ProtocolError>;

    /// A streaming decoder configured with the same limits.
    fn frame_decoder(&self) -> FrameDecoder;
}

/// Protobuf bodies behind unsigned-varint length prefixes.
///
/// ```rust
/// use peerlink_protocol::{Codec, DirectMessageRequest, ProtobufCodec};
///
/// let codec = ProtobufCodec::default();
/// let request = DirectMessageRequest::new("hello", "text/plain", "docs");
///
/// let bytes = codec.encode(&request).unwrap();
/// let decoded: DirectMessageRequest = codec.decode(&bytes).unwrap();
/// assert_eq!(decoded.content, "hello");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ProtobufCodec {
    max_message_size: usize,
}

impl ProtobufCodec {
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }
}

impl Default for ProtobufCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

impl Codec for ProtobufCodec {
    fn encode<M: Message>(&self, message: &M) -> Result<Bytes, ProtocolError> {
        let size = message.encoded_len();
        if size > self.max_message_size {
            return Err(ProtocolError::MessageTooLarge {
                size,
                max: self.max_message_size,
            });
        }
        let mut buf = BytesMut::with_capacity(prost::length_delimiter_len(size) + size);
        message.encode_length_delimited(&mut buf)?;
        Ok(buf.freeze())
    }

    fn decode<M: Message + Default>(&self, data: &[u8]) -> Result<M, ProtocolError> {
        let mut decoder = self.frame_decoder();
        decoder.push(data);
        let message = decoder
            .decode_next()?
            .ok_or(ProtocolError::Truncated)?;
        match decoder.buffered_len() {
            0 => Ok(message),
            trailing => Err(ProtocolError::TrailingBytes(trailing)),
        }
    }

    fn frame_decoder(&self) -> FrameDecoder {
        FrameDecoder::new(self.max_message_size)
    }
}
