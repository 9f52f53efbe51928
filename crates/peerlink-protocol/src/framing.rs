//! Length-delimited framing.
//!
//! Each message on a stream is preceded by its body length as an unsigned
//! varint, so several messages can follow each other on one byte stream
//! without any outer framer. Stream reads arrive in arbitrary chunks, so
//! [`FrameDecoder`] buffers bytes until a whole frame is available.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::Message;
use prost::encoding::decode_varint;

use crate::ProtocolError;

/// Default upper bound on a single frame body (4 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

const MAX_VARINT_LEN: usize = 10;

/// Reassembles length-prefixed frames from a chunked byte stream.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_frame_size: usize,
}

impl FrameDecoder {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_frame_size,
        }
    }

    /// Appends bytes read from the stream.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.put_slice(data);
    }

    /// Number of buffered bytes not yet returned as a frame.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the next complete frame body, or `None` if more bytes are
    /// needed.
    ///
    /// # Errors
    /// Fails on a malformed length prefix, or as soon as the prefix announces
    /// a body larger than the maximum (without waiting for the body).
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        let Some(last) = self
            .buffer
            .iter()
            .take(MAX_VARINT_LEN)
            .position(|byte| byte & 0x80 == 0)
        else {
            if self.buffer.len() >= MAX_VARINT_LEN {
                return Err(ProtocolError::VarintOverflow);
            }
            return Ok(None);
        };
        let prefix_len = last + 1;
        let len = decode_varint(&mut &self.buffer[..prefix_len])?;

        let len = usize::try_from(len).unwrap_or(usize::MAX);
        if len > self.max_frame_size {
            return Err(ProtocolError::MessageTooLarge {
                size: len,
                max: self.max_frame_size,
            });
        }
        if self.buffer.len() - prefix_len < len {
            return Ok(None);
        }

        self.buffer.advance(prefix_len);
        Ok(Some(self.buffer.split_to(len).freeze()))
    }

    /// Like [`next_frame`](Self::next_frame) but decodes the body as `M`.
    pub fn decode_next<M: Message + Default>(&mut self) -> Result<Option<M>, ProtocolError> {
        match self.next_frame()? {
            Some(frame) => Ok(Some(M::decode(frame)?)),
            None => Ok(None),
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}
