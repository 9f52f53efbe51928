//! Wire protocol for peerlink direct messages.
//!
//! This crate defines what two peers exchange on a direct-message stream:
//!
//! - **Types** ([`Metadata`], [`Status`], [`DirectMessageRequest`],
//!   [`DirectMessageResponse`]): the schema as `prost` messages, with stable
//!   field numbers.
//! - **Framing** ([`FrameDecoder`]): varint length prefixes so messages can
//!   follow each other on one stream.
//! - **Codec** ([`Codec`] trait, [`ProtobufCodec`]): the seam the exchange
//!   engine encodes and decodes through.
//! - **Errors** ([`ProtocolError`]): everything that can be wrong with the
//!   bytes themselves.
//!
//! # Architecture
//!
//! The protocol layer knows nothing about peers, connections, or streams.
//!
//! ```text
//! Transport (streams) → Protocol (frames ↔ messages) → Exchange (send / handle)
//! ```

mod codec;
mod error;
mod framing;
mod types;

pub use codec::{Codec, ProtobufCodec};
pub use error::ProtocolError;
pub use framing::{DEFAULT_MAX_MESSAGE_SIZE, FrameDecoder};
pub use prost::Message;
pub use types::{DirectMessageRequest, DirectMessageResponse, Metadata, Status};
