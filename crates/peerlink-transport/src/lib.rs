//! Substrate abstraction layer for peerlink.
//!
//! The direct-message protocol runs on top of an already established,
//! encrypted, multiplexed peer-to-peer substrate. This crate describes the
//! narrow slice of that substrate the protocol consumes:
//!
//! - [`Host`]: dials peers, installs per-protocol stream handlers, and
//!   reports topology changes to a [`TopologyListener`].
//! - [`Connection`]: a session with one peer that can open many streams.
//! - [`Stream`]: one bidirectional byte pipe, owned by one exchange.
//!
//! Timeouts are not part of these traits; callers bound every
//! call themselves.
//!
//! # Feature Flags
//!
//! - `memory` (default): in-process substrate ([`MemoryNetwork`]) built on
//!   `tokio::io::duplex`, used by tests and demos.

mod error;
#[cfg(feature = "memory")]
mod memory;

pub use error::TransportError;
#[cfg(feature = "memory")]
pub use memory::{MemoryConnection, MemoryHost, MemoryIncoming, MemoryNetwork, MemoryStream};

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use rand::Rng;

/// Stable identifier of a peer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId([u8; 16]);

impl PeerId {
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Generates a random identifier (128 bits of entropy).
    pub fn random() -> Self {
        let mut rng = rand::rng();
        Self(rng.random())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({self})")
    }
}

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Opaque identifier for a stream. Both ends of a stream share the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(u64);

/// Counter for generating unique stream IDs.
static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

impl StreamId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates a process-wide unique id.
    pub fn next() -> Self {
        Self(NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

/// A single protocol-scoped byte pipe to a remote peer.
///
/// A stream is exclusively owned by whoever opened or accepted it, so two
/// exchanges can never interleave writes on the same stream.
pub trait Stream: Send + 'static {
    fn id(&self) -> StreamId;

    /// Protocol identifier negotiated when the stream was opened.
    fn protocol(&self) -> &str;

    /// Writes all of `data`.
    fn write(&mut self, data: &[u8]) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Reads up to `max_bytes`.
    ///
    /// Returns `Ok(None)` once the remote side has closed its write half
    /// and all buffered data has been read.
    fn read(
        &mut self,
        max_bytes: usize,
    ) -> impl Future<Output = Result<Option<Bytes>, TransportError>> + Send;

    /// Gracefully closes the stream. Data already written is still
    /// delivered to the remote side.
    fn close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Tears the stream down immediately. Pending remote reads end and
    /// remote writes fail; any further local use returns an error.
    fn abort(&mut self, reason: &str);
}

/// An established session with one remote peer.
pub trait Connection: Send + Sync + 'static {
    /// The stream type produced by this connection.
    type Stream: Stream;

    fn id(&self) -> ConnectionId;

    fn remote_peer(&self) -> PeerId;

    /// Opens a new stream negotiated for `protocol`.
    fn new_stream(
        &self,
        protocol: &str,
    ) -> impl Future<Output = Result<Self::Stream, TransportError>> + Send;
}

/// A stream opened by a remote peer, handed to the local protocol handler.
pub struct InboundStream<C: Connection> {
    pub stream: C::Stream,
    pub connection: Arc<C>,
}

/// Source of inbound streams for one protocol, returned by [`Host::handle`].
pub trait Incoming: Send + 'static {
    type Connection: Connection;

    /// Waits for the next inbound stream. Returns `None` once the handler
    /// has been removed or the host is gone.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Option<InboundStream<Self::Connection>>> + Send;
}

/// Observer of protocol-capable peers coming and going.
///
/// `on_connect` fires when a connection exists to a peer that handles the
/// protocol the listener was registered for; `on_disconnect` when that
/// connection goes away. Callbacks may arrive from any task concurrently.
pub trait TopologyListener: Send + Sync + 'static {
    fn on_connect(&self, peer: PeerId);
    fn on_disconnect(&self, peer: PeerId);
}

/// The local node of the substrate.
pub trait Host: Send + Sync + 'static {
    type Connection: Connection;
    type Incoming: Incoming<Connection = Self::Connection>;

    fn local_peer(&self) -> PeerId;

    /// Returns an existing connection to `peer` or dials a new one.
    fn open_connection(
        &self,
        peer: PeerId,
    ) -> impl Future<Output = Result<Arc<Self::Connection>, TransportError>> + Send;

    /// Installs the stream handler for `protocol`.
    ///
    /// # Errors
    /// [`TransportError::ProtocolAlreadyHandled`] if a handler exists.
    fn handle(&self, protocol: &str) -> Result<Self::Incoming, TransportError>;

    /// Removes the handler for `protocol`. Its [`Incoming`] drains and then
    /// returns `None`; connected peers' listeners see `on_disconnect`.
    /// Does nothing if no handler is installed.
    fn unhandle(&self, protocol: &str);

    /// Registers a topology listener for `protocol`.
    fn register(&self, protocol: &str, listener: Arc<dyn TopologyListener>);

    /// Removes a listener added with [`register`](Self::register), matched
    /// by pointer identity.
    fn unregister(&self, protocol: &str, listener: &Arc<dyn TopologyListener>);
}
