//! In-process substrate built on `tokio::io::duplex`.
//!
//! A [`MemoryNetwork`] is a switchboard of [`MemoryHost`]s. Dialing a peer
//! creates a pair of [`MemoryConnection`]s (one per side); every stream is a
//! fresh duplex pipe whose far end is delivered to the remote host's
//! handler for the stream's protocol. Topology listeners are notified the
//! way a real host would after protocol identification: when a connection
//! exists and the other side handles the listener's protocol.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

use crate::{
    Connection, ConnectionId, Host, InboundStream, Incoming, PeerId, Stream, StreamId,
    TopologyListener, TransportError,
};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Bytes a pipe buffers in each direction before writes wait for reads.
const PIPE_CAPACITY: usize = 64 * 1024;

type InboundSender = mpsc::UnboundedSender<InboundStream<MemoryConnection>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-host state shared between the host handle, the network, and
/// connections pointing at this host.
struct HostState {
    peer: PeerId,
    handlers: Mutex<HashMap<String, InboundSender>>,
    listeners: Mutex<Vec<(String, Arc<dyn TopologyListener>)>>,
    connections: Mutex<HashMap<PeerId, Arc<MemoryConnection>>>,
}

impl HostState {
    fn handled_protocols(&self) -> Vec<String> {
        lock(&self.handlers).keys().cloned().collect()
    }

    /// Listeners interested in any of `protocols`.
    fn listeners_for(&self, protocols: &[String]) -> Vec<Arc<dyn TopologyListener>> {
        lock(&self.listeners)
            .iter()
            .filter(|(protocol, _)| protocols.contains(protocol))
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    fn connected_peers(&self) -> Vec<PeerId> {
        lock(&self.connections).keys().copied().collect()
    }
}

// ---------------------------------------------------------------------------
// MemoryNetwork
// ---------------------------------------------------------------------------

/// A set of in-process hosts that can dial each other.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    hosts: Arc<Mutex<HashMap<PeerId, Arc<HostState>>>>,
    // Held while a connection pair is linked or unlinked, so both halves
    // change together. Taken before any host's `connections` lock.
    links: Arc<Mutex<()>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a host with a random peer id.
    pub fn add_host(&self) -> MemoryHost {
        let state = Arc::new(HostState {
            peer: PeerId::random(),
            handlers: Mutex::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
            connections: Mutex::new(HashMap::new()),
        });
        lock(&self.hosts).insert(state.peer, Arc::clone(&state));
        tracing::debug!(peer = %state.peer, "memory host added");
        MemoryHost {
            state,
            network: self.clone(),
        }
    }

    /// Removes a host: its connections are hung up and it can no longer be
    /// dialed.
    pub fn remove_host(&self, peer: PeerId) {
        let Some(state) = self.host_state(&peer) else {
            return;
        };
        for remote in state.connected_peers() {
            self.hang_up(peer, remote);
        }
        lock(&state.handlers).clear();
        lock(&self.hosts).remove(&peer);
        tracing::debug!(%peer, "memory host removed");
    }

    /// Closes the connection pair between `a` and `b`, if any, and notifies
    /// topology listeners on both sides.
    pub fn hang_up(&self, a: PeerId, b: PeerId) {
        let (Some(host_a), Some(host_b)) = (self.host_state(&a), self.host_state(&b)) else {
            return;
        };

        let (removed_a, removed_b) = {
            let _links = lock(&self.links);
            (
                lock(&host_a.connections).remove(&b),
                lock(&host_b.connections).remove(&a),
            )
        };
        if removed_a.is_none() && removed_b.is_none() {
            return;
        }
        for conn in removed_a.iter().chain(removed_b.iter()) {
            conn.closed.store(true, Ordering::Release);
        }

        tracing::debug!(%a, %b, "memory connection hung up");
        for listener in host_a.listeners_for(&host_b.handled_protocols()) {
            listener.on_disconnect(b);
        }
        for listener in host_b.listeners_for(&host_a.handled_protocols()) {
            listener.on_disconnect(a);
        }
    }

    fn host_state(&self, peer: &PeerId) -> Option<Arc<HostState>> {
        lock(&self.hosts).get(peer).cloned()
    }
}

// ---------------------------------------------------------------------------
// MemoryHost
// ---------------------------------------------------------------------------

/// One node on a [`MemoryNetwork`].
#[derive(Clone)]
pub struct MemoryHost {
    state: Arc<HostState>,
    network: MemoryNetwork,
}

impl MemoryHost {
    /// Hangs up the connection to `peer`.
    pub fn hang_up(&self, peer: PeerId) {
        self.network.hang_up(self.state.peer, peer);
    }

    pub fn is_connected(&self, peer: &PeerId) -> bool {
        lock(&self.state.connections).contains_key(peer)
    }

    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }
}

impl Host for MemoryHost {
    type Connection = MemoryConnection;
    type Incoming = MemoryIncoming;

    fn local_peer(&self) -> PeerId {
        self.state.peer
    }

    async fn open_connection(
        &self,
        peer: PeerId,
    ) -> Result<Arc<MemoryConnection>, TransportError> {
        if peer == self.state.peer {
            return Err(TransportError::DialFailed {
                peer,
                reason: "cannot dial self".into(),
            });
        }
        if let Some(existing) = lock(&self.state.connections).get(&peer) {
            return Ok(Arc::clone(existing));
        }

        let remote = self
            .network
            .host_state(&peer)
            .ok_or_else(|| TransportError::DialFailed {
                peer,
                reason: "no route to peer".into(),
            })?;

        let outbound = Arc::new(MemoryConnection::new(&self.state, &remote));
        let inbound = Arc::new(MemoryConnection::new(&remote, &self.state));
        {
            let _links = lock(&self.network.links);
            let mut ours = lock(&self.state.connections);
            // Lost a race with a concurrent dial, possibly from `peer`.
            if let Some(existing) = ours.get(&peer) {
                return Ok(Arc::clone(existing));
            }
            ours.insert(peer, Arc::clone(&outbound));
            lock(&remote.connections).insert(self.state.peer, inbound);
        }

        tracing::debug!(
            local = %self.state.peer,
            %peer,
            conn_id = %outbound.id,
            "memory connection opened"
        );
        for listener in self.state.listeners_for(&remote.handled_protocols()) {
            listener.on_connect(peer);
        }
        for listener in remote.listeners_for(&self.state.handled_protocols()) {
            listener.on_connect(self.state.peer);
        }

        Ok(outbound)
    }

    fn handle(&self, protocol: &str) -> Result<MemoryIncoming, TransportError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        {
            let mut handlers = lock(&self.state.handlers);
            if handlers.contains_key(protocol) {
                return Err(TransportError::ProtocolAlreadyHandled(protocol.to_string()));
            }
            handlers.insert(protocol.to_string(), sender);
        }

        // Peers we are already connected to learn about the new protocol.
        let protocols = [protocol.to_string()];
        for remote_peer in self.state.connected_peers() {
            if let Some(remote) = self.network.host_state(&remote_peer) {
                for listener in remote.listeners_for(&protocols) {
                    listener.on_connect(self.state.peer);
                }
            }
        }

        Ok(MemoryIncoming {
            protocol: protocol.to_string(),
            receiver,
        })
    }

    fn unhandle(&self, protocol: &str) {
        if lock(&self.state.handlers).remove(protocol).is_none() {
            return;
        }

        let protocols = [protocol.to_string()];
        for remote_peer in self.state.connected_peers() {
            if let Some(remote) = self.network.host_state(&remote_peer) {
                for listener in remote.listeners_for(&protocols) {
                    listener.on_disconnect(self.state.peer);
                }
            }
        }
    }

    fn register(&self, protocol: &str, listener: Arc<dyn TopologyListener>) {
        lock(&self.state.listeners).push((protocol.to_string(), Arc::clone(&listener)));

        // Existing connections count as already identified.
        let protocols = [protocol.to_string()];
        for remote_peer in self.state.connected_peers() {
            if let Some(remote) = self.network.host_state(&remote_peer) {
                if remote.handled_protocols().iter().any(|p| protocols.contains(p)) {
                    listener.on_connect(remote_peer);
                }
            }
        }
    }

    fn unregister(&self, protocol: &str, listener: &Arc<dyn TopologyListener>) {
        lock(&self.state.listeners).retain(|(registered, existing)| {
            registered != protocol || !std::ptr::addr_eq(Arc::as_ptr(existing), Arc::as_ptr(listener))
        });
    }
}

/// Inbound streams for one protocol on a [`MemoryHost`].
pub struct MemoryIncoming {
    protocol: String,
    receiver: mpsc::UnboundedReceiver<InboundStream<MemoryConnection>>,
}

impl MemoryIncoming {
    pub fn protocol(&self) -> &str {
        &self.protocol
    }
}

impl Incoming for MemoryIncoming {
    type Connection = MemoryConnection;

    async fn accept(&mut self) -> Option<InboundStream<MemoryConnection>> {
        self.receiver.recv().await
    }
}

// ---------------------------------------------------------------------------
// MemoryConnection
// ---------------------------------------------------------------------------

/// One side of an in-process connection.
pub struct MemoryConnection {
    id: ConnectionId,
    local_peer: PeerId,
    remote_peer: PeerId,
    // Weak: hosts own their connections, so a strong ref would cycle.
    remote: Weak<HostState>,
    closed: AtomicBool,
}

impl MemoryConnection {
    fn new(local: &Arc<HostState>, remote: &Arc<HostState>) -> Self {
        Self {
            id: ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)),
            local_peer: local.peer,
            remote_peer: remote.peer,
            remote: Arc::downgrade(remote),
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Connection for MemoryConnection {
    type Stream = MemoryStream;

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn remote_peer(&self) -> PeerId {
        self.remote_peer
    }

    async fn new_stream(&self, protocol: &str) -> Result<MemoryStream, TransportError> {
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed(format!(
                "{} to {} was hung up",
                self.id, self.remote_peer
            )));
        }
        let remote = self.remote.upgrade().ok_or_else(|| {
            TransportError::ConnectionClosed(format!("{} is gone", self.remote_peer))
        })?;

        let not_supported = || TransportError::ProtocolNotSupported {
            peer: self.remote_peer,
            protocol: protocol.to_string(),
        };
        let handler = lock(&remote.handlers)
            .get(protocol)
            .cloned()
            .ok_or_else(not_supported)?;
        let reverse = lock(&remote.connections)
            .get(&self.local_peer)
            .cloned()
            .ok_or_else(|| {
                TransportError::ConnectionClosed(format!(
                    "{} has no connection back to {}",
                    self.remote_peer, self.local_peer
                ))
            })?;

        let id = StreamId::next();
        let (local_end, remote_end) = tokio::io::duplex(PIPE_CAPACITY);
        handler
            .send(InboundStream {
                stream: MemoryStream::new(id, protocol, remote_end),
                connection: reverse,
            })
            .map_err(|_| not_supported())?;

        tracing::trace!(conn_id = %self.id, stream_id = %id, protocol, "memory stream opened");
        Ok(MemoryStream::new(id, protocol, local_end))
    }
}

// ---------------------------------------------------------------------------
// MemoryStream
// ---------------------------------------------------------------------------

enum StreamState {
    Open(DuplexStream),
    Closed,
    Aborted(String),
}

/// One end of an in-process stream.
pub struct MemoryStream {
    id: StreamId,
    protocol: String,
    state: StreamState,
}

impl MemoryStream {
    fn new(id: StreamId, protocol: &str, io: DuplexStream) -> Self {
        Self {
            id,
            protocol: protocol.to_string(),
            state: StreamState::Open(io),
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.state, StreamState::Aborted(_))
    }

    fn io(&mut self) -> Result<&mut DuplexStream, TransportError> {
        match &mut self.state {
            StreamState::Open(io) => Ok(io),
            StreamState::Closed => Err(TransportError::StreamClosed),
            StreamState::Aborted(reason) => Err(TransportError::StreamAborted(reason.clone())),
        }
    }
}

impl Stream for MemoryStream {
    fn id(&self) -> StreamId {
        self.id
    }

    fn protocol(&self) -> &str {
        &self.protocol
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let io = self.io()?;
        io.write_all(data).await.map_err(TransportError::SendFailed)?;
        io.flush().await.map_err(TransportError::SendFailed)
    }

    async fn read(&mut self, max_bytes: usize) -> Result<Option<Bytes>, TransportError> {
        let io = self.io()?;
        // A pipe never holds more than its capacity, so larger requests
        // only waste allocation. Zero would read 0 and look like EOF.
        let limit = max_bytes.clamp(1, PIPE_CAPACITY);
        let mut buf = BytesMut::with_capacity(limit);
        let n = io
            .take(limit as u64)
            .read_buf(&mut buf)
            .await
            .map_err(TransportError::ReceiveFailed)?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(buf.freeze()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match std::mem::replace(&mut self.state, StreamState::Closed) {
            StreamState::Open(mut io) => {
                // Half-close first so the remote reads buffered data, then EOF.
                io.shutdown().await.map_err(TransportError::SendFailed)
            }
            StreamState::Closed => Ok(()),
            StreamState::Aborted(reason) => {
                self.state = StreamState::Aborted(reason.clone());
                Err(TransportError::StreamAborted(reason))
            }
        }
    }

    fn abort(&mut self, reason: &str) {
        if matches!(self.state, StreamState::Open(_)) {
            tracing::debug!(stream_id = %self.id, reason, "memory stream aborted");
        }
        // Dropping the pipe end wakes any pending remote read or write.
        self.state = StreamState::Aborted(reason.to_string());
    }
}
