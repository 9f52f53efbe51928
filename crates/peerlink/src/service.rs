//! `DirectMessage` builder and service handle.
//!
//! This is the entry point for embedding direct messages in a node. It ties
//! together all the layers: substrate → codec → exchange / handler, with
//! the capability registry listening on the side.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use peerlink_protocol::ProtobufCodec;
use peerlink_registry::PeerRegistry;
use peerlink_transport::{Host, PeerId, TopologyListener};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::event::DeliveredMessages;
use crate::handler::{AcceptAll, HandlerContext, MessageFilter, accept_loop};
use crate::{DirectMessageConfig, DirectMessageError, exchange};

/// Builder for configuring and starting a [`DirectMessage`] service.
///
/// # Example
///
/// ```rust
/// use peerlink::prelude::*;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), DirectMessageError> {
/// let network = MemoryNetwork::new();
/// let (alice, _) = DirectMessage::builder().build(network.add_host())?;
/// let (bob, mut inbox) = DirectMessage::builder().build(network.add_host())?;
///
/// alice.send(bob.local_peer(), "hello", "text/plain").await?;
/// let message = inbox.recv().await.unwrap();
/// assert_eq!(message.content, "hello");
/// # Ok(())
/// # }
/// ```
pub struct DirectMessageBuilder<F: MessageFilter = AcceptAll> {
    config: DirectMessageConfig,
    filter: F,
}

impl DirectMessageBuilder<AcceptAll> {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: DirectMessageConfig::default(),
            filter: AcceptAll,
        }
    }
}

impl Default for DirectMessageBuilder<AcceptAll> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: MessageFilter> DirectMessageBuilder<F> {
    /// Sets the service configuration.
    pub fn config(mut self, config: DirectMessageConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the filter inbound messages must pass.
    pub fn filter<G: MessageFilter>(self, filter: G) -> DirectMessageBuilder<G> {
        DirectMessageBuilder {
            config: self.config,
            filter,
        }
    }

    /// Installs the protocol handler on `host`, registers the capability
    /// registry, and spawns the accept loop.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// - [`DirectMessageError::Config`] if the config fails validation
    /// - [`DirectMessageError::Transport`] if the host already has a handler
    ///   for the protocol id
    pub fn build<H: Host>(self, host: H) -> Result<(DirectMessage<H>, DeliveredMessages), DirectMessageError> {
        self.config.validate()?;
        let config = Arc::new(self.config);
        let codec = config.codec();

        let incoming = host.handle(&config.protocol_id)?;
        let registry = PeerRegistry::new();
        let listener: Arc<dyn TopologyListener> = Arc::new(registry.clone());
        host.register(&config.protocol_id, Arc::clone(&listener));

        let (events, receiver) = mpsc::unbounded_channel();
        let ctx = Arc::new(HandlerContext {
            config: Arc::clone(&config),
            codec,
            filter: self.filter,
            events,
        });
        let accept_task = tokio::spawn(accept_loop(incoming, ctx));

        tracing::info!(
            peer = %host.local_peer(),
            protocol = %config.protocol_id,
            "direct message service started"
        );

        let service = DirectMessage {
            host,
            codec,
            config,
            registry,
            listener,
            accept_task,
            released: AtomicBool::new(false),
        };
        Ok((service, DeliveredMessages::new(receiver)))
    }
}

/// A running direct-message service on one host.
///
/// Sending is `&self` and fully concurrent; each [`send`](Self::send) owns
/// its own stream. Dropping the service has the same effect as
/// [`shutdown`](Self::shutdown).
pub struct DirectMessage<H: Host> {
    host: H,
    codec: ProtobufCodec,
    config: Arc<DirectMessageConfig>,
    registry: PeerRegistry,
    listener: Arc<dyn TopologyListener>,
    accept_task: JoinHandle<()>,
    released: AtomicBool,
}

// The builder is host-agnostic until `build`; this impl only anchors
// inference for `DirectMessage::builder()`, the way `HashMap::new` does.
impl DirectMessage<peerlink_transport::MemoryHost> {
    /// Creates a new builder.
    pub fn builder() -> DirectMessageBuilder {
        DirectMessageBuilder::new()
    }
}

impl<H: Host> DirectMessage<H> {
    /// Sends `content` tagged with `type` to `peer` and waits for an OK.
    ///
    /// See [`exchange::send`] for the step-by-step contract and errors.
    pub async fn send(&self, peer: PeerId, content: &str, r#type: &str) -> Result<(), DirectMessageError> {
        exchange::send(&self.host, &self.codec, &self.config, peer, content, r#type).await
    }

    /// Whether `peer` is currently known to support the protocol.
    ///
    /// Advisory only: `send` does not consult it.
    pub fn is_capable(&self, peer: &PeerId) -> bool {
        self.registry.is_capable(peer)
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn local_peer(&self) -> PeerId {
        self.host.local_peer()
    }

    pub fn config(&self) -> &DirectMessageConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Stops accepting inbound streams and hands the protocol back to the
    /// host: the handler and the registry's listener are removed, so the
    /// host can build a new service. Exchanges already in flight run to
    /// completion. Outbound sends keep working.
    pub fn shutdown(&self) {
        if !self.accept_task.is_finished() {
            tracing::info!(peer = %self.host.local_peer(), "direct message service stopping");
        }
        self.release();
    }

    pub fn is_running(&self) -> bool {
        !self.accept_task.is_finished()
    }

    // Runs once: a later service on the same host owns the protocol by then.
    fn release(&self) {
        self.accept_task.abort();
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.host.unhandle(&self.config.protocol_id);
        self.host.unregister(&self.config.protocol_id, &self.listener);
    }
}

impl<H: Host> Drop for DirectMessage<H> {
    fn drop(&mut self) {
        self.release();
    }
}
