//! # peerlink
//!
//! Request/response direct messages between peers.
//!
//! A node sends a short typed message (`content` plus a MIME-like `type`)
//! to one peer over a fresh multiplexed stream, and waits for an OK or
//! ERROR acknowledgement. Every I/O step has its own budget, nothing is
//! retried, and the remote node hands each accepted message to the
//! application exactly once.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use peerlink::prelude::*;
//!
//! # async fn run(network: MemoryNetwork, bob: PeerId) -> Result<(), DirectMessageError> {
//! let (service, mut inbox) = DirectMessage::builder()
//!     .config(DirectMessageConfig::default())
//!     .build(network.add_host())?;
//!
//! service.send(bob, "hello", "text/plain").await?;
//!
//! while let Some(message) = inbox.recv().await {
//!     println!("{}: {}", message.peer, message.content);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Layers
//!
//! ```text
//! peerlink (send, inbound handler, service)
//!     ├── peerlink-registry   capable peers
//!     ├── peerlink-protocol   wire format and framing
//!     └── peerlink-transport  hosts, connections, streams
//! ```

mod config;
mod error;
mod event;
pub mod exchange;
mod handler;
pub mod io;
mod service;

pub use config::{DEFAULT_CLIENT_VERSION, DEFAULT_PROTOCOL_ID, DirectMessageConfig};
pub use error::{ConfigError, DirectMessageError, Step};
pub use event::{ConnectionInfo, DeliveredMessage, DeliveredMessages, StreamInfo};
pub use handler::{AcceptAll, MessageFilter, Verdict};
pub use io::StreamGuard;
pub use service::{DirectMessage, DirectMessageBuilder};

pub use peerlink_protocol as protocol;
pub use peerlink_registry as registry;
pub use peerlink_transport as transport;

/// Everything needed to run a service and send messages.
pub mod prelude {
    pub use crate::{
        AcceptAll, DeliveredMessage, DeliveredMessages, DirectMessage, DirectMessageBuilder,
        DirectMessageConfig, DirectMessageError, MessageFilter, Step, Verdict,
    };
    pub use peerlink_protocol::{DirectMessageRequest, Metadata, Status};
    pub use peerlink_registry::PeerRegistry;
    pub use peerlink_transport::{Host, MemoryHost, MemoryNetwork, PeerId};
}
