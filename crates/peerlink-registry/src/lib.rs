//! Peer capability tracking for peerlink.
//!
//! The substrate reports, per protocol, when a connected peer turns out to
//! handle that protocol and when the connection goes away. [`PeerRegistry`]
//! listens to those reports and answers "can I send to this peer?" in
//! constant time.
//!
//! # How it fits in the stack
//!
//! ```text
//! Service (above)  ← registers the registry, exposes is_capable()
//!     ↕
//! Registry (this crate)  ← set of capable peers
//!     ↕
//! Transport (below)  ← TopologyListener callbacks
//! ```
//!
//! The registry is advisory. Sending never consults it, so a peer that is
//! missing here can still be reached if the substrate can dial it.

mod registry;

pub use registry::PeerRegistry;
