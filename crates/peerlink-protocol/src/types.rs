//! The direct-message schema.
//!
//! These are the structures that travel on a direct-message stream. The
//! equivalent `.proto` definition, which other implementations compile
//! against, is:
//!
//! ```text
//! message Metadata {
//!   string clientVersion = 1;
//!   int64 timestamp = 2;
//! }
//!
//! enum Status {
//!   UNKNOWN = 0;
//!   OK = 200;
//!   ERROR = 500;
//! }
//!
//! message DirectMessageRequest {
//!   Metadata metadata = 1;
//!   string content = 2;
//!   string type = 3;
//! }
//!
//! message DirectMessageResponse {
//!   Metadata metadata = 1;
//!   Status status = 2;
//!   optional string statusText = 3;
//! }
//! ```
//!
//! Field numbers are part of the protocol. Never renumber a field; add new
//! fields under new numbers instead (old peers skip them).
//!
//! Encoding follows proto3: scalar fields holding their default value are
//! not written, and every field decodes to its default when absent.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Diagnostic header attached to every request and response.
#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct Metadata {
    /// Free-form version tag of the sending implementation.
    #[prost(string, tag = "1")]
    pub client_version: String,
    /// Milliseconds since the Unix epoch at the time the message was built.
    #[prost(int64, tag = "2")]
    pub timestamp: i64,
}

impl Metadata {
    /// Metadata stamped with the current wall-clock time.
    pub fn now(client_version: impl Into<String>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as i64)
            .unwrap_or_default();
        Self {
            client_version: client_version.into(),
            timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Outcome reported by the responder.
///
/// Responses carry the raw value; [`DirectMessageResponse::status`] maps any
/// value this implementation does not know to `Unknown`, so a newer peer
/// adding statuses never breaks decoding here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, prost::Enumeration)]
#[repr(i32)]
pub enum Status {
    Unknown = 0,
    Ok = 200,
    Error = 500,
}

impl Status {
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "UNKNOWN",
            Self::Ok => "OK",
            Self::Error => "ERROR",
        };
        write!(f, "{name}({})", i32::from(*self))
    }
}

// ---------------------------------------------------------------------------
// DirectMessageRequest
// ---------------------------------------------------------------------------

/// A single direct message, sent by the initiator of a stream.
#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct DirectMessageRequest {
    #[prost(message, optional, tag = "1")]
    pub metadata: Option<Metadata>,
    /// Message body. Empty when absent on the wire.
    #[prost(string, tag = "2")]
    pub content: String,
    /// MIME-like type tag such as `"text/plain"`. Empty when absent.
    #[prost(string, tag = "3")]
    pub r#type: String,
}

impl DirectMessageRequest {
    /// Builds a request with freshly stamped metadata.
    pub fn new(
        content: impl Into<String>,
        r#type: impl Into<String>,
        client_version: impl Into<String>,
    ) -> Self {
        Self {
            metadata: Some(Metadata::now(client_version)),
            content: content.into(),
            r#type: r#type.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// DirectMessageResponse
// ---------------------------------------------------------------------------

/// The responder's answer to a [`DirectMessageRequest`].
///
/// `status_text` is diagnostic only; nothing in the protocol depends on
/// whether it is present.
#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct DirectMessageResponse {
    #[prost(message, optional, tag = "1")]
    pub metadata: Option<Metadata>,
    /// Raw status value; read it through `status()`.
    #[prost(enumeration = "Status", tag = "2")]
    pub status: i32,
    #[prost(string, optional, tag = "3")]
    pub status_text: Option<String>,
}

impl DirectMessageResponse {
    /// Builds a response with freshly stamped metadata.
    pub fn new(status: Status, client_version: impl Into<String>) -> Self {
        Self {
            metadata: Some(Metadata::now(client_version)),
            status: status.into(),
            status_text: None,
        }
    }

    pub fn with_status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = Some(text.into());
        self
    }
}

// =========================================================================
// Tests
// =========================================================================
