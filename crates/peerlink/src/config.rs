//! Service configuration: protocol id, version tag, and per-step budgets.

use std::path::Path;
use std::time::Duration;

use peerlink_protocol::{DEFAULT_MAX_MESSAGE_SIZE, ProtobufCodec};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Protocol identifier both peers negotiate for direct-message streams.
pub const DEFAULT_PROTOCOL_ID: &str = "/direct-message/1.0.0";

/// Version tag stamped into every outgoing message's metadata.
pub const DEFAULT_CLIENT_VERSION: &str = concat!("peerlink/", env!("CARGO_PKG_VERSION"));

const DEFAULT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_READ_CHUNK_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// DirectMessageConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`DirectMessage`](crate::DirectMessage) service.
///
/// Every field has a default, so a config file only needs the values it
/// overrides:
///
/// ```rust
/// use peerlink::DirectMessageConfig;
///
/// let config = DirectMessageConfig::from_json(r#"{ "read_timeout_ms": 250 }"#).unwrap();
/// assert_eq!(config.read_timeout().as_millis(), 250);
/// assert_eq!(config.protocol_id, "/direct-message/1.0.0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectMessageConfig {
    /// Protocol identifier for direct-message streams.
    pub protocol_id: String,

    /// Version tag placed in outgoing metadata.
    pub client_version: String,

    /// Budget for obtaining a connection to the peer.
    pub connect_timeout_ms: u64,

    /// Budget for opening a protocol stream on the connection.
    pub stream_open_timeout_ms: u64,

    /// Budget for writing one encoded message.
    pub write_timeout_ms: u64,

    /// Budget for reading one complete encoded message.
    pub read_timeout_ms: u64,

    /// Budget for the graceful close at the end of an exchange.
    pub close_timeout_ms: u64,

    /// Largest message body accepted or sent, in bytes.
    pub max_message_size: usize,

    /// Upper bound on a single stream read, in bytes. Must not exceed
    /// `max_message_size`.
    pub read_chunk_size: usize,
}

impl Default for DirectMessageConfig {
    fn default() -> Self {
        Self {
            protocol_id: DEFAULT_PROTOCOL_ID.to_string(),
            client_version: DEFAULT_CLIENT_VERSION.to_string(),
            connect_timeout_ms: DEFAULT_TIMEOUT_MS,
            stream_open_timeout_ms: DEFAULT_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_TIMEOUT_MS,
            read_timeout_ms: DEFAULT_TIMEOUT_MS,
            close_timeout_ms: DEFAULT_TIMEOUT_MS,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }
}

impl DirectMessageConfig {
    /// Parses a JSON config. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Sets every step budget to the same value. Handy in tests.
    pub fn with_all_timeouts(mut self, budget: Duration) -> Self {
        let ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX);
        self.connect_timeout_ms = ms;
        self.stream_open_timeout_ms = ms;
        self.write_timeout_ms = ms;
        self.read_timeout_ms = ms;
        self.close_timeout_ms = ms;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn stream_open_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_open_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    /// The codec matching this config's size limit.
    pub fn codec(&self) -> ProtobufCodec {
        ProtobufCodec::new(self.max_message_size)
    }

    /// Checks that the config can drive an exchange.
    ///
    /// # Errors
    /// - [`ConfigError::EmptyProtocolId`]
    /// - [`ConfigError::Zero`] naming the first zero field
    /// - [`ConfigError::ReadChunkTooLarge`] if a single read could exceed
    ///   the largest accepted message
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol_id.is_empty() {
            return Err(ConfigError::EmptyProtocolId);
        }
        let nonzero = [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("stream_open_timeout_ms", self.stream_open_timeout_ms),
            ("write_timeout_ms", self.write_timeout_ms),
            ("read_timeout_ms", self.read_timeout_ms),
            ("close_timeout_ms", self.close_timeout_ms),
            ("max_message_size", self.max_message_size as u64),
            ("read_chunk_size", self.read_chunk_size as u64),
        ];
        if let Some((field, _)) = nonzero.into_iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Zero(field));
        }
        if self.read_chunk_size > self.max_message_size {
            return Err(ConfigError::ReadChunkTooLarge {
                read_chunk_size: self.read_chunk_size,
                max_message_size: self.max_message_size,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = DirectMessageConfig::default();

        assert_eq!(config.protocol_id, "/direct-message/1.0.0");
        assert!(config.client_version.starts_with("peerlink/"));
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.stream_open_timeout(), Duration::from_secs(5));
        assert_eq!(config.write_timeout(), Duration::from_secs(5));
        assert_eq!(config.read_timeout(), Duration::from_secs(5));
        assert_eq!(config.close_timeout(), Duration::from_secs(5));
        assert_eq!(config.max_message_size, 4 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial_keeps_defaults() {
        let config = DirectMessageConfig::from_json(
            r#"{ "protocol_id": "/chat/2.0.0", "write_timeout_ms": 100 }"#,
        )
        .unwrap();

        assert_eq!(config.protocol_id, "/chat/2.0.0");
        assert_eq!(config.write_timeout(), Duration::from_millis(100));
        assert_eq!(config.read_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_from_json_rejects_zero_budget() {
        let result = DirectMessageConfig::from_json(r#"{ "read_timeout_ms": 0 }"#);

        assert!(matches!(result, Err(ConfigError::Zero("read_timeout_ms"))));
    }

    #[test]
    fn test_from_json_malformed_is_parse_error() {
        let result = DirectMessageConfig::from_json("{ not json");

        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validate_rejects_empty_protocol_id() {
        let config = DirectMessageConfig {
            protocol_id: String::new(),
            ..DirectMessageConfig::default()
        };

        assert!(matches!(config.validate(), Err(ConfigError::EmptyProtocolId)));
    }

    #[test]
    fn test_validate_rejects_zero_max_message_size() {
        let config = DirectMessageConfig {
            max_message_size: 0,
            ..DirectMessageConfig::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Zero("max_message_size"))
        ));
    }

    #[test]
    fn test_validate_rejects_oversized_read_chunk() {
        let result =
            DirectMessageConfig::from_json(r#"{ "read_chunk_size": 18446744073709551615 }"#);

        assert!(matches!(
            result,
            Err(ConfigError::ReadChunkTooLarge {
                read_chunk_size: usize::MAX,
                max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            })
        ));
    }

    #[test]
    fn test_validate_accepts_read_chunk_equal_to_max_message_size() {
        let config = DirectMessageConfig {
            max_message_size: 1024,
            read_chunk_size: 1024,
            ..DirectMessageConfig::default()
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_with_all_timeouts_sets_every_budget() {
        let config = DirectMessageConfig::default().with_all_timeouts(Duration::from_millis(50));

        assert_eq!(config.connect_timeout_ms, 50);
        assert_eq!(config.stream_open_timeout_ms, 50);
        assert_eq!(config.write_timeout_ms, 50);
        assert_eq!(config.read_timeout_ms, 50);
        assert_eq!(config.close_timeout_ms, 50);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = DirectMessageConfig::load("/nonexistent/peerlink.json");

        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
