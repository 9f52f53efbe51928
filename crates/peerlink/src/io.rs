//! Bounded stream I/O for one exchange.
//!
//! Every suspension point of an exchange runs under its own budget, and a
//! stream that failed mid-exchange is aborted rather than closed. The
//! client and responder paths both go through [`bounded`] and
//! [`StreamGuard`].

use std::future::Future;
use std::time::Duration;

use peerlink_protocol::{Codec, FrameDecoder, Message, ProtocolError};
use peerlink_transport::{Stream, StreamId};

use crate::{DirectMessageConfig, DirectMessageError, Step};

/// Runs `future` under `budget`. An elapsed budget becomes
/// [`DirectMessageError::Timeout`] for `step`.
pub async fn bounded<T, E, F>(step: Step, budget: Duration, future: F) -> Result<T, DirectMessageError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<DirectMessageError>,
{
    match tokio::time::timeout(budget, future).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(DirectMessageError::Timeout { step, budget }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GuardState {
    Open,
    Aborted,
    Finished,
}

/// Exclusive owner of a stream for one request/response cycle.
///
/// Reads and writes are bounded by the config's budgets and abort the
/// stream on failure. [`finish`](Self::finish) closes it gracefully. A
/// guard dropped before `finish` (for example because the `send` future
/// was cancelled) aborts the stream, so the remote side never waits on a
/// stream nobody owns.
pub struct StreamGuard<'a, S: Stream> {
    stream: S,
    config: &'a DirectMessageConfig,
    state: GuardState,
}

impl<'a, S: Stream> StreamGuard<'a, S> {
    pub fn new(stream: S, config: &'a DirectMessageConfig) -> Self {
        Self {
            stream,
            config,
            state: GuardState::Open,
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream.id()
    }

    pub fn is_aborted(&self) -> bool {
        self.state == GuardState::Aborted
    }

    /// Tears the stream down. Later reads and writes fail; `finish` skips
    /// the graceful close.
    pub fn abort(&mut self, reason: &str) {
        if self.state == GuardState::Open {
            self.stream.abort(reason);
            self.state = GuardState::Aborted;
        }
    }

    /// Encodes and writes one message under the write budget.
    pub async fn write_message<C, M>(&mut self, codec: &C, message: &M) -> Result<(), DirectMessageError>
    where
        C: Codec,
        M: Message,
    {
        let result = match codec.encode(message) {
            Ok(bytes) => {
                bounded(Step::Write, self.config.write_timeout(), self.stream.write(&bytes)).await
            }
            Err(e) => Err(e.into()),
        };
        self.abort_on_error(result)
    }

    /// Reads exactly one message under the read budget, which covers the
    /// whole message rather than each chunk.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly before any byte of
    /// a message arrived. A stream ending mid-message is a decode error.
    pub async fn read_message<C, M>(&mut self, codec: &C) -> Result<Option<M>, DirectMessageError>
    where
        C: Codec,
        M: Message + Default,
    {
        let mut decoder = codec.frame_decoder();
        let chunk_size = self.config.read_chunk_size;
        let result = bounded(
            Step::Read,
            self.config.read_timeout(),
            read_frame(&mut self.stream, &mut decoder, chunk_size),
        )
        .await;
        self.abort_on_error(result)
    }

    /// Ends the exchange: closes the stream under the close budget unless
    /// it was already aborted, and merges the close outcome into `result`.
    ///
    /// A failed close aborts the stream. Its error is returned only when
    /// `result` was `Ok`; otherwise the earlier error wins and the close
    /// failure is logged.
    pub async fn finish<T>(mut self, result: Result<T, DirectMessageError>) -> Result<T, DirectMessageError> {
        if self.state != GuardState::Open {
            self.state = GuardState::Finished;
            return result;
        }

        let stream_id = self.stream.id();
        let closed = bounded(Step::Close, self.config.close_timeout(), self.stream.close()).await;
        let closed = closed.map_err(|e| match e {
            DirectMessageError::Transport(source) => DirectMessageError::Close(source),
            other => other,
        });

        match closed {
            Ok(()) => {
                self.state = GuardState::Finished;
                result
            }
            Err(close_error) => {
                self.abort("close failed");
                self.state = GuardState::Finished;
                match result {
                    Ok(_) => Err(close_error),
                    Err(original) => {
                        tracing::debug!(
                            %stream_id,
                            error = %close_error,
                            "close failed after earlier error"
                        );
                        Err(original)
                    }
                }
            }
        }
    }

    fn abort_on_error<T>(&mut self, result: Result<T, DirectMessageError>) -> Result<T, DirectMessageError> {
        if let Err(e) = &result {
            tracing::debug!(stream_id = %self.stream.id(), error = %e, "aborting stream");
            self.abort(&e.to_string());
        }
        result
    }
}

impl<S: Stream> Drop for StreamGuard<'_, S> {
    fn drop(&mut self) {
        if self.state == GuardState::Open {
            tracing::debug!(stream_id = %self.stream.id(), "exchange dropped, aborting stream");
            self.stream.abort("exchange cancelled");
        }
    }
}

/// Pulls chunks until the decoder yields one frame or the stream ends.
async fn read_frame<S, M>(
    stream: &mut S,
    decoder: &mut FrameDecoder,
    chunk_size: usize,
) -> Result<Option<M>, DirectMessageError>
where
    S: Stream,
    M: Message + Default,
{
    loop {
        if let Some(message) = decoder.decode_next()? {
            return Ok(Some(message));
        }
        match stream.read(chunk_size).await? {
            Some(chunk) => decoder.push(&chunk),
            None if decoder.buffered_len() == 0 => return Ok(None),
            None => return Err(ProtocolError::Truncated.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerlink_protocol::{DirectMessageRequest, ProtobufCodec};
    use peerlink_transport::{Connection, Host, Incoming, MemoryNetwork, MemoryStream};

    const PROTOCOL: &str = "/io-test/1.0.0";

    /// Opens one stream between two fresh hosts; returns (outbound, inbound).
    async fn stream_pair() -> (MemoryStream, MemoryStream) {
        let network = MemoryNetwork::new();
        let alice = network.add_host();
        let bob = network.add_host();
        let mut incoming = bob.handle(PROTOCOL).unwrap();
        let conn = alice.open_connection(bob.local_peer()).await.unwrap();
        let outbound = conn.new_stream(PROTOCOL).await.unwrap();
        let inbound = incoming.accept().await.unwrap().stream;
        (outbound, inbound)
    }

    fn short_config() -> DirectMessageConfig {
        DirectMessageConfig::default().with_all_timeouts(Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_bounded_elapsed_budget_is_timeout() {
        let result: Result<(), _> = bounded(
            Step::Connect,
            Duration::from_millis(10),
            std::future::pending::<Result<(), DirectMessageError>>(),
        )
        .await;

        assert!(matches!(
            result,
            Err(DirectMessageError::Timeout { step: Step::Connect, .. })
        ));
    }

    #[tokio::test]
    async fn test_bounded_converts_inner_error() {
        let result: Result<(), _> = bounded(Step::Read, Duration::from_secs(1), async {
            Err(ProtocolError::Truncated)
        })
        .await;

        assert!(matches!(result, Err(DirectMessageError::Decode(_))));
    }

    #[tokio::test]
    async fn test_write_then_read_message() {
        let config = DirectMessageConfig::default();
        let codec = ProtobufCodec::default();
        let (outbound, inbound) = stream_pair().await;
        let mut writer = StreamGuard::new(outbound, &config);
        let mut reader = StreamGuard::new(inbound, &config);

        let request = DirectMessageRequest::new("hi", "text/plain", "test");
        writer.write_message(&codec, &request).await.unwrap();
        let got: Option<DirectMessageRequest> = reader.read_message(&codec).await.unwrap();

        assert_eq!(got, Some(request));
        writer.finish(Ok(())).await.unwrap();
        reader.finish(Ok(())).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_message_clean_eof_is_none() {
        let config = DirectMessageConfig::default();
        let codec = ProtobufCodec::default();
        let (outbound, inbound) = stream_pair().await;
        StreamGuard::new(outbound, &config).finish(Ok(())).await.unwrap();
        let mut reader = StreamGuard::new(inbound, &config);

        let got: Option<DirectMessageRequest> = reader.read_message(&codec).await.unwrap();

        assert!(got.is_none());
        assert!(!reader.is_aborted());
    }

    #[tokio::test]
    async fn test_read_message_eof_mid_frame_is_truncated() {
        let config = DirectMessageConfig::default();
        let codec = ProtobufCodec::default();
        let (mut outbound, inbound) = stream_pair().await;
        // Length prefix announces 10 bytes, only 2 follow.
        outbound.write(&[10, 0x12, 0x00]).await.unwrap();
        outbound.close().await.unwrap();
        let mut reader = StreamGuard::new(inbound, &config);

        let result: Result<Option<DirectMessageRequest>, _> = reader.read_message(&codec).await;

        assert!(matches!(
            result,
            Err(DirectMessageError::Decode(ProtocolError::Truncated))
        ));
        assert!(reader.is_aborted());
    }

    #[tokio::test]
    async fn test_read_message_timeout_aborts_stream() {
        let config = short_config();
        let codec = ProtobufCodec::default();
        let (_outbound, inbound) = stream_pair().await;
        let mut reader = StreamGuard::new(inbound, &config);

        let result: Result<Option<DirectMessageRequest>, _> = reader.read_message(&codec).await;

        assert!(matches!(
            result,
            Err(DirectMessageError::Timeout { step: Step::Read, .. })
        ));
        assert!(reader.is_aborted());
    }

    #[tokio::test]
    async fn test_finish_after_abort_keeps_original_error() {
        let config = DirectMessageConfig::default();
        let (outbound, _inbound) = stream_pair().await;
        let mut guard = StreamGuard::new(outbound, &config);
        guard.abort("test");

        let result: Result<(), _> = guard.finish(Err(DirectMessageError::NoResponse)).await;

        assert!(matches!(result, Err(DirectMessageError::NoResponse)));
    }

    #[tokio::test]
    async fn test_drop_before_finish_aborts_stream() {
        let config = DirectMessageConfig::default();
        let (outbound, mut inbound) = stream_pair().await;

        drop(StreamGuard::new(outbound, &config));

        let read = tokio::time::timeout(Duration::from_secs(1), inbound.read(16))
            .await
            .expect("remote read should end");
        assert!(matches!(read, Ok(None)));
    }
}
