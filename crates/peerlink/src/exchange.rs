//! Client side: one request, one response, one stream.

use peerlink_protocol::{Codec, DirectMessageRequest, DirectMessageResponse};
use peerlink_transport::{Connection, Host, PeerId, Stream};

use crate::io::{StreamGuard, bounded};
use crate::{DirectMessageConfig, DirectMessageError, Step};

/// Sends one direct message to `peer` and waits for its acknowledgement.
///
/// Opens a fresh stream for the protocol, writes the request, reads one
/// response and closes the stream. Each step runs under its own budget
/// from `config`; nothing is retried. Dropping the returned future aborts
/// the stream if one was opened.
///
/// # Errors
/// - [`DirectMessageError::EmptyMessage`] before any I/O if `content` is
///   empty
/// - [`DirectMessageError::NoConnection`] / [`DirectMessageError::NoStream`]
///   if the peer or the protocol cannot be reached
/// - [`DirectMessageError::Timeout`] if a write, read or close runs over
/// - [`DirectMessageError::NoResponse`], [`DirectMessageError::MissingMetadata`],
///   [`DirectMessageError::NonOkStatus`] or [`DirectMessageError::Decode`]
///   for an unusable response
pub async fn send<H, C>(
    host: &H,
    codec: &C,
    config: &DirectMessageConfig,
    peer: PeerId,
    content: &str,
    r#type: &str,
) -> Result<(), DirectMessageError>
where
    H: Host,
    C: Codec,
{
    if content.is_empty() {
        return Err(DirectMessageError::EmptyMessage);
    }

    let connection = bounded(Step::Connect, config.connect_timeout(), host.open_connection(peer))
        .await
        .map_err(|source| DirectMessageError::NoConnection {
            peer,
            source: Box::new(source),
        })?;

    let stream = bounded(
        Step::OpenStream,
        config.stream_open_timeout(),
        connection.new_stream(&config.protocol_id),
    )
    .await
    .map_err(|source| DirectMessageError::NoStream {
        peer,
        protocol: config.protocol_id.clone(),
        source: Box::new(source),
    })?;

    let mut guard = StreamGuard::new(stream, config);
    tracing::debug!(%peer, stream_id = %guard.stream_id(), conn_id = %connection.id(), "sending direct message");

    let request = DirectMessageRequest::new(content, r#type, &config.client_version);
    let result = request_response(&mut guard, codec, &request).await;
    let result = guard.finish(result).await;

    match &result {
        Ok(()) => tracing::debug!(%peer, "direct message acknowledged"),
        Err(e) => tracing::debug!(%peer, error = %e, "direct message failed"),
    }
    result
}

async fn request_response<S, C>(
    guard: &mut StreamGuard<'_, S>,
    codec: &C,
    request: &DirectMessageRequest,
) -> Result<(), DirectMessageError>
where
    S: Stream,
    C: Codec,
{
    guard.write_message(codec, request).await?;

    let response: DirectMessageResponse = guard
        .read_message(codec)
        .await?
        .ok_or(DirectMessageError::NoResponse)?;

    if response.metadata.is_none() {
        return Err(DirectMessageError::MissingMetadata);
    }
    let status = response.status();
    if !status.is_ok() {
        return Err(DirectMessageError::NonOkStatus {
            status,
            status_text: response.status_text,
        });
    }
    Ok(())
}
