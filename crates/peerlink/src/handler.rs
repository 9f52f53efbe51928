//! Responder side: one task per inbound direct-message stream.
//!
//! The flow for each stream is:
//!   1. Read one request → any failure aborts the stream
//!   2. Ask the [`MessageFilter`] → OK or ERROR with a reason
//!   3. Write the response
//!   4. On OK, emit a [`DeliveredMessage`]
//!   5. Close the stream

use std::future::Future;
use std::sync::Arc;

use peerlink_protocol::{Codec, DirectMessageRequest, DirectMessageResponse, Status};
use peerlink_transport::{Connection, InboundStream, Incoming, PeerId, Stream};
use tokio::sync::mpsc;

use crate::event::{ConnectionInfo, DeliveredMessage, StreamInfo};
use crate::io::StreamGuard;
use crate::{DirectMessageConfig, DirectMessageError};

/// Outcome of a [`MessageFilter`] check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Answer OK and deliver the message.
    Accept,
    /// Answer ERROR with this reason as `status_text`; nothing is delivered.
    Reject(String),
}

/// Decides whether an inbound direct message is accepted.
///
/// # Example
///
/// ```rust
/// use peerlink::{MessageFilter, Verdict};
/// use peerlink::protocol::DirectMessageRequest;
/// use peerlink::transport::PeerId;
///
/// /// Only plain text gets through.
/// struct TextOnly;
///
/// impl MessageFilter for TextOnly {
///     async fn check(&self, _peer: PeerId, request: &DirectMessageRequest) -> Verdict {
///         if request.r#type == "text/plain" {
///             Verdict::Accept
///         } else {
///             Verdict::Reject(format!("unsupported type {}", request.r#type))
///         }
///     }
/// }
/// ```
pub trait MessageFilter: Send + Sync + 'static {
    fn check(
        &self,
        peer: PeerId,
        request: &DirectMessageRequest,
    ) -> impl Future<Output = Verdict> + Send;
}

/// Accepts every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl MessageFilter for AcceptAll {
    async fn check(&self, _peer: PeerId, _request: &DirectMessageRequest) -> Verdict {
        Verdict::Accept
    }
}

/// State shared by every inbound task of one service.
pub(crate) struct HandlerContext<F: MessageFilter, C: Codec> {
    pub(crate) config: Arc<DirectMessageConfig>,
    pub(crate) codec: C,
    pub(crate) filter: F,
    pub(crate) events: mpsc::UnboundedSender<DeliveredMessage>,
}

/// Accepts inbound streams until the source closes, one task per stream.
pub(crate) async fn accept_loop<I, F, C>(mut incoming: I, ctx: Arc<HandlerContext<F, C>>)
where
    I: Incoming,
    F: MessageFilter,
    C: Codec,
{
    while let Some(inbound) = incoming.accept().await {
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            let peer = inbound.connection.remote_peer();
            let stream_id = inbound.stream.id();
            if let Err(e) = handle_inbound(inbound, ctx).await {
                tracing::debug!(%peer, %stream_id, error = %e, "inbound exchange failed");
            }
        });
    }
    tracing::debug!("inbound stream source closed");
}

/// Handles a single inbound stream from accept to close.
pub(crate) async fn handle_inbound<Conn, F, C>(
    inbound: InboundStream<Conn>,
    ctx: Arc<HandlerContext<F, C>>,
) -> Result<(), DirectMessageError>
where
    Conn: Connection,
    F: MessageFilter,
    C: Codec,
{
    let InboundStream { stream, connection } = inbound;
    let peer = connection.remote_peer();
    let stream_info = StreamInfo {
        id: stream.id(),
        protocol: stream.protocol().to_string(),
    };
    let connection_info = ConnectionInfo {
        id: connection.id(),
        remote_peer: peer,
    };
    tracing::debug!(%peer, stream_id = %stream_info.id, "handling inbound stream");

    let mut guard = StreamGuard::new(stream, &ctx.config);
    let result = respond(&mut guard, &ctx, peer, stream_info, connection_info).await;
    guard.finish(result).await
}

async fn respond<S, F, C>(
    guard: &mut StreamGuard<'_, S>,
    ctx: &HandlerContext<F, C>,
    peer: PeerId,
    stream: StreamInfo,
    connection: ConnectionInfo,
) -> Result<(), DirectMessageError>
where
    S: Stream,
    F: MessageFilter,
    C: Codec,
{
    let request: DirectMessageRequest = match guard.read_message(&ctx.codec).await? {
        Some(request) => request,
        None => {
            guard.abort("stream ended before a request");
            return Err(DirectMessageError::NoRequest);
        }
    };

    let verdict = ctx.filter.check(peer, &request).await;
    let response = match &verdict {
        Verdict::Accept => DirectMessageResponse::new(Status::Ok, &ctx.config.client_version),
        Verdict::Reject(reason) => {
            DirectMessageResponse::new(Status::Error, &ctx.config.client_version)
                .with_status_text(reason.as_str())
        }
    };
    guard.write_message(&ctx.codec, &response).await?;

    if let Verdict::Reject(reason) = verdict {
        tracing::info!(%peer, reason = %reason, "direct message rejected");
        return Ok(());
    }

    let event = DeliveredMessage {
        content: request.content,
        r#type: request.r#type,
        metadata: request.metadata,
        peer,
        stream,
        connection,
    };
    if ctx.events.send(event).is_err() {
        tracing::debug!(%peer, "no receiver for delivered messages, event dropped");
    }
    Ok(())
}
