use std::time::Duration;

use peerlink::prelude::*;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Bob only reads text.
struct TextOnly;

impl MessageFilter for TextOnly {
    async fn check(&self, _peer: PeerId, request: &DirectMessageRequest) -> Verdict {
        if request.r#type.starts_with("text/") {
            Verdict::Accept
        } else {
            Verdict::Reject(format!("{} is not text", request.r#type))
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

/// Two in-process nodes trade direct messages.
///
/// Usage: `chat [config.json]`. The optional JSON file overrides any
/// `DirectMessageConfig` field; `RUST_LOG` controls log output.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => DirectMessageConfig::load(&path)?,
        None => DirectMessageConfig::default(),
    };

    let network = MemoryNetwork::new();
    let (alice, mut alice_inbox) = DirectMessage::builder()
        .config(config.clone())
        .build(network.add_host())?;
    let (bob, mut bob_inbox) = DirectMessage::builder()
        .config(config)
        .filter(TextOnly)
        .build(network.add_host())?;

    let bob_peer = bob.local_peer();
    tracing::info!(alice = %alice.local_peer(), bob = %bob_peer, "nodes up");

    // Bob answers every text he receives with a direct message of his own.
    let bob_task = tokio::spawn(async move {
        while let Some(message) = bob_inbox.recv().await {
            println!("bob   <- {}: {:?}", message.peer, message.content);
            let answer = format!("got {} bytes", message.content.len());
            if let Err(e) = bob.send(message.peer, &answer, "text/plain").await {
                tracing::warn!(error = %e, "bob could not answer");
            }
        }
    });

    for (content, kind) in [
        ("hello bob", "text/plain"),
        ("<b>still there?</b>", "text/html"),
        ("\u{1f4be}", "application/octet-stream"),
        ("", "text/plain"),
    ] {
        match alice.send(bob_peer, content, kind).await {
            Ok(()) => println!("alice -> bob: {content:?} ({kind}) acknowledged"),
            Err(e) => println!("alice -> bob: {content:?} ({kind}) failed: {e}"),
        }
    }

    for _ in 0..2 {
        match tokio::time::timeout(Duration::from_secs(1), alice_inbox.recv()).await {
            Ok(Some(message)) => println!("alice <- {}: {:?}", message.peer, message.content),
            _ => break,
        }
    }

    println!("alice sees bob as capable: {}", alice.is_capable(&bob_peer));

    drop(alice);
    bob_task.abort();
    Ok(())
}
