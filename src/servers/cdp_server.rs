//! CDP websocket endpoint (spec.md §2 item 5, §4.4, §6).
//!
//! One reader task + one writer task per connection, precedent:
//! `viewpoint-cdp`'s `CdpConnection` read/write loop pair, adapted from
//! client-side to server-side, and `extension_bridge.rs`'s
//! `handle_extension_client` write-task-fed-by-mpsc shape.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use crate::bridge::Bridge;
use crate::error::Result;
use crate::ids::ClientId;
use crate::router::Router;

pub async fn serve(bridge: Arc<Bridge>, router: Arc<Router>) -> Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], bridge.config.cdp_port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "CDP endpoint listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let router = router.clone();
        let high_watermark = bridge.config.client_event_high_watermark;
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, router, high_watermark).await {
                warn!(%peer, error = %e, "CDP connection ended with error");
            }
        });
    }
}

async fn handle_connection(
    stream: tokio::net::TcpStream,
    router: Arc<Router>,
    high_watermark: usize,
) -> Result<()> {
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| crate::error::BridgeError::internal(e.to_string()))?;
    let (mut write, mut read) = ws.split();

    let client_id = ClientId::generate();
    let (tx, mut rx) = mpsc::channel::<String>(high_watermark.max(1));
    router.register_cdp_client(client_id, tx);

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if write.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = read.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if !router.handle_cdp_request(client_id, &text).await {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(%client_id, error = %e, "CDP websocket error");
                break;
            }
        }
    }

    router.unregister_cdp_client(client_id);
    writer.abort();
    Ok(())
}
