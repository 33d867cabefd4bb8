//! BROP websocket endpoint (spec.md §2 item 4, §4.3, §6).
//!
//! BROP has no session or event concept (spec §4.3): a connection is just a
//! long-lived request/response loop, one frame in, one frame out, no writer
//! task needed since nothing is ever pushed unsolicited to a BROP client.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use crate::bridge::Bridge;
use crate::error::Result;
use crate::router::Router;

pub async fn serve(bridge: Arc<Bridge>, router: Arc<Router>) -> Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], bridge.config.brop_port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "BROP endpoint listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let router = router.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, router).await {
                warn!(%peer, error = %e, "BROP connection ended with error");
            }
        });
    }
}

async fn handle_connection(stream: tokio::net::TcpStream, router: Arc<Router>) -> Result<()> {
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| crate::error::BridgeError::internal(e.to_string()))?;
    let (mut write, mut read) = ws.split();

    while let Some(frame) = read.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let response = router.handle_brop_request(&text).await;
                if write.send(Message::Text(response.into())).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "BROP websocket error");
                break;
            }
        }
    }

    Ok(())
}
